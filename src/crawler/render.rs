//! Headless-browser fetch path for sites that build their markup with scripts
//!
//! The browser is run as a child process in `--dump-dom` mode; its stdout is the rendered
//! document. This is best effort: pages that keep mutating after load may be captured
//! mid-render.

use crate::ShelfError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

/// Renders pages with a Chromium-compatible headless browser
#[derive(Debug, Clone)]
pub struct HeadlessRenderer {
    binary: String,
    user_agent: String,
    timeout: Duration,
}

impl HeadlessRenderer {
    pub fn new(binary: impl Into<String>, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            user_agent: user_agent.into(),
            timeout,
        }
    }

    /// Loads `url` in the browser and returns the serialized DOM
    pub async fn render(&self, url: &Url) -> Result<Vec<u8>, ShelfError> {
        let render_error = |message: String| ShelfError::Render {
            url: url.to_string(),
            message,
        };

        let child = Command::new(&self.binary)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--dump-dom")
            .arg(format!("--user-agent={}", self.user_agent))
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| render_error(format!("failed to start {}: {}", self.binary, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| render_error(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| render_error(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(render_error(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!(url = %url, bytes = output.stdout.len(), "rendered");
        Ok(output.stdout)
    }
}
