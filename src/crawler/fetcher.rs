//! HTTP fetcher implementation
//!
//! This module performs single HTTP(S) GETs for the crawler:
//! - Building HTTP clients with the site's user agent and proxy
//! - Following redirects and reporting the final URL
//! - Retrying transient failures with a fixed backoff
//! - Classifying errors as retryable or not
//!
//! Robots.txt and rate limiting are not checked here; callers go through
//! [`crate::crawler::CrawlClient`], which gates every request before it reaches the fetcher.

use crate::config::CrawlerConfig;
use reqwest::{redirect::Policy, Client, Proxy, StatusCode};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed per request
const MAX_REDIRECTS: usize = 10;

/// Fetch failures, classified for retry decisions
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Whether another attempt could succeed
    ///
    /// | Condition | Retry |
    /// |-----------|-------|
    /// | Timeout | yes |
    /// | Connection / transport error | yes |
    /// | HTTP 5xx | yes |
    /// | HTTP 429 | yes |
    /// | Other HTTP 4xx | no |
    /// | Client construction | no |
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            Self::Client(_) => false,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn from_reqwest(url: &Url, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                source: error,
            }
        }
    }
}

/// Retry and timeout policy for one fetcher
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Fixed delay between attempts
    pub backoff: Duration,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl FetchPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            attempts: config.retry_attempts,
            backoff: config.retry_backoff(),
            timeout: config.request_timeout(),
        }
    }
}

/// A successfully fetched response
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: Vec<u8>,
    /// URL after redirects
    pub final_url: Url,
    pub content_type: Option<String>,
}

/// Builds an HTTP client for one site
///
/// An explicit `proxy` wins; otherwise reqwest picks up `HTTPS_PROXY` / `HTTP_PROXY`
/// from the environment.
pub fn build_http_client(
    user_agent: &str,
    proxy: Option<&str>,
    timeout: Duration,
) -> Result<Client, FetchError> {
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy).map_err(FetchError::Client)?);
    }

    builder.build().map_err(FetchError::Client)
}

/// HTTP GET with retry
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: FetchPolicy,
}

impl Fetcher {
    pub fn new(
        user_agent: &str,
        proxy: Option<&str>,
        policy: FetchPolicy,
    ) -> Result<Self, FetchError> {
        let client = build_http_client(user_agent, proxy, policy.timeout)?;
        Ok(Self { client, policy })
    }

    /// Fetches `url`, retrying transient failures up to the policy's attempt count
    ///
    /// Non-retryable failures (4xx other than 429) return immediately.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.fetch_once(url, attempt).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        url = %url,
                        attempt,
                        error = %e,
                        "transient fetch failure, retrying in {:?}",
                        self.policy.backoff
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetches `url` once; one structured log line per attempt
    async fn fetch_once(&self, url: &Url, attempt: u32) -> Result<FetchedPage, FetchError> {
        let started = Instant::now();

        let response = match self.client.get(url.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::info!(
                    url = %url,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "fetch failed"
                );
                return Err(FetchError::from_reqwest(url, e));
            }
        };

        let status = response.status();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        tracing::info!(
            url = %url,
            status = status.as_u16(),
            attempt,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched"
        );

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        Ok(FetchedPage {
            status: status.as_u16(),
            body: body.to_vec(),
            final_url,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> FetchPolicy {
        FetchPolicy {
            attempts: 3,
            backoff: Duration::from_millis(10),
            timeout: Duration::from_millis(500),
        }
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[test]
    fn test_policy_from_config() {
        let config = CrawlerConfig {
            retry_attempts: 2,
            retry_backoff_ms: 250,
            request_timeout_secs: 7,
            ..CrawlerConfig::default()
        };
        let policy = FetchPolicy::from_config(&config);
        assert_eq!(policy.attempts, 2);
        assert_eq!(policy.backoff, Duration::from_millis(250));
        assert_eq!(policy.timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client("TestBot/1.0", None, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_build_http_client_with_proxy() {
        assert!(
            build_http_client("TestBot/1.0", Some("http://127.0.0.1:3128"), Duration::from_secs(5))
                .is_ok()
        );
    }

    #[test]
    fn test_retryable_classification() {
        let status = |s| FetchError::Status {
            url: "u".to_string(),
            status: s,
        };
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(FetchError::Timeout {
            url: "u".to_string()
        }
        .is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p/1"))
            .and(header("user-agent", "TestBot/1.0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html>ok</html>")
                    .insert_header("content-type", "text/html; charset=utf-8"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new("TestBot/1.0", None, fast_policy()).unwrap();
        let page = fetcher.fetch(&url(&server, "/p/1")).await.unwrap();

        assert_eq!(page.status, 200);
        assert_eq!(page.body, b"<html>ok</html>");
        assert_eq!(page.final_url, url(&server, "/p/1"));
        assert_eq!(
            page.content_type.as_deref(),
            Some("text/html; charset=utf-8")
        );
    }

    #[tokio::test]
    async fn test_fetch_follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", "/new"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new("TestBot/1.0", None, fast_policy()).unwrap();
        let page = fetcher.fetch(&url(&server, "/old")).await.unwrap();
        assert_eq!(page.final_url, url(&server, "/new"));
        assert_eq!(page.body, b"moved");
    }

    #[tokio::test]
    async fn test_fetch_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new("TestBot/1.0", None, fast_policy()).unwrap();
        let err = fetcher.fetch(&url(&server, "/flaky")).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_fetch_recovers_after_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new("TestBot/1.0", None, fast_policy()).unwrap();
        let page = fetcher.fetch(&url(&server, "/busy")).await.unwrap();
        assert_eq!(page.body, b"done");
    }

    #[tokio::test]
    async fn test_fetch_does_not_retry_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new("TestBot/1.0", None, fast_policy()).unwrap();
        let err = fetcher.fetch(&url(&server, "/gone")).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .expect(2)
            .mount(&server)
            .await;

        let policy = FetchPolicy {
            attempts: 2,
            backoff: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
        };
        let fetcher = Fetcher::new("TestBot/1.0", None, policy).unwrap();
        let err = fetcher.fetch(&url(&server, "/slow")).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }
}
