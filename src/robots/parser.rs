//! Robots.txt parser implementation
//!
//! Allow/disallow matching is delegated to the `robotstxt` crate (a port of Google's
//! matcher). `Crawl-delay` is not covered by that crate and is parsed here.

use robotstxt::DefaultMatcher;
use std::sync::Arc;
use std::time::Duration;

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content; shared between clones
    content: Arc<str>,
    allow_all: bool,
}

impl ParsedRobots {
    /// Wraps raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: Arc::from(content),
            allow_all: content.trim().is_empty(),
        }
    }

    /// A permissive rule set, used when a site has no robots.txt or it cannot be read
    pub fn allow_all() -> Self {
        Self {
            content: Arc::from(""),
            allow_all: true,
        }
    }

    pub fn is_allow_all(&self) -> bool {
        self.allow_all
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks whether `url` (absolute) may be fetched by `user_agent`
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL; only its path and query are matched
    /// * `user_agent` - Full user agent string; reduced with [`product_token`]
    ///
    /// # Returns
    ///
    /// `true` if the rules allow the URL, or there are no rules
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, &product_token(user_agent), url)
    }

    /// `Crawl-delay` for `user_agent`; a group naming the agent wins over `*`
    ///
    /// Consecutive `User-agent` lines form one group; the group ends at the next
    /// `User-agent` line that follows a rule.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.allow_all {
            return None;
        }

        let token = product_token(user_agent).to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_rules = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if in_rules {
                        group.clear();
                        in_rules = false;
                    }
                    group.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_rules = true;
                    let Some(delay) = parse_delay(value) else {
                        continue;
                    };
                    if group
                        .iter()
                        .any(|ua| !ua.is_empty() && ua != "*" && token.contains(ua.as_str()))
                    {
                        specific.get_or_insert(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        wildcard.get_or_insert(delay);
                    }
                }
                _ => in_rules = true,
            }
        }

        specific.or(wildcard)
    }
}

/// Longest `Crawl-delay` honored; larger values are clamped to it
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

fn parse_delay(value: &str) -> Option<Duration> {
    let secs: f64 = value.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let delay = Duration::try_from_secs_f64(secs).unwrap_or(MAX_CRAWL_DELAY);
    Some(delay.min(MAX_CRAWL_DELAY))
}

/// The product token robots.txt groups are matched against
///
/// `"Mozilla/5.0 (compatible; shelfwatch/0.3)"` → `"shelfwatch"`, `"TestBot/1.0"` → `"TestBot"`.
pub fn product_token(user_agent: &str) -> String {
    let candidate = user_agent
        .split_once("compatible;")
        .map(|(_, rest)| rest)
        .unwrap_or(user_agent)
        .trim_start();

    candidate
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}
