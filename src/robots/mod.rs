//! Robots.txt handling module
//!
//! Rules are fetched once per host and cached for a configurable TTL. A host whose
//! robots.txt is missing (404/410) has no rules. A host whose robots.txt cannot be read
//! (network error, 5xx, undecodable body) is crawled as allow-all with a warning, unless
//! strict mode is on, in which case the site fails with [`ShelfError::PolicyUnavailable`].

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::{product_token, ParsedRobots, MAX_CRAWL_DELAY};

use crate::config::CrawlerConfig;
use crate::crawler::{FetchError, Fetcher};
use crate::url::{host_key, robots_txt_url};
use crate::ShelfError;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use url::Url;

/// Outcome of fetching one host's robots.txt
#[derive(Debug)]
pub enum RobotsFetch {
    Rules(ParsedRobots),
    /// 404 or 410: the host publishes no rules
    Missing,
    /// Could not be read; carries the reason
    Unavailable(String),
}

/// Fetches and classifies the robots.txt governing `url`
///
/// # Arguments
///
/// * `fetcher` - Fetcher carrying the site's user agent and retry policy
/// * `url` - Any URL on the host; only its origin is used
///
/// # Returns
///
/// * `Ok(RobotsFetch::Rules(_))` - A UTF-8 robots.txt was served
/// * `Ok(RobotsFetch::Missing)` - The host answered 404 or 410
/// * `Ok(RobotsFetch::Unavailable(_))` - Network error, other status, or undecodable body
/// * `Err(ShelfError)` - `url` has no host
pub async fn fetch_robots(fetcher: &Fetcher, url: &Url) -> Result<RobotsFetch, ShelfError> {
    let robots_url = robots_txt_url(url)?;

    match fetcher.fetch(&robots_url).await {
        Ok(page) => match String::from_utf8(page.body) {
            Ok(text) => Ok(RobotsFetch::Rules(ParsedRobots::from_content(&text))),
            Err(_) => Ok(RobotsFetch::Unavailable("body is not valid UTF-8".to_string())),
        },
        Err(FetchError::Status { status: 404 | 410, .. }) => Ok(RobotsFetch::Missing),
        Err(e) => Ok(RobotsFetch::Unavailable(e.to_string())),
    }
}

/// Rules in force for one host, bound to the user agent they are evaluated for
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    host: String,
    robots: ParsedRobots,
    user_agent: String,
}

impl RobotsPolicy {
    pub fn new(host: impl Into<String>, robots: ParsedRobots, user_agent: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            robots,
            user_agent: user_agent.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn can_fetch(&self, url: &Url) -> bool {
        self.robots.is_allowed(url.as_str(), &self.user_agent)
    }

    pub fn crawl_delay(&self) -> Option<Duration> {
        self.robots.crawl_delay(&self.user_agent)
    }
}

/// Per-host robots.txt cache
///
/// Read-mostly; two tasks racing on a cold host may both fetch, and the later insert wins.
#[derive(Debug)]
pub struct RobotsCache {
    ttl: chrono::Duration,
    strict: bool,
    entries: RwLock<HashMap<String, CachedRobots>>,
}

impl RobotsCache {
    pub fn new(ttl: chrono::Duration, strict: bool) -> Self {
        Self {
            ttl,
            strict,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            chrono::Duration::hours(config.robots_ttl_hours),
            config.strict_robots,
        )
    }

    /// Returns the policy for the host of `url`, fetching robots.txt if absent or stale
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Used only when the cache has no fresh entry for the host
    /// * `url` - The URL about to be requested
    /// * `user_agent` - The agent the returned policy evaluates rules for
    ///
    /// # Returns
    ///
    /// * `Ok(RobotsPolicy)` - Rules for the host (allow-all when missing, or unavailable
    ///   outside strict mode)
    /// * `Err(ShelfError::PolicyUnavailable)` - Strict mode and the robots.txt could not be
    ///   read; remembered for the TTL
    pub async fn policy_for(
        &self,
        fetcher: &Fetcher,
        url: &Url,
        user_agent: &str,
    ) -> Result<RobotsPolicy, ShelfError> {
        let host = host_key(url).ok_or_else(|| ShelfError::MissingHost(url.to_string()))?;

        if let Some(entry) = self.fresh(&host) {
            return match entry.unavailable {
                Some(reason) => Err(ShelfError::PolicyUnavailable { host, reason }),
                None => Ok(RobotsPolicy::new(host, entry.robots, user_agent)),
            };
        }

        let robots = match fetch_robots(fetcher, url).await? {
            RobotsFetch::Rules(robots) => {
                tracing::debug!(host = %host, "robots.txt loaded");
                robots
            }
            RobotsFetch::Missing => {
                tracing::debug!(host = %host, "no robots.txt; allowing all");
                ParsedRobots::allow_all()
            }
            RobotsFetch::Unavailable(reason) if self.strict => {
                // Remembered so other pages on the host fail without refetching
                self.insert(&host, CachedRobots::unavailable(reason.clone()));
                return Err(ShelfError::PolicyUnavailable { host, reason });
            }
            RobotsFetch::Unavailable(reason) => {
                tracing::warn!(host = %host, reason = %reason, "robots.txt unavailable; allowing all");
                ParsedRobots::allow_all()
            }
        };

        self.insert(&host, CachedRobots::new(robots.clone()));
        Ok(RobotsPolicy::new(host, robots, user_agent))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fresh(&self, host: &str) -> Option<CachedRobots> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(host)
            .filter(|entry| !entry.is_stale(self.ttl))
            .cloned()
    }

    fn insert(&self, host: &str, entry: CachedRobots) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.to_string(), entry);
    }
}
