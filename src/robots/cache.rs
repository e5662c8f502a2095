//! Robots.txt cache entries
//!
//! Entries expire after a configurable TTL so that long-running or repeated crawls pick up
//! rule changes made by the site owner.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// Cached robots.txt data for one host
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub robots: ParsedRobots,

    /// When the robots.txt was fetched (or found missing/unavailable)
    pub fetched_at: DateTime<Utc>,

    /// Why the robots.txt could not be read, for hosts remembered as unavailable in strict
    /// mode; `robots` is then a placeholder that must not be used
    pub unavailable: Option<String>,
}

impl CachedRobots {
    /// A fresh entry stamped with the current time
    pub fn new(robots: ParsedRobots) -> Self {
        Self {
            robots,
            fetched_at: Utc::now(),
            unavailable: None,
        }
    }

    /// A fresh entry recording that the robots.txt could not be read
    ///
    /// # Arguments
    ///
    /// * `reason` - The fetch failure, reported again on every lookup until the entry expires
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            robots: ParsedRobots::allow_all(),
            fetched_at: Utc::now(),
            unavailable: Some(reason.into()),
        }
    }

    /// Whether the entry is older than `ttl`
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}
