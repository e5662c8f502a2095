//! Gated fetching: robots.txt, then the host's token bucket, then the HTTP fetch
//!
//! Adapters never call the [`Fetcher`] directly; every listing and product request goes
//! through [`CrawlClient::fetch`] (or [`CrawlClient::admit`] before a headless render).

use crate::config::{CrawlerConfig, SiteConfig};
use crate::crawler::{FetchPolicy, FetchedPage, Fetcher, RateLimiter};
use crate::robots::RobotsCache;
use crate::url::host_key;
use crate::ShelfError;
use std::sync::Arc;
use url::Url;

/// Fetch access for one site, sharing the run's limiter and robots cache
#[derive(Debug, Clone)]
pub struct CrawlClient {
    fetcher: Fetcher,
    limiter: Arc<RateLimiter>,
    robots: Arc<RobotsCache>,
    user_agent: String,
}

impl CrawlClient {
    pub fn new(
        fetcher: Fetcher,
        limiter: Arc<RateLimiter>,
        robots: Arc<RobotsCache>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            robots,
            user_agent: user_agent.into(),
        }
    }

    /// Builds the client for `site` with its user agent and proxy
    pub fn for_site(
        site: &SiteConfig,
        crawler: &CrawlerConfig,
        limiter: Arc<RateLimiter>,
        robots: Arc<RobotsCache>,
    ) -> Result<Self, ShelfError> {
        let fetcher = Fetcher::new(
            &site.user_agent,
            site.proxy.as_deref(),
            FetchPolicy::from_config(crawler),
        )?;
        Ok(Self::new(fetcher, limiter, robots, site.user_agent.clone()))
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Checks robots.txt for `url` and waits for a token on its host
    ///
    /// Fails with [`ShelfError::RobotsDenied`] when the rules disallow the URL, and with
    /// [`ShelfError::PolicyUnavailable`] when strict mode cannot read them.
    pub async fn admit(&self, url: &Url) -> Result<(), ShelfError> {
        let policy = self
            .robots
            .policy_for(&self.fetcher, url, &self.user_agent)
            .await?;

        if !policy.can_fetch(url) {
            tracing::info!(url = %url, "disallowed by robots.txt");
            return Err(ShelfError::RobotsDenied {
                url: url.to_string(),
            });
        }

        let host = host_key(url).ok_or_else(|| ShelfError::MissingHost(url.to_string()))?;
        if let Some(delay) = policy.crawl_delay() {
            self.limiter.apply_crawl_delay(&host, delay);
        }
        self.limiter.acquire(&host, 1.0).await;
        Ok(())
    }

    /// Admits `url`, then fetches it
    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage, ShelfError> {
        self.admit(url).await?;
        Ok(self.fetcher.fetch(url).await?)
    }
}
