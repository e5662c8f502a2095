//! Crawler module for fetching and orchestration
//!
//! This module contains the crawl pipeline's moving parts:
//! - Per-host token bucket rate limiting
//! - HTTP fetching with retry logic, and the headless rendering path
//! - Selector-driven extraction from markup
//! - The gated client combining robots.txt, rate limits and fetching
//! - The per-site runner

mod client;
mod extract;
mod fetcher;
mod rate_limit;
mod render;
mod runner;

pub use client::CrawlClient;
pub use extract::{extract_links, extract_text, PageExtractor};
pub use fetcher::{build_http_client, FetchError, FetchPolicy, FetchedPage, Fetcher};
pub use rate_limit::{BucketSpec, RateLimiter, TokenBucket};
pub use render::HeadlessRenderer;
pub use runner::{Runner, SiteOutcome, SiteRunStats};
