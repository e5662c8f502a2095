//! Shelfwatch: a low-noise product change tracker
//!
//! This crate crawls configured product listings across external sites, normalizes each
//! product page into a [`product::Product`], archives raw pages and per-day snapshots, and
//! diffs consecutive snapshots into change reports (new and gone SKUs, price moves, stock flips).
//!
//! Crawling is polite: every request passes robots.txt rules and a per-host token bucket.

pub mod adapters;
pub mod config;
pub mod crawler;
pub mod diff;
pub mod output;
pub mod product;
pub mod robots;
pub mod storage;
pub mod url;

use thiserror::Error;

pub use crawler::FetchError;
pub use storage::StorageError;

/// Main error type for Shelfwatch operations
#[derive(Debug, Error)]
pub enum ShelfError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("URL disallowed by robots.txt: {url}")]
    RobotsDenied { url: String },

    #[error("robots.txt unavailable for {host}: {reason}")]
    PolicyUnavailable { host: String, reason: String },

    #[error("Discovery failed for site {site}: {reason}")]
    DiscoveryFailed { site: String, reason: String },

    #[error("Headless render failed for {url}: {message}")]
    Render { url: String, message: String },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector in config: {0}")]
    InvalidSelector(String),
}

/// Result type alias for Shelfwatch operations
pub type Result<T> = std::result::Result<T, ShelfError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use adapters::{AdapterRegistry, RawPage, SiteAdapter};
pub use config::Config;
pub use crawler::{RateLimiter, Runner};
pub use diff::{diff, ChangeReport};
pub use product::{Availability, Product};
pub use storage::{FsSnapshotStore, SnapshotStore};
