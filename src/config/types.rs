use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Shelfwatch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Path to the reference catalog CSV (`sku`, `price` columns)
    #[serde(default)]
    pub catalog_csv: Option<String>,

    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

/// Crawler behavior shared by every site
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Maximum number of product pages fetched concurrently per site
    pub concurrency: usize,

    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,

    /// Attempts per URL for transient failures
    pub retry_attempts: u32,

    /// Fixed delay between attempts (milliseconds)
    pub retry_backoff_ms: u64,

    /// Token bucket capacity per host
    pub rate_capacity: f64,

    /// Tokens refilled every `rate_per_secs`
    pub rate_tokens: f64,

    /// Refill window length (seconds)
    pub rate_per_secs: f64,

    /// How long a fetched robots.txt stays fresh (hours)
    pub robots_ttl_hours: i64,

    /// Treat an unreachable robots.txt as fatal for the site
    pub strict_robots: bool,

    /// Headless browser used for sites with `use-headless`
    pub headless_binary: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            request_timeout_secs: 20,
            retry_attempts: 3,
            retry_backoff_ms: 2000,
            rate_capacity: 2.0,
            rate_tokens: 1.0,
            rate_per_secs: 1.0,
            robots_ttl_hours: 24,
            strict_robots: false,
            headless_binary: "chromium".to_string(),
        }
    }
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputConfig {
    /// Root directory for raw pages, snapshots and reports
    pub data_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

/// One crawled site
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Stable site identifier, also used as the storage directory name
    pub name: String,

    /// Registry key of a bespoke adapter; the site name is tried when absent
    #[serde(default)]
    pub adapter: Option<String>,

    /// Listing pages to discover product links from
    pub start_urls: Vec<String>,

    pub selectors: SelectorConfig,

    /// Maximum listing pages fetched during discovery
    #[serde(default)]
    pub max_pages: Option<usize>,

    /// Maximum product URLs kept after discovery
    #[serde(default)]
    pub max_urls: Option<usize>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Render product pages through a headless browser
    #[serde(default, alias = "use-playwright")]
    pub use_headless: bool,

    /// Explicit proxy; `HTTP_PROXY`/`HTTPS_PROXY` apply otherwise
    #[serde(default)]
    pub proxy: Option<String>,

    /// Currency assumed when the page does not reveal one
    #[serde(default)]
    pub currency: Option<String>,

    /// Keyword whose presence in the stock text means "in stock"
    #[serde(default)]
    pub stock_text_contains: Option<String>,
}

/// CSS selectors per extracted field
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SelectorConfig {
    pub product_link: String,
    #[serde(default)]
    pub next_page: Option<String>,
    pub title: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub images: Option<String>,
    #[serde(default)]
    pub in_stock: Option<String>,
    #[serde(default)]
    pub categories: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub reviews_count: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
}

impl SelectorConfig {
    /// All configured selectors with their field names
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        let optional = [
            ("next-page", &self.next_page),
            ("price", &self.price),
            ("sku", &self.sku),
            ("images", &self.images),
            ("in-stock", &self.in_stock),
            ("categories", &self.categories),
            ("currency", &self.currency),
            ("reviews-count", &self.reviews_count),
            ("rating", &self.rating),
        ];

        [
            ("product-link", self.product_link.as_str()),
            ("title", self.title.as_str()),
        ]
        .into_iter()
        .chain(
            optional
                .into_iter()
                .filter_map(|(field, sel)| sel.as_deref().map(|s| (field, s))),
        )
    }
}

impl SiteConfig {
    /// Registry key used to pick this site's adapter
    pub fn adapter_key(&self) -> &str {
        self.adapter.as_deref().unwrap_or(&self.name)
    }
}

fn default_user_agent() -> String {
    format!(
        "Mozilla/5.0 (compatible; shelfwatch/{})",
        env!("CARGO_PKG_VERSION")
    )
}
