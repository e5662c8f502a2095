//! Site adapters
//!
//! An adapter turns one configured site into products: it discovers product URLs from the
//! site's listing pages, fetches each product page, and parses the page into a
//! [`Product`]. The [`GenericAdapter`] does all three from configured selectors; bespoke
//! adapters (such as [`JsonLdAdapter`]) override the steps they need and delegate the rest.
//!
//! Adapters are picked by name through an [`AdapterRegistry`]. A name with no registered
//! constructor falls back to the generic adapter.

mod generic;
mod json_ld;

pub use generic::GenericAdapter;
pub use json_ld::JsonLdAdapter;

use crate::config::SiteConfig;
use crate::crawler::{CrawlClient, FetchedPage, HeadlessRenderer};
use crate::product::Product;
use crate::ShelfError;
use async_trait::async_trait;
use std::borrow::Cow;
use std::collections::HashMap;

/// A fetched product page as handed to [`SiteAdapter::parse_product`]
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    /// URL as discovered
    pub url: String,
    /// URL after redirects; relative links on the page resolve against it
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawPage {
    /// The placeholder returned when a product page could not be fetched
    pub fn empty(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            ..Self::default()
        }
    }

    pub fn from_fetched(url: impl Into<String>, page: FetchedPage) -> Self {
        Self {
            url: url.into(),
            final_url: page.final_url.to_string(),
            content_type: page.content_type,
            body: page.body,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Body decoded as UTF-8, with invalid sequences replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// File extension for the raw artifact, from the content type
    ///
    /// | Content type | Extension |
    /// |--------------|-----------|
    /// | `*json` | `json` |
    /// | `*xml` except XHTML | `xml` |
    /// | `text/plain` | `txt` |
    /// | anything else, or none | `html` |
    pub fn extension(&self) -> &'static str {
        let Some(content_type) = self.content_type.as_deref() else {
            return "html";
        };
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if mime.ends_with("json") {
            "json"
        } else if mime.ends_with("xml") && mime != "application/xhtml+xml" {
            "xml"
        } else if mime == "text/plain" {
            "txt"
        } else {
            "html"
        }
    }
}

/// The discover / fetch / parse contract every site implements
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn site(&self) -> &SiteConfig;

    /// Product URLs from the site's listing pages, de-duplicated in discovery order
    ///
    /// Fails with [`ShelfError::DiscoveryFailed`] when no listing page could be fetched.
    async fn discover_product_urls(&self) -> Result<Vec<String>, ShelfError>;

    /// The product page at `url`, or why it could not be fetched
    ///
    /// The Runner calls this so that [`ShelfError::PolicyUnavailable`] (strict robots mode)
    /// can fail the site rather than skip one product.
    async fn try_fetch_product(&self, url: &str) -> Result<RawPage, ShelfError>;

    /// The product page at `url`; an empty page when it could not be fetched
    async fn fetch_product(&self, url: &str) -> RawPage {
        match self.try_fetch_product(url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(site = %self.site().name, url, error = %e, "skipping product");
                RawPage::empty(url)
            }
        }
    }

    /// Extracts a product from `page`, with its content hash computed
    fn parse_product(&self, page: &RawPage) -> Product;
}

/// Everything an adapter constructor receives for one site
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub site: SiteConfig,
    pub client: CrawlClient,
    /// Present when the site renders product pages headlessly
    pub renderer: Option<HeadlessRenderer>,
}

pub type AdapterFactory = fn(AdapterContext) -> Box<dyn SiteAdapter>;

/// Adapter constructors by name
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    /// A registry with no bespoke adapters; every site gets the generic one
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, factory: AdapterFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Builds the adapter for `ctx.site`, looked up by [`SiteConfig::adapter_key`]
    ///
    /// # Arguments
    ///
    /// * `ctx` - The site, its gated client and optional headless renderer
    ///
    /// # Returns
    ///
    /// The registered adapter, or a [`GenericAdapter`] when none is registered under the key
    pub fn build(&self, ctx: AdapterContext) -> Box<dyn SiteAdapter> {
        match self.factories.get(ctx.site.adapter_key()) {
            Some(factory) => factory(ctx),
            None => {
                tracing::debug!(
                    site = %ctx.site.name,
                    adapter = ctx.site.adapter_key(),
                    "no bespoke adapter registered; using generic"
                );
                Box::new(GenericAdapter::new(ctx))
            }
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(JsonLdAdapter::NAME, JsonLdAdapter::boxed);
        registry
    }
}
