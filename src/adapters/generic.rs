//! Selector-driven adapter used for every site without a bespoke one

use crate::adapters::{AdapterContext, RawPage, SiteAdapter};
use crate::config::{SelectorConfig, SiteConfig};
use crate::crawler::{CrawlClient, HeadlessRenderer, PageExtractor};
use crate::product::normalize::{
    detect_currency, normalize_currency, parse_availability, parse_count, parse_price,
    parse_rating,
};
use crate::product::Product;
use crate::url::parse_page_url;
use crate::ShelfError;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use url::Url;

/// Listing pages fetched per site when `max-pages` is not set
pub const DEFAULT_MAX_PAGES: usize = 50;

/// Links found on one listing page
#[derive(Debug, Default)]
struct ListingPage {
    products: Vec<String>,
    next: Option<String>,
}

fn parse_listing(html: &str, selectors: &SelectorConfig, base: &Url) -> ListingPage {
    let doc = PageExtractor::new(html);
    ListingPage {
        products: doc.links(&selectors.product_link, Some(base)),
        next: selectors
            .next_page
            .as_deref()
            .and_then(|sel| doc.links(sel, Some(base)).into_iter().next()),
    }
}

/// Strips a leading `SKU:` style label
fn clean_sku(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let value = match trimmed.split_once(':') {
        Some((label, rest)) if label.trim().eq_ignore_ascii_case("sku") => rest.trim(),
        _ => trimmed,
    };
    (!value.is_empty()).then(|| value.to_string())
}

/// Adapter driven entirely by the site's configured selectors
///
/// Discovery walks the start URLs as listing pages, following `next-page` links, until
/// `max-pages` listing fetches have been attempted. Product pages come over HTTP, or through
/// the headless renderer when the site sets `use-headless`.
pub struct GenericAdapter {
    site: SiteConfig,
    client: CrawlClient,
    renderer: Option<HeadlessRenderer>,
}

impl GenericAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self {
            site: ctx.site,
            client: ctx.client,
            renderer: ctx.renderer,
        }
    }

    /// Fills a product from the configured selectors, without computing its hash
    ///
    /// Bespoke adapters call this and then override fields before hashing.
    ///
    /// # Arguments
    ///
    /// * `page` - A non-empty fetched page; relative image links resolve against its final URL
    ///
    /// # Returns
    ///
    /// A [`Product`] whose missing fields are `None` or empty; never an error
    pub fn extract(&self, page: &RawPage) -> Product {
        let html = page.text();
        let doc = PageExtractor::new(&html);
        let base = Url::parse(&page.final_url).ok();
        let selectors = &self.site.selectors;
        let field = |sel: &Option<String>| sel.as_deref().and_then(|s| doc.text(s));

        let mut product = Product::new(&self.site.name, &page.url);
        product.title = doc.text(&selectors.title);

        let price_text = field(&selectors.price);
        product.price = price_text.as_deref().and_then(parse_price);
        product.currency = field(&selectors.currency)
            .as_deref()
            .and_then(normalize_currency)
            .or_else(|| price_text.as_deref().and_then(detect_currency))
            .or_else(|| self.site.currency.as_deref().and_then(normalize_currency));

        product.sku = selectors
            .sku
            .as_deref()
            .and_then(|sel| doc.text(sel).or_else(|| doc.attr(sel, "content")))
            .as_deref()
            .and_then(clean_sku);

        let stock_text = field(&selectors.in_stock);
        product.in_stock = parse_availability(
            stock_text.as_deref(),
            self.site.stock_text_contains.as_deref(),
        );
        product.stock_text = stock_text;

        if let Some(sel) = selectors.images.as_deref() {
            product.images = doc.images(sel, base.as_ref());
        }
        if let Some(sel) = selectors.categories.as_deref() {
            product.categories = doc.texts(sel);
        }
        product.reviews_count = field(&selectors.reviews_count).and_then(|t| parse_count(&t));
        product.rating = field(&selectors.rating).and_then(|t| parse_rating(&t));

        product
    }

    /// Robots and rate-limit gating apply on both paths
    async fn try_fetch(&self, url: &str) -> Result<RawPage, ShelfError> {
        let parsed = parse_page_url(url)?;

        match &self.renderer {
            Some(renderer) => {
                self.client.admit(&parsed).await?;
                let body = renderer.render(&parsed).await?;
                Ok(RawPage {
                    url: url.to_string(),
                    final_url: parsed.to_string(),
                    content_type: Some("text/html".to_string()),
                    body,
                })
            }
            None => Ok(RawPage::from_fetched(url, self.client.fetch(&parsed).await?)),
        }
    }
}

#[async_trait]
impl SiteAdapter for GenericAdapter {
    fn site(&self) -> &SiteConfig {
        &self.site
    }

    async fn discover_product_urls(&self) -> Result<Vec<String>, ShelfError> {
        let site = &self.site.name;
        let max_pages = self.site.max_pages.unwrap_or(DEFAULT_MAX_PAGES);

        let mut queue: VecDeque<String> = self.site.start_urls.iter().cloned().collect();
        let mut visited = HashSet::new();
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        let mut attempted = 0usize;
        let mut fetched = 0usize;
        let mut last_error = None;

        while let Some(listing) = queue.pop_front() {
            if attempted >= max_pages {
                tracing::debug!(site = %site, max_pages, "listing page budget reached");
                break;
            }

            let url = match parse_page_url(&listing) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(site = %site, url = %listing, error = %e, "bad listing URL");
                    last_error = Some(e.to_string());
                    continue;
                }
            };
            if !visited.insert(url.to_string()) {
                continue;
            }
            attempted += 1;

            let page = match self.client.fetch(&url).await {
                Ok(page) => page,
                Err(e @ ShelfError::PolicyUnavailable { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(site = %site, url = %url, error = %e, "listing page failed");
                    last_error = Some(e.to_string());
                    continue;
                }
            };
            fetched += 1;

            let listing = parse_listing(
                &String::from_utf8_lossy(&page.body),
                &self.site.selectors,
                &page.final_url,
            );
            tracing::debug!(
                site = %site,
                url = %url,
                products = listing.products.len(),
                "listing page parsed"
            );

            for link in listing.products {
                match parse_page_url(&link) {
                    Ok(product_url) => {
                        if seen.insert(product_url.to_string()) {
                            urls.push(product_url.to_string());
                        }
                    }
                    Err(e) => tracing::debug!(url = %link, error = %e, "skipping product link"),
                }
            }
            if let Some(next) = listing.next {
                queue.push_front(next);
            }
        }

        if fetched == 0 {
            return Err(ShelfError::DiscoveryFailed {
                site: site.clone(),
                reason: last_error.unwrap_or_else(|| "no listing pages".to_string()),
            });
        }

        if let Some(max_urls) = self.site.max_urls {
            urls.truncate(max_urls);
        }

        tracing::info!(site = %site, pages = fetched, urls = urls.len(), "discovery complete");
        Ok(urls)
    }

    async fn try_fetch_product(&self, url: &str) -> Result<RawPage, ShelfError> {
        self.try_fetch(url).await
    }

    fn parse_product(&self, page: &RawPage) -> Product {
        self.extract(page).ensure_hash()
    }
}
