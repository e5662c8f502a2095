//! Adapter for shops that publish schema.org `Product` data as JSON-LD
//!
//! Discovery and fetching are the generic ones. Parsing reads the first `Product` node in
//! the page's `application/ld+json` blocks; fields it lacks come from the configured
//! selectors.

use crate::adapters::{AdapterContext, GenericAdapter, RawPage, SiteAdapter};
use crate::config::SiteConfig;
use crate::crawler::PageExtractor;
use crate::product::normalize::{normalize_currency, parse_price, parse_schema_availability};
use crate::product::Product;
use crate::ShelfError;
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

const LD_JSON_SELECTOR: &str = r#"script[type="application/ld+json"]"#;

pub struct JsonLdAdapter {
    inner: GenericAdapter,
}

impl JsonLdAdapter {
    /// Registry name
    pub const NAME: &'static str = "json-ld";

    pub fn new(ctx: AdapterContext) -> Self {
        Self {
            inner: GenericAdapter::new(ctx),
        }
    }

    pub fn boxed(ctx: AdapterContext) -> Box<dyn SiteAdapter> {
        Box::new(Self::new(ctx))
    }
}

#[async_trait]
impl SiteAdapter for JsonLdAdapter {
    fn site(&self) -> &SiteConfig {
        self.inner.site()
    }

    async fn discover_product_urls(&self) -> Result<Vec<String>, ShelfError> {
        self.inner.discover_product_urls().await
    }

    async fn try_fetch_product(&self, url: &str) -> Result<RawPage, ShelfError> {
        self.inner.try_fetch_product(url).await
    }

    fn parse_product(&self, page: &RawPage) -> Product {
        let mut product = self.inner.extract(page);

        let html = page.text();
        let node = PageExtractor::new(&html)
            .raw_texts(LD_JSON_SELECTOR)
            .iter()
            .filter_map(|block| serde_json::from_str::<Value>(block.trim()).ok())
            .find_map(|doc| find_product(&doc).cloned());

        match node {
            Some(node) => {
                let base = Url::parse(&page.final_url).ok();
                apply_product_node(&mut product, &node, base.as_ref());
            }
            None => tracing::debug!(url = %page.url, "no JSON-LD product; using selectors only"),
        }

        product.ensure_hash()
    }
}

/// First node typed `Product`, searching arrays and `@graph`
fn find_product(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_product),
        Value::Object(map) => {
            if is_product_type(map.get("@type")) {
                Some(value)
            } else {
                map.get("@graph").and_then(find_product)
            }
        }
        _ => None,
    }
}

fn is_product_type(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(t)) => t == "Product",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("Product")),
        _ => false,
    }
}

fn apply_product_node(product: &mut Product, node: &Value, base: Option<&Url>) {
    if let Some(name) = string_field(node, "name") {
        product.title = Some(name);
    }
    if let Some(sku) = string_field(node, "sku") {
        product.sku = Some(sku);
    }

    let categories = string_list(node.get("category"));
    if !categories.is_empty() {
        product.categories = categories;
    }

    let images: Vec<String> = image_urls(node.get("image"))
        .into_iter()
        .filter_map(|raw| match base {
            Some(base) => base.join(&raw).ok().map(String::from),
            None => Url::parse(&raw).ok().map(String::from),
        })
        .collect();
    if !images.is_empty() {
        product.images = dedupe(images);
    }

    if let Some(offer) = first_offer(node.get("offers")) {
        if let Some(price) = offer.get("price").and_then(price_value) {
            product.price = Some(price);
        }
        if let Some(currency) = string_field(offer, "priceCurrency")
            .as_deref()
            .and_then(normalize_currency)
        {
            product.currency = Some(currency);
        }
        if let Some(availability) = string_field(offer, "availability") {
            product.in_stock = parse_schema_availability(&availability);
            product.stock_text = Some(availability);
        }
    }

    if let Some(rating) = node.get("aggregateRating") {
        if let Some(value) = rating.get("ratingValue").and_then(number_value) {
            product.rating = Some(value);
        }
        if let Some(count) = rating
            .get("reviewCount")
            .or_else(|| rating.get("ratingCount"))
            .and_then(count_value)
        {
            product.reviews_count = Some(count);
        }
    }
}

fn string_field(node: &Value, key: &str) -> Option<String> {
    match node.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split('>')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn image_urls(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items.iter().flat_map(|i| image_urls(Some(i))).collect(),
        Some(Value::Object(map)) => map
            .get("url")
            .or_else(|| map.get("contentUrl"))
            .and_then(Value::as_str)
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn first_offer(value: Option<&Value>) -> Option<&Value> {
    let value = value?;
    match value {
        Value::Array(offers) => offers.first(),
        // AggregateOffer wrapping individual offers
        Value::Object(map) if map.get("price").is_none() => match map.get("offers") {
            Some(inner) => first_offer(Some(inner)).or(Some(value)),
            None => Some(value),
        },
        Value::Object(_) => Some(value),
        _ => None,
    }
}

fn price_value(value: &Value) -> Option<rust_decimal::Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => parse_price(s),
        _ => None,
    }
}

fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A non-negative whole number that fits a `u32`
fn count_value(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    let n = number_value(value)?;
    (n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX)).then(|| n as u32)
}

fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}
