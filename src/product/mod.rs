//! Normalized product records
//!
//! A [`Product`] is one observed state of one item on one site at one capture time. Two
//! derived values make snapshots comparable:
//!
//! - [`Product::content_hash`] covers only the material fields (title, price, availability,
//!   images), so a re-crawl where nothing material moved is a no-op for the diff.
//! - [`Product::dedupe_key`] matches the same logical item across snapshots: `site::sku`
//!   when the site assigns a SKU, `site::<sha256(url)>` otherwise.

pub mod catalog;
pub mod normalize;

pub use catalog::{price_delta_vs_catalog, Catalog, CatalogRow};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Tri-state stock evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    InStock,
    OutOfStock,
    #[default]
    Unknown,
}

impl Availability {
    pub fn is_in_stock(self) -> bool {
        self == Self::InStock
    }
}

/// One normalized product observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub site: String,
    pub url: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub in_stock: Availability,
    #[serde(default)]
    pub stock_text: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub reviews_count: Option<u32>,
    #[serde(default)]
    pub rating: Option<f64>,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub content_hash: String,
    /// `price - catalog price` at parse time; informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_delta_vs_catalog: Option<Decimal>,
}

impl Product {
    /// Creates an empty observation of `url` on `site`, captured now
    pub fn new(site: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            url: url.into(),
            sku: None,
            title: None,
            price: None,
            currency: None,
            in_stock: Availability::Unknown,
            stock_text: None,
            images: Vec::new(),
            categories: Vec::new(),
            reviews_count: None,
            rating: None,
            captured_at: Utc::now(),
            content_hash: String::new(),
            price_delta_vs_catalog: None,
        }
    }

    /// Stable identity across snapshots
    ///
    /// # Examples
    ///
    /// ```
    /// use shelfwatch::Product;
    ///
    /// let mut p = Product::new("shop.test", "https://shop.test/p/1");
    /// p.sku = Some("AB-1".to_string());
    /// assert_eq!(p.dedupe_key(), "shop.test::AB-1");
    /// ```
    pub fn dedupe_key(&self) -> String {
        match self.sku.as_deref().map(str::trim) {
            Some(sku) if !sku.is_empty() => format!("{}::{}", self.site, sku),
            _ => format!("{}::{}", self.site, sha256_hex(self.url.as_bytes())),
        }
    }

    /// Hash over title, price, availability and images (order-sensitive)
    pub fn compute_hash(&self) -> String {
        // JSON keeps field boundaries unambiguous, unlike a joined string
        let material = (
            &self.title,
            self.price.map(|p| p.normalize().to_string()),
            self.in_stock,
            &self.images,
        );
        let encoded = serde_json::to_vec(&material).unwrap_or_default();
        sha256_hex(&encoded)
    }

    /// Recomputes [`Product::content_hash`]; called once parsing is complete
    pub fn ensure_hash(mut self) -> Self {
        self.content_hash = self.compute_hash();
        self
    }
}

/// Hex-encoded SHA-256 digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
