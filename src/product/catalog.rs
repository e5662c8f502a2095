//! Reference catalog for price comparisons
//!
//! The catalog is a CSV with a header row containing at least `sku` and `price`; other
//! columns are ignored. Prices stay as raw text until a lookup needs them, so one malformed
//! row only affects lookups for its own SKU.

use rust_decimal::Decimal;
use std::mem::take;
use std::path::Path;
use std::str::FromStr;

/// One catalog row (raw text as read from the CSV)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub sku: String,
    pub price: String,
}

impl CatalogRow {
    pub fn new(sku: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            price: price.into(),
        }
    }
}

/// Loaded catalog rows in file order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    rows: Vec<CatalogRow>,
}

impl Catalog {
    pub fn new(rows: Vec<CatalogRow>) -> Self {
        Self { rows }
    }

    /// Reads a catalog CSV from disk
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_csv(&text))
    }

    /// Parses catalog CSV text; without `sku` and `price` headers the catalog is empty
    pub fn from_csv(text: &str) -> Self {
        let mut rows = parse_rows(text.trim_start_matches('\u{feff}'), ',').into_iter();

        let Some(header) = rows.next() else {
            return Self::default();
        };
        let column = |name: &str| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let (Some(sku_col), Some(price_col)) = (column("sku"), column("price")) else {
            tracing::warn!("Catalog CSV has no sku/price header; ignoring it");
            return Self::default();
        };

        let rows = rows
            .map(|row| {
                let cell = |i: usize| row.get(i).map(|c| c.trim().to_string()).unwrap_or_default();
                CatalogRow::new(cell(sku_col), cell(price_col))
            })
            .collect();

        Self { rows }
    }

    pub fn rows(&self) -> &[CatalogRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn price_delta(&self, sku: Option<&str>, price: Option<Decimal>) -> Option<Decimal> {
        price_delta_vs_catalog(sku, price, &self.rows)
    }
}

/// `price - catalog price` for the first catalog row with a matching SKU
///
/// Returns `None` when the SKU is empty, the price is missing, no row matches, or the
/// matching row's price does not parse as a number.
///
/// # Examples
///
/// ```
/// use rust_decimal::Decimal;
/// use shelfwatch::product::{price_delta_vs_catalog, CatalogRow};
///
/// let rows = [CatalogRow::new("X", "12.00")];
/// let delta = price_delta_vs_catalog(Some("X"), Some(Decimal::new(999, 2)), &rows);
/// assert_eq!(delta, Some(Decimal::new(-201, 2)));
/// ```
pub fn price_delta_vs_catalog(
    sku: Option<&str>,
    price: Option<Decimal>,
    rows: &[CatalogRow],
) -> Option<Decimal> {
    let sku = sku.map(str::trim).filter(|s| !s.is_empty())?;
    let price = price?;
    let row = rows.iter().find(|row| row.sku == sku)?;
    let catalog_price = Decimal::from_str(row.price.trim()).ok()?;
    Some(price - catalog_price)
}

/// Minimal CSV parser (quotes + CRLF tolerant)
fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes && matches!(chars.peek(), Some('"')) {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = !in_quotes;
                }
            }
            c if c == sep && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    // Flush a trailing row without a final newline
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}
