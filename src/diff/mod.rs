//! Snapshot diffing
//!
//! [`diff`] matches two snapshots by [`Product::dedupe_key`] and reports what moved:
//! new and gone products, plus field-level deltas for products whose content hash changed.
//! Within one snapshot the last record per key wins, so a same-day re-run that appended a
//! second observation is diffed on its latest state.

use crate::product::Product;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};
use std::collections::{BTreeMap, HashMap};

/// Aggregate counters of a change report
///
/// A product whose price rose and that went out of stock counts in both `price_up` and
/// `out_of_stock`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounters {
    pub new: usize,
    pub gone: usize,
    pub price_up: usize,
    pub price_down: usize,
    pub back_in_stock: usize,
    pub out_of_stock: usize,
}

impl ChangeCounters {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Gone,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub old: Value,
    pub new: Value,
}

/// One entry of a change report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductChange {
    pub key: String,
    pub kind: ChangeKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Differing attributes; only for [`ChangeKind::Changed`]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldDelta>,
}

/// Result of diffing two snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub counters: ChangeCounters,
    pub changes: Vec<ProductChange>,
}

impl ChangeReport {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn change(&self, key: &str) -> Option<&ProductChange> {
        self.changes.iter().find(|c| c.key == key)
    }
}

/// A change report as persisted for one `(site, date)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEnvelope {
    pub site: String,
    pub date: NaiveDate,
    /// Date of the snapshot diffed against
    pub baseline_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: ChangeReport,
}

impl ReportEnvelope {
    pub fn new(site: impl Into<String>, date: NaiveDate, baseline_date: NaiveDate, report: ChangeReport) -> Self {
        Self {
            site: site.into(),
            date,
            baseline_date,
            generated_at: Utc::now(),
            report,
        }
    }
}

/// Products keyed by dedupe key, in first-appearance order, holding the last record per key
pub fn dedupe_last_wins(products: &[Product]) -> Vec<(String, &Product)> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut entries: Vec<(String, &Product)> = Vec::new();

    for product in products {
        let key = product.dedupe_key();
        match position.get(&key) {
            Some(&i) => entries[i].1 = product,
            None => {
                position.insert(key.clone(), entries.len());
                entries.push((key, product));
            }
        }
    }

    entries
}

/// Diffs `current` against `previous`
///
/// Entries for new and changed products come in `current` order, followed by gone products
/// in `previous` order.
///
/// # Examples
///
/// ```
/// use shelfwatch::{diff, Product};
///
/// let snapshot = vec![Product::new("shop", "https://shop.test/p/1").ensure_hash()];
/// assert!(diff(&snapshot, &snapshot).is_empty());
/// ```
pub fn diff(previous: &[Product], current: &[Product]) -> ChangeReport {
    let previous = dedupe_last_wins(previous);
    let current = dedupe_last_wins(current);

    let previous_by_key: HashMap<&str, &Product> =
        previous.iter().map(|(k, p)| (k.as_str(), *p)).collect();
    let current_by_key: HashMap<&str, &Product> =
        current.iter().map(|(k, p)| (k.as_str(), *p)).collect();

    let mut report = ChangeReport::default();

    for (key, new) in &current {
        match previous_by_key.get(key.as_str()) {
            None => {
                report.counters.new += 1;
                report.changes.push(entry(key, ChangeKind::New, new));
            }
            Some(old) if hash_of(old) != hash_of(new) => {
                classify(&mut report.counters, old, new);
                let mut change = entry(key, ChangeKind::Changed, new);
                change.fields = field_deltas(old, new);
                report.changes.push(change);
            }
            Some(_) => {}
        }
    }

    for (key, old) in &previous {
        if !current_by_key.contains_key(key.as_str()) {
            report.counters.gone += 1;
            report.changes.push(entry(key, ChangeKind::Gone, old));
        }
    }

    report
}

fn entry(key: &str, kind: ChangeKind, product: &Product) -> ProductChange {
    ProductChange {
        key: key.to_string(),
        kind,
        url: product.url.clone(),
        title: product.title.clone(),
        fields: BTreeMap::new(),
    }
}

/// Stored hash, or a fresh one for records written without it
fn hash_of(product: &Product) -> String {
    if product.content_hash.is_empty() {
        product.compute_hash()
    } else {
        product.content_hash.clone()
    }
}

fn classify(counters: &mut ChangeCounters, old: &Product, new: &Product) {
    if let (Some(before), Some(after)) = (old.price, new.price) {
        if after > before {
            counters.price_up += 1;
        } else if after < before {
            counters.price_down += 1;
        }
    }

    match (old.in_stock.is_in_stock(), new.in_stock.is_in_stock()) {
        (false, true) => counters.back_in_stock += 1,
        (true, false) => counters.out_of_stock += 1,
        _ => {}
    }
}

/// A price as a JSON number; `10.00` becomes `10`, `12.50` becomes `12.5`
fn price_value(price: Option<Decimal>) -> Value {
    price
        .and_then(|p| p.normalize().to_string().parse::<Number>().ok())
        .map_or(Value::Null, Value::Number)
}

fn field_deltas(old: &Product, new: &Product) -> BTreeMap<String, FieldDelta> {
    let fields = [
        ("title", json!(old.title), json!(new.title)),
        ("price", price_value(old.price), price_value(new.price)),
        ("currency", json!(old.currency), json!(new.currency)),
        ("in_stock", json!(old.in_stock), json!(new.in_stock)),
        ("stock_text", json!(old.stock_text), json!(new.stock_text)),
        ("images", json!(old.images), json!(new.images)),
        ("categories", json!(old.categories), json!(new.categories)),
        ("reviews_count", json!(old.reviews_count), json!(new.reviews_count)),
        ("rating", json!(old.rating), json!(new.rating)),
        ("sku", json!(old.sku), json!(new.sku)),
        ("url", json!(old.url), json!(new.url)),
    ];

    fields
        .into_iter()
        .filter(|(_, before, after)| before != after)
        .map(|(name, old, new)| (name.to_string(), FieldDelta { old, new }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::Availability;

    fn product(sku: &str, price: Option<i64>, stock: Availability) -> Product {
        let mut p = Product::new("shop", format!("https://shop.test/p/{}", sku));
        p.sku = Some(sku.to_string());
        p.title = Some(format!("Item {}", sku));
        p.price = price.map(|p| Decimal::new(p, 0));
        p.in_stock = stock;
        p.ensure_hash()
    }

    fn keys(report: &ChangeReport, kind: ChangeKind) -> Vec<&str> {
        report
            .changes
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.key.as_str())
            .collect()
    }

    #[test]
    fn test_new_gone_and_price_up() {
        let previous = vec![
            product("A", Some(10), Availability::InStock),
            product("B", Some(20), Availability::InStock),
        ];
        let current = vec![
            product("A", Some(12), Availability::InStock),
            product("C", Some(5), Availability::InStock),
        ];

        let report = diff(&previous, &current);
        assert_eq!(keys(&report, ChangeKind::New), vec!["shop::C"]);
        assert_eq!(keys(&report, ChangeKind::Gone), vec!["shop::B"]);

        let a = report.change("shop::A").unwrap();
        assert_eq!(a.kind, ChangeKind::Changed);
        assert_eq!(
            a.fields.get("price"),
            Some(&FieldDelta {
                old: json!(10),
                new: json!(12)
            })
        );
        assert_eq!(
            report.counters,
            ChangeCounters {
                new: 1,
                gone: 1,
                price_up: 1,
                ..ChangeCounters::default()
            }
        );
    }

    #[test]
    fn test_identical_snapshots_produce_empty_report() {
        let snapshot = vec![
            product("A", Some(10), Availability::InStock),
            product("B", None, Availability::Unknown),
        ];
        let report = diff(&snapshot, &snapshot);
        assert!(report.is_empty());
        assert!(report.counters.is_zero());
    }

    #[test]
    fn test_non_material_change_is_ignored() {
        let previous = vec![product("A", Some(10), Availability::InStock)];
        let mut moved = previous[0].clone();
        moved.rating = Some(4.9);
        moved.categories = vec!["Sale".to_string()];
        let current = vec![moved.ensure_hash()];

        assert!(diff(&previous, &current).is_empty());
    }

    #[test]
    fn test_stock_transitions() {
        let previous = vec![
            product("A", Some(10), Availability::OutOfStock),
            product("B", Some(10), Availability::Unknown),
            product("C", Some(10), Availability::InStock),
            product("D", Some(10), Availability::InStock),
        ];
        let current = vec![
            product("A", Some(10), Availability::InStock),
            product("B", Some(10), Availability::InStock),
            product("C", Some(10), Availability::OutOfStock),
            product("D", Some(10), Availability::Unknown),
        ];

        let report = diff(&previous, &current);
        assert_eq!(report.counters.back_in_stock, 2);
        assert_eq!(report.counters.out_of_stock, 2);
        assert_eq!(report.counters.price_up + report.counters.price_down, 0);
        assert_eq!(report.changes.len(), 4);
    }

    #[test]
    fn test_price_and_stock_counted_independently() {
        let previous = vec![product("A", Some(10), Availability::InStock)];
        let current = vec![product("A", Some(8), Availability::OutOfStock)];

        let report = diff(&previous, &current);
        assert_eq!(report.counters.price_down, 1);
        assert_eq!(report.counters.out_of_stock, 1);

        let fields = &report.change("shop::A").unwrap().fields;
        assert!(fields.contains_key("price"));
        assert!(fields.contains_key("in_stock"));
        assert!(!fields.contains_key("title"));
    }

    #[test]
    fn test_missing_price_is_changed_but_not_counted() {
        let previous = vec![product("A", None, Availability::InStock)];
        let current = vec![product("A", Some(10), Availability::InStock)];

        let report = diff(&previous, &current);
        assert_eq!(report.changes.len(), 1);
        assert!(report.counters.is_zero());
        assert_eq!(
            report.change("shop::A").unwrap().fields["price"].old,
            Value::Null
        );
    }

    #[test]
    fn test_price_delta_is_a_json_number() {
        let mut old = product("A", None, Availability::InStock);
        old.price = Some(Decimal::new(999, 2));
        let mut new = old.clone();
        new.price = Some(Decimal::new(1250, 2));

        let report = diff(&[old.ensure_hash()], &[new.ensure_hash()]);
        let price = &report.change("shop::A").unwrap().fields["price"];
        assert_eq!(price.old, json!(9.99));
        assert_eq!(price.new, json!(12.5));
        assert_eq!(report.counters.price_up, 1);

        let encoded = serde_json::to_string(price).unwrap();
        assert_eq!(encoded, r#"{"old":9.99,"new":12.5}"#);
    }

    #[test]
    fn test_last_occurrence_per_key_wins_within_a_snapshot() {
        // Same-day re-run appended a second, newer observation of A
        let previous = vec![product("A", Some(10), Availability::InStock)];
        let current = vec![
            product("A", Some(15), Availability::InStock),
            product("B", Some(1), Availability::InStock),
            product("A", Some(10), Availability::InStock),
        ];

        let report = diff(&previous, &current);
        assert!(report.change("shop::A").is_none());
        assert_eq!(keys(&report, ChangeKind::New), vec!["shop::B"]);
    }

    #[test]
    fn test_entry_order() {
        let previous = vec![
            product("G2", Some(1), Availability::InStock),
            product("A", Some(1), Availability::InStock),
            product("G1", Some(1), Availability::InStock),
        ];
        let current = vec![
            product("N", Some(1), Availability::InStock),
            product("A", Some(2), Availability::InStock),
        ];

        let report = diff(&previous, &current);
        let order: Vec<&str> = report.changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(order, vec!["shop::N", "shop::A", "shop::G2", "shop::G1"]);
    }

    #[test]
    fn test_envelope_serializes_flat() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let baseline = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let envelope = ReportEnvelope::new("shop", date, baseline, ChangeReport::default());

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["date"], "2024-05-02");
        assert_eq!(value["baseline_date"], "2024-05-01");
        assert_eq!(value["counters"]["new"], 0);
        assert!(value["changes"].as_array().unwrap().is_empty());

        let back: ReportEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }
}
