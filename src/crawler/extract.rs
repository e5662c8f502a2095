//! Selector-driven extraction from raw markup
//!
//! Everything here degrades instead of failing: a selector that does not parse or does not
//! match yields an empty list or `None`. Site markup evolves; a missed field should cost one
//! attribute of one product, not the run.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// A parsed document that several fields are extracted from
pub struct PageExtractor {
    document: Html,
}

impl PageExtractor {
    pub fn new(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }

    /// Trimmed, whitespace-collapsed text of the first element matching `selector`
    ///
    /// Empty text counts as no match.
    pub fn text(&self, selector: &str) -> Option<String> {
        let selector = parse_selector(selector)?;
        self.document
            .select(&selector)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
    }

    /// Text of every matching element, skipping empties, de-duplicated in order
    pub fn texts(&self, selector: &str) -> Vec<String> {
        let Some(selector) = parse_selector(selector) else {
            return Vec::new();
        };
        dedupe(
            self.document
                .select(&selector)
                .map(element_text)
                .filter(|t| !t.is_empty()),
        )
    }

    /// First non-empty value of `attr` among elements matching `selector`
    pub fn attr(&self, selector: &str, attr: &str) -> Option<String> {
        let selector = parse_selector(selector)?;
        self.document
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Values of the first present attribute in `attrs` for each matching element,
    /// resolved against `base_url` when given
    ///
    /// Order-preserving and de-duplicated.
    pub fn urls(&self, selector: &str, attrs: &[&str], base_url: Option<&Url>) -> Vec<String> {
        let Some(selector) = parse_selector(selector) else {
            return Vec::new();
        };
        dedupe(self.document.select(&selector).filter_map(|el| {
            let raw = attrs
                .iter()
                .filter_map(|a| el.value().attr(a))
                .map(str::trim)
                .find(|v| !v.is_empty())?;
            resolve_link(raw, base_url)
        }))
    }

    /// Absolute `href` targets of elements matching `selector`
    pub fn links(&self, selector: &str, base_url: Option<&Url>) -> Vec<String> {
        self.urls(selector, &["href"], base_url)
    }

    /// Image sources, falling back to lazy-load attributes
    pub fn images(&self, selector: &str, base_url: Option<&Url>) -> Vec<String> {
        self.urls(
            selector,
            &["src", "data-src", "data-original", "href", "content"],
            base_url,
        )
    }

    /// Raw inner text of every element matching `selector` (no whitespace collapsing)
    pub fn raw_texts(&self, selector: &str) -> Vec<String> {
        let Some(selector) = parse_selector(selector) else {
            return Vec::new();
        };
        self.document
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .collect()
    }
}

/// Ordered, de-duplicated absolute URLs from `href`s matching `selector`
///
/// # Example
///
/// ```
/// use shelfwatch::crawler::extract_links;
/// use url::Url;
///
/// let html = r#"<a class="p" href="/p/1">A</a><a class="p" href="/p/1">A again</a>"#;
/// let base = Url::parse("https://shop.test/cat").unwrap();
/// assert_eq!(extract_links(html, "a.p", Some(&base)), vec!["https://shop.test/p/1"]);
/// ```
pub fn extract_links(html: &str, selector: &str, base_url: Option<&Url>) -> Vec<String> {
    PageExtractor::new(html).links(selector, base_url)
}

/// Trimmed text of the first element matching `selector`
pub fn extract_text(html: &str, selector: &str) -> Option<String> {
    PageExtractor::new(html).text(selector)
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(selector, error = ?e, "selector does not parse; treating as no match");
            None
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn dedupe(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}

/// Resolves an attribute value to an absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel:, data: schemes
/// - Fragment-only links
/// - Relative links without a base
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: Option<&Url>) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let resolved = match base_url {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };

    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://shop.test/cat").unwrap()
    }

    #[test]
    fn test_relative_link_resolves_against_base() {
        let html = r#"<html><body><a class="p" href="/p/1">One</a></body></html>"#;
        assert_eq!(
            extract_links(html, "a.p", Some(&base_url())),
            vec!["https://shop.test/p/1"]
        );
    }

    #[test]
    fn test_relative_path_link() {
        let html = r#"<a class="p" href="p/2">Two</a>"#;
        let base = Url::parse("https://shop.test/cat/").unwrap();
        assert_eq!(
            extract_links(html, "a.p", Some(&base)),
            vec!["https://shop.test/cat/p/2"]
        );
    }

    #[test]
    fn test_absolute_link_passes_through() {
        let html = r#"<a class="p" href="https://cdn.other.test/x?y=1">X</a>"#;
        assert_eq!(
            extract_links(html, "a.p", Some(&base_url())),
            vec!["https://cdn.other.test/x?y=1"]
        );
    }

    #[test]
    fn test_links_deduplicated_in_first_seen_order() {
        let html = r#"
            <a class="p" href="/p/2">B</a>
            <a class="p" href="/p/1">A</a>
            <a class="p" href="https://shop.test/p/2">B again</a>
            <a class="p" href="/p/3">C</a>
        "#;
        assert_eq!(
            extract_links(html, "a.p", Some(&base_url())),
            vec![
                "https://shop.test/p/2",
                "https://shop.test/p/1",
                "https://shop.test/p/3",
            ]
        );
    }

    #[test]
    fn test_relative_link_without_base_is_dropped() {
        let html = r#"<a href="/p/1">A</a><a href="https://shop.test/p/9">B</a>"#;
        assert_eq!(extract_links(html, "a", None), vec!["https://shop.test/p/9"]);
    }

    #[test]
    fn test_skip_special_schemes() {
        let html = r##"
            <a href="javascript:void(0)">J</a>
            <a href="mailto:a@shop.test">M</a>
            <a href="tel:+123">T</a>
            <a href="#reviews">F</a>
            <a href="ftp://shop.test/file">FTP</a>
            <a href="/ok">OK</a>
        "##;
        assert_eq!(
            extract_links(html, "a", Some(&base_url())),
            vec!["https://shop.test/ok"]
        );
    }

    #[test]
    fn test_selector_miss_is_empty_not_error() {
        let html = r#"<html><body><p>nothing</p></body></html>"#;
        assert!(extract_links(html, "a.product", Some(&base_url())).is_empty());
        assert_eq!(extract_text(html, "h1.title"), None);
    }

    #[test]
    fn test_invalid_selector_is_empty_not_error() {
        let html = r#"<a href="/x">x</a>"#;
        assert!(extract_links(html, "a[[", Some(&base_url())).is_empty());
        assert_eq!(extract_text(html, "::"), None);
    }

    #[test]
    fn test_extract_text_first_match_trimmed() {
        let html = r#"
            <h1 class="t">
                Steel   Kettle
                <small>1.7L</small>
            </h1>
            <h1 class="t">Second</h1>
        "#;
        assert_eq!(
            extract_text(html, "h1.t"),
            Some("Steel Kettle 1.7L".to_string())
        );
    }

    #[test]
    fn test_extract_text_empty_element_is_none() {
        let html = r#"<span class="price">   </span>"#;
        assert_eq!(extract_text(html, ".price"), None);
    }

    #[test]
    fn test_texts_and_attr() {
        let page = PageExtractor::new(
            r#"
            <nav class="crumbs"><a>Home</a><a>Kitchen</a><a>Kitchen</a><a> </a></nav>
            <span class="sku" data-sku="K-100">SKU: K-100</span>
        "#,
        );
        assert_eq!(page.texts(".crumbs a"), vec!["Home", "Kitchen"]);
        assert_eq!(page.attr(".sku", "data-sku"), Some("K-100".to_string()));
        assert_eq!(page.attr(".sku", "data-missing"), None);
    }

    #[test]
    fn test_images_with_lazy_load_fallback() {
        let page = PageExtractor::new(
            r#"
            <img class="g" src="/img/a.jpg">
            <img class="g" data-src="/img/b.jpg">
            <img class="g" src="/img/a.jpg">
        "#,
        );
        assert_eq!(
            page.images("img.g", Some(&base_url())),
            vec!["https://shop.test/img/a.jpg", "https://shop.test/img/b.jpg"]
        );
    }
}
