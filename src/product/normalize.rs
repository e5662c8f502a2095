//! Field normalization for scraped values
//!
//! Every parser here is total: unparseable input yields `None` (or
//! [`Availability::Unknown`]), never an error, so evolved site markup degrades the record
//! instead of failing the pipeline.

use crate::product::Availability;
use rust_decimal::Decimal;
use std::str::FromStr;

const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("US$", "USD"),
    ("C$", "CAD"),
    ("A$", "AUD"),
    ("$", "USD"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₹", "INR"),
];

const OUT_OF_STOCK_PHRASES: &[&str] = &[
    "out of stock",
    "sold out",
    "unavailable",
    "not available",
    "no longer available",
];

const IN_STOCK_PHRASES: &[&str] = &["in stock", "available", "add to cart", "add to basket"];

/// Parses a displayed price into a decimal, stripping currency and thousands separators
///
/// When both `.` and `,` appear, whichever comes last is the decimal separator. A lone `,`
/// followed by exactly two digits is read as a decimal comma (`"12,50 €"`); otherwise `,`
/// groups thousands.
///
/// # Examples
///
/// ```
/// use rust_decimal::Decimal;
/// use shelfwatch::product::normalize::parse_price;
///
/// assert_eq!(parse_price("$1,299.99"), Some(Decimal::new(129999, 2)));
/// assert_eq!(parse_price("1.299,99 €"), Some(Decimal::new(129999, 2)));
/// assert_eq!(parse_price("Call for price"), None);
/// ```
pub fn parse_price(text: &str) -> Option<Decimal> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let negative = text[..start]
        .chars()
        .filter(|c| !c.is_whitespace() && !"$€£¥₹".contains(*c))
        .last()
        == Some('-');

    let run = numeric_run(&text[start..]);
    let numeric = run.trim_end_matches(['.', ',']);

    let last_dot = numeric.rfind('.');
    let last_comma = numeric.rfind(',');

    let decimal_sep = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (None, Some(c)) => {
            let single = numeric.matches(',').count() == 1;
            let digits_after = numeric.len() - c - 1;
            (single && digits_after == 2).then_some(',')
        }
        (Some(_), None) => {
            // "1.299.000" groups thousands; a single dot is a decimal point
            (numeric.matches('.').count() == 1).then_some('.')
        }
        (None, None) => None,
    };

    let mut canonical = String::with_capacity(numeric.len() + 1);
    if negative {
        canonical.push('-');
    }
    for c in numeric.chars() {
        if c.is_ascii_digit() {
            canonical.push(c);
        } else if Some(c) == decimal_sep {
            canonical.push('.');
        }
    }

    Decimal::from_str(&canonical).ok()
}

/// Digits with `.`/`,` separators; a space or apostrophe only continues the run when it
/// groups exactly three digits
fn numeric_run(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            out.push(c);
        } else if matches!(c, ' ' | '\u{a0}' | '\'') && is_digit_group(&chars[i + 1..]) {
            continue;
        } else {
            break;
        }
    }

    out
}

fn is_digit_group(rest: &[char]) -> bool {
    rest.len() >= 3
        && rest[..3].iter().all(char::is_ascii_digit)
        && !rest.get(3).is_some_and(char::is_ascii_digit)
}

/// Detects an ISO currency code from a price string (`"€12"`, `"12.00 GBP"`)
pub fn detect_currency(text: &str) -> Option<String> {
    for (symbol, code) in CURRENCY_SYMBOLS {
        if text.contains(symbol) {
            return Some((*code).to_string());
        }
    }

    text.split(|c: char| !c.is_ascii_alphabetic())
        .find(|word| word.len() == 3 && word.chars().all(|c| c.is_ascii_uppercase()))
        .map(str::to_string)
}

/// Normalizes an explicit currency value (symbol or code) to an ISO code
pub fn normalize_currency(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    detect_currency(trimmed).or_else(|| {
        let upper = trimmed.to_ascii_uppercase();
        (upper.len() == 3 && upper.chars().all(|c| c.is_ascii_alphabetic())).then_some(upper)
    })
}

/// Derives tri-state availability from stock evidence text
///
/// With a configured keyword the answer is binary once evidence exists: keyword present
/// means in stock, anything else means out of stock. Without one, common phrases decide and
/// unrecognized text stays unknown.
pub fn parse_availability(stock_text: Option<&str>, keyword: Option<&str>) -> Availability {
    let Some(text) = stock_text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Availability::Unknown;
    };
    let lower = text.to_lowercase();

    if let Some(keyword) = keyword.map(str::trim).filter(|k| !k.is_empty()) {
        return if lower.contains(&keyword.to_lowercase()) {
            Availability::InStock
        } else {
            Availability::OutOfStock
        };
    }

    // Negative phrases first: "unavailable" contains "available"
    if OUT_OF_STOCK_PHRASES.iter().any(|p| lower.contains(p)) {
        Availability::OutOfStock
    } else if IN_STOCK_PHRASES.iter().any(|p| lower.contains(p)) {
        Availability::InStock
    } else {
        Availability::Unknown
    }
}

/// Maps schema.org availability URLs (`https://schema.org/InStock`) to [`Availability`]
pub fn parse_schema_availability(value: &str) -> Availability {
    let tail = value.rsplit('/').next().unwrap_or(value).to_ascii_lowercase();
    match tail.as_str() {
        "instock" | "limitedavailability" | "onlineonly" | "instoreonly" | "presale" => {
            Availability::InStock
        }
        "outofstock" | "soldout" | "discontinued" => Availability::OutOfStock,
        _ => Availability::Unknown,
    }
}

/// Parses a review count such as `"1,204 reviews"` or `"(87)"`
pub fn parse_count(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = numeric_run(&text[start..])
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Parses the first decimal number in a rating such as `"4.5 out of 5"` or `"4,5"`
pub fn parse_rating(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let number: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | ','))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    number.trim_end_matches('.').parse().ok()
}
