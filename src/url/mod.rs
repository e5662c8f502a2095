//! URL helpers shared by the fetch layer and the adapters
//!
//! Rate-limit buckets and robots.txt caches are keyed by [`host_key`], which keeps the
//! port so that two services on one machine never share a bucket.

mod domain;

pub use domain::{extract_domain, host_key};

use crate::ShelfError;
use url::Url;

/// Returns the robots.txt location for the origin of `url`
///
/// # Examples
///
/// ```
/// use url::Url;
/// use shelfwatch::url::robots_txt_url;
///
/// let url = Url::parse("https://shop.test:8443/p/1?x=2").unwrap();
/// assert_eq!(robots_txt_url(&url).unwrap().as_str(), "https://shop.test:8443/robots.txt");
/// ```
pub fn robots_txt_url(url: &Url) -> Result<Url, ShelfError> {
    if url.host_str().is_none() {
        return Err(ShelfError::MissingHost(url.to_string()));
    }
    Ok(url.join("/robots.txt")?)
}

/// Parses `raw` and drops any fragment, which never changes what a server returns
pub fn parse_page_url(raw: &str) -> Result<Url, ShelfError> {
    let mut url = Url::parse(raw)?;
    url.set_fragment(None);
    Ok(url)
}
