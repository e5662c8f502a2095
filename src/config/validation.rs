use crate::config::types::{Config, CrawlerConfig, OutputConfig, SiteConfig};
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Longest refill window accepted for the per-host token bucket
const MAX_RATE_PER_SECS: f64 = 86_400.0;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;

    if let Some(path) = &config.catalog_csv {
        if path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "catalog-csv cannot be empty when set".to_string(),
            ));
        }
    }

    let mut seen = HashSet::new();
    for site in &config.sites {
        validate_site(site)?;
        if !seen.insert(site.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate site name '{}'",
                site.name
            )));
        }
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.retry_attempts < 1 || config.retry_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "retry-attempts must be between 1 and 10, got {}",
            config.retry_attempts
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.rate_capacity < 1.0 {
        return Err(ConfigError::Validation(format!(
            "rate-capacity must be >= 1, got {}",
            config.rate_capacity
        )));
    }

    if !(config.rate_tokens > 0.0 && config.rate_per_secs > 0.0) {
        return Err(ConfigError::Validation(format!(
            "rate-tokens and rate-per-secs must be positive, got {} per {}s",
            config.rate_tokens, config.rate_per_secs
        )));
    }

    if config.rate_per_secs > MAX_RATE_PER_SECS {
        return Err(ConfigError::Validation(format!(
            "rate-per-secs must be at most {} (one day), got {}",
            MAX_RATE_PER_SECS, config.rate_per_secs
        )));
    }

    if config.robots_ttl_hours < 1 {
        return Err(ConfigError::Validation(format!(
            "robots-ttl-hours must be >= 1, got {}",
            config.robots_ttl_hours
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.data_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "data-dir cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates one site entry
fn validate_site(site: &SiteConfig) -> Result<(), ConfigError> {
    validate_site_name(&site.name)?;

    if site.start_urls.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Site '{}' must have at least one start URL",
            site.name
        )));
    }

    for start in &site.start_urls {
        let url = Url::parse(start).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid start URL '{}': {}", start, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Start URL '{}' must use http or https",
                start
            )));
        }
    }

    if let Some(proxy) = &site.proxy {
        Url::parse(proxy).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid proxy '{}' for site '{}': {}", proxy, site.name, e))
        })?;
    }

    if site.max_pages == Some(0) {
        return Err(ConfigError::Validation(format!(
            "Site '{}': max-pages must be >= 1",
            site.name
        )));
    }

    if site.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "Site '{}': user-agent cannot be empty",
            site.name
        )));
    }

    for (field, selector) in site.selectors.iter() {
        validate_selector(&site.name, field, selector)?;
    }

    Ok(())
}

/// Site names double as directory names under the data dir
fn validate_site_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "Site name cannot be empty".to_string(),
        ));
    }

    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ConfigError::Validation(format!(
            "Site name '{}' cannot contain path separators",
            name
        )));
    }

    Ok(())
}

fn validate_selector(site: &str, field: &str, selector: &str) -> Result<(), ConfigError> {
    if selector.trim().is_empty() {
        return Err(ConfigError::InvalidSelector(format!(
            "Site '{}': selector '{}' cannot be empty",
            site, field
        )));
    }

    Selector::parse(selector).map_err(|e| {
        ConfigError::InvalidSelector(format!(
            "Site '{}': selector '{}' = '{}' does not parse: {:?}",
            site, field, selector, e
        ))
    })?;

    Ok(())
}
