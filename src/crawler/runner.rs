//! Runner - per-site pipeline orchestration
//!
//! For each configured site:
//! 1. Discover product URLs through the site's adapter
//! 2. Fetch and parse product pages with bounded concurrency
//! 3. Attach the catalog price delta
//! 4. Archive raw pages and append the day's snapshot
//! 5. Diff the day against the latest earlier snapshot and persist the change report
//!
//! A failed product page only skips that product. Discovery, storage and strict-robots
//! failures (on listing or product pages) abort the affected site; other sites still run.

use crate::adapters::{AdapterContext, AdapterRegistry, RawPage};
use crate::config::{Config, SiteConfig};
use crate::crawler::{BucketSpec, CrawlClient, HeadlessRenderer, RateLimiter};
use crate::diff::{dedupe_last_wins, diff, ChangeCounters, ReportEnvelope};
use crate::product::{Catalog, Product};
use crate::robots::RobotsCache;
use crate::storage::{FsSnapshotStore, SnapshotStore};
use crate::ShelfError;
use chrono::{NaiveDate, Utc};
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What one site run did
#[derive(Debug, Clone, Default)]
pub struct SiteRunStats {
    pub discovered: usize,
    /// Product pages fetched with a non-empty body
    pub fetched: usize,
    /// Records appended to the day's snapshot
    pub stored: usize,
    /// URLs that produced no record (fetch failure or no title)
    pub skipped: usize,
    pub baseline_date: Option<NaiveDate>,
    pub counters: Option<ChangeCounters>,
    pub report_path: Option<PathBuf>,
}

/// Result of one site's pipeline
#[derive(Debug)]
pub struct SiteOutcome {
    pub site: String,
    pub result: Result<SiteRunStats, ShelfError>,
}

pub struct Runner {
    config: Arc<Config>,
    store: Arc<dyn SnapshotStore>,
    catalog: Arc<Catalog>,
    registry: AdapterRegistry,
    date: NaiveDate,
}

impl Runner {
    /// A runner for today's UTC date with the default adapters and no catalog
    pub fn new(config: Arc<Config>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            config,
            store,
            catalog: Arc::new(Catalog::default()),
            registry: AdapterRegistry::default(),
            date: Utc::now().date_naive(),
        }
    }

    /// Filesystem store under `output.data-dir` and the configured catalog
    ///
    /// A catalog file that cannot be read is logged and treated as empty.
    pub fn from_config(config: Arc<Config>) -> Self {
        let store = Arc::new(FsSnapshotStore::new(&config.output.data_dir));
        let catalog = match config.catalog_csv.as_deref() {
            Some(path) => match Catalog::load(Path::new(path)) {
                Ok(catalog) => {
                    tracing::info!(path, rows = catalog.len(), "catalog loaded");
                    catalog
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "catalog unreadable; price deltas disabled");
                    Catalog::default()
                }
            },
            None => Catalog::default(),
        };
        Self::new(config, store).with_catalog(catalog)
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Overrides the snapshot date
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Runs every configured site (or only `only`) concurrently
    pub async fn run_all(&self, only: Option<&str>) -> Vec<SiteOutcome> {
        let sites = self
            .config
            .sites
            .iter()
            .filter(|site| only.map_or(true, |name| site.name == name));

        join_all(sites.map(|site| async move {
            let result = self.run_site(site).await;
            if let Err(e) = &result {
                tracing::error!(site = %site.name, error = %e, "site run failed");
            }
            SiteOutcome {
                site: site.name.clone(),
                result,
            }
        }))
        .await
    }

    /// Runs the full pipeline for one site
    pub async fn run_site(&self, site: &SiteConfig) -> Result<SiteRunStats, ShelfError> {
        let crawler = &self.config.crawler;
        tracing::info!(site = %site.name, date = %self.date, "site run started");

        // Per-site limiter and robots cache: one site's trouble never throttles another
        let limiter = Arc::new(RateLimiter::new(BucketSpec::from_config(crawler)));
        let robots = Arc::new(RobotsCache::from_config(crawler));
        let client = CrawlClient::for_site(site, crawler, limiter, robots)?;
        let renderer = site.use_headless.then(|| {
            HeadlessRenderer::new(
                &crawler.headless_binary,
                &site.user_agent,
                crawler.request_timeout(),
            )
        });

        let adapter = self.registry.build(AdapterContext {
            site: site.clone(),
            client,
            renderer,
        });
        let adapter = adapter.as_ref();

        let urls = adapter.discover_product_urls().await?;
        let mut stats = SiteRunStats {
            discovered: urls.len(),
            ..SiteRunStats::default()
        };

        let mut pages = stream::iter(urls)
            .map(|url| async move {
                let page = match adapter.try_fetch_product(&url).await {
                    Ok(page) => page,
                    Err(e @ ShelfError::PolicyUnavailable { .. }) => return Err(e),
                    Err(e) => {
                        tracing::warn!(site = %site.name, url = %url, error = %e, "skipping product");
                        RawPage::empty(url)
                    }
                };
                if page.is_empty() {
                    return Ok((page, None));
                }
                let product = adapter.parse_product(&page);
                Ok((page, Some(product)))
            })
            .buffer_unordered(crawler.concurrency.max(1));

        let mut products = Vec::new();
        while let Some(fetched) = pages.next().await {
            // Strict robots mode: an unreadable robots.txt fails the whole site
            let (page, product) = fetched?;
            let Some(product) = product else {
                stats.skipped += 1;
                continue;
            };
            stats.fetched += 1;
            self.archive(site, &page)?;

            if product.title.is_none() {
                tracing::warn!(site = %site.name, url = %page.url, "no title; dropping product");
                stats.skipped += 1;
                continue;
            }
            products.push(self.with_catalog_delta(product));
        }

        let products: Vec<Product> = dedupe_last_wins(&products)
            .into_iter()
            .map(|(_, product)| product.clone())
            .collect();
        stats.stored = products.len();

        if products.is_empty() {
            tracing::warn!(site = %site.name, "no products parsed; snapshot and diff skipped");
            return Ok(stats);
        }

        self.store.append_snapshot(&site.name, self.date, &products)?;
        let today = self.store.read_snapshot(&site.name, self.date)?;

        match self.store.latest_snapshot_before(&site.name, self.date)? {
            Some((baseline, previous)) => {
                let envelope =
                    ReportEnvelope::new(&site.name, self.date, baseline, diff(&previous, &today));
                let path = self.store.write_change_report(&envelope)?;
                let counters = envelope.report.counters;
                tracing::info!(
                    site = %site.name,
                    baseline = %baseline,
                    new = counters.new,
                    gone = counters.gone,
                    price_up = counters.price_up,
                    price_down = counters.price_down,
                    back_in_stock = counters.back_in_stock,
                    out_of_stock = counters.out_of_stock,
                    "change report written"
                );
                stats.baseline_date = Some(baseline);
                stats.counters = Some(counters);
                stats.report_path = Some(path);
            }
            None => tracing::info!(site = %site.name, "no earlier snapshot; nothing to diff"),
        }

        tracing::info!(
            site = %site.name,
            discovered = stats.discovered,
            stored = stats.stored,
            skipped = stats.skipped,
            "site run finished"
        );
        Ok(stats)
    }

    fn archive(&self, site: &SiteConfig, page: &RawPage) -> Result<(), ShelfError> {
        self.store
            .write_raw(&site.name, self.date, &page.url, &page.body, page.extension())?;
        Ok(())
    }

    fn with_catalog_delta(&self, mut product: Product) -> Product {
        product.price_delta_vs_catalog = self
            .catalog
            .price_delta(product.sku.as_deref(), product.price);
        product
    }
}
