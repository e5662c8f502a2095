//! Integration tests for the crawl pipeline
//!
//! These tests use wiremock to serve listing and product pages and run the full
//! discover, fetch, snapshot and diff cycle against a temporary data directory.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use shelfwatch::config::{parse_config, Config};
use shelfwatch::storage::{FsSnapshotStore, SnapshotStore};
use shelfwatch::{Runner, ShelfError};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SITE: &str = "shop";

/// Builds a config for one site per `(name, start paths)` against the mock server
fn create_test_config(base_url: &str, data_dir: &Path, sites: &[(&str, &[&str])]) -> Config {
    let mut toml = format!(
        r#"
[crawler]
concurrency = 4
request-timeout-secs = 5
retry-attempts = 1
retry-backoff-ms = 1
rate-capacity = 100
rate-tokens = 100
rate-per-secs = 1

[output]
data-dir = "{}"
"#,
        data_dir.display().to_string().replace('\\', "/")
    );

    for (name, paths) in sites {
        let urls: Vec<String> = paths
            .iter()
            .map(|p| format!("\"{}{}\"", base_url, p))
            .collect();
        toml.push_str(&format!(
            r#"
[[sites]]
name = "{}"
start-urls = [{}]
user-agent = "TestBot/1.0"
currency = "USD"

[sites.selectors]
product-link = "a.product"
title = "h1.title"
price = ".price"
sku = ".sku"
in-stock = ".stock"
"#,
            name,
            urls.join(", ")
        ));
    }

    parse_config(&toml).expect("test config should be valid")
}

fn listing_page(paths: &[&str]) -> String {
    let links: String = paths
        .iter()
        .map(|p| format!(r#"<a class="product" href="{}">item</a>"#, p))
        .collect();
    format!("<html><body>{}</body></html>", links)
}

fn product_page(title: &str, sku: &str, price: &str, stock: &str) -> String {
    format!(
        r#"<html><body>
        <h1 class="title">{}</h1>
        <span class="sku">{}</span>
        <span class="price">${}</span>
        <div class="stock">{}</div>
        </body></html>"#,
        title, sku, price, stock
    )
}

async fn mount_html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
}

fn skus(store: &FsSnapshotStore, site: &str, day: NaiveDate) -> Vec<String> {
    let mut skus: Vec<String> = store
        .read_snapshot(site, day)
        .unwrap()
        .into_iter()
        .filter_map(|p| p.sku)
        .collect();
    skus.sort();
    skus
}

#[tokio::test]
async fn test_overlapping_listings_fetch_each_product_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(&server, "/c/1", listing_page(&["/p/1", "/p/2"])).await;
    mount_html(&server, "/c/2", listing_page(&["/p/2", "/p/3"])).await;
    for (i, route) in ["/p/1", "/p/2", "/p/3"].iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(*route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(product_page(
                        &format!("Item {}", i),
                        &format!("S-{}", i),
                        "9.99",
                        "In stock",
                    ))
                    .insert_header("content-type", "text/html"),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = create_test_config(&server.uri(), dir.path(), &[(SITE, &["/c/1", "/c/2"])]);
    let runner = Runner::from_config(Arc::new(config)).with_date(date(1));
    let outcomes = runner.run_all(None).await;

    assert_eq!(outcomes.len(), 1);
    let stats = outcomes[0].result.as_ref().unwrap();
    assert_eq!(stats.discovered, 3);
    assert_eq!(stats.stored, 3);
    assert!(stats.counters.is_none(), "first run has no baseline");

    let store = FsSnapshotStore::new(dir.path());
    assert_eq!(skus(&store, SITE, date(1)), vec!["S-0", "S-1", "S-2"]);

    let products = store.read_snapshot(SITE, date(1)).unwrap();
    assert!(products.iter().all(|p| p.price == Some(Decimal::new(999, 2))));
    assert!(products.iter().all(|p| !p.content_hash.is_empty()));
    assert!(dir.path().join("raw").join(SITE).join("2024-05-01").is_dir());
}

#[tokio::test]
async fn test_failed_product_is_skipped_others_stored() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(&server, "/c/1", listing_page(&["/p/ok", "/p/missing", "/p/untitled"])).await;
    mount_html(&server, "/p/ok", product_page("Kettle", "K-1", "19.99", "In stock")).await;
    mount_html(
        &server,
        "/p/untitled",
        "<html><body><span class=\"sku\">U-1</span></body></html>".to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/p/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), dir.path(), &[(SITE, &["/c/1"])]);
    let runner = Runner::from_config(Arc::new(config)).with_date(date(1));
    let outcomes = runner.run_all(None).await;

    let stats = outcomes[0].result.as_ref().unwrap();
    assert_eq!(stats.discovered, 3);
    assert_eq!(stats.stored, 1);
    assert_eq!(stats.skipped, 2);

    let store = FsSnapshotStore::new(dir.path());
    assert_eq!(skus(&store, SITE, date(1)), vec!["K-1"]);
}

#[tokio::test]
async fn test_second_day_produces_change_report() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = Arc::new(create_test_config(
        &server.uri(),
        dir.path(),
        &[(SITE, &["/c/1"])],
    ));

    // Day one: A and B
    mount_html(&server, "/c/1", listing_page(&["/p/a", "/p/b"])).await;
    mount_html(&server, "/p/a", product_page("Alpha", "A", "10.00", "In stock")).await;
    mount_html(&server, "/p/b", product_page("Bravo", "B", "5.00", "In stock")).await;

    let day1 = Runner::from_config(Arc::clone(&config))
        .with_date(date(1))
        .run_all(None)
        .await;
    assert_eq!(day1[0].result.as_ref().unwrap().stored, 2);

    // Day two: A got pricier, B is gone, C is new
    server.reset().await;
    mount_html(&server, "/c/1", listing_page(&["/p/a", "/p/c"])).await;
    mount_html(&server, "/p/a", product_page("Alpha", "A", "12.00", "In stock")).await;
    mount_html(&server, "/p/c", product_page("Charlie", "C", "7.00", "In stock")).await;

    let day2 = Runner::from_config(Arc::clone(&config))
        .with_date(date(2))
        .run_all(None)
        .await;
    let stats = day2[0].result.as_ref().unwrap();

    assert_eq!(stats.baseline_date, Some(date(1)));
    let counters = stats.counters.unwrap();
    assert_eq!(counters.new, 1);
    assert_eq!(counters.gone, 1);
    assert_eq!(counters.price_up, 1);
    assert_eq!(counters.price_down, 0);

    let report_path = stats.report_path.clone().unwrap();
    assert!(report_path.exists());
    assert!(report_path.with_extension("md").exists());

    let store = FsSnapshotStore::new(dir.path());
    let envelope = store.read_change_report(SITE, date(2)).unwrap().unwrap();
    assert_eq!(envelope.baseline_date, date(1));
    assert_eq!(envelope.report.counters, counters);

    let markdown = std::fs::read_to_string(report_path.with_extension("md")).unwrap();
    assert!(markdown.contains("Charlie"));
    assert!(markdown.contains("Bravo"));
}

#[tokio::test]
async fn test_robots_disallowed_product_is_not_fetched() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /p/private"))
        .expect(1)
        .mount(&server)
        .await;
    mount_html(&server, "/c/1", listing_page(&["/p/public", "/p/private"])).await;
    mount_html(&server, "/p/public", product_page("Open", "O-1", "1.00", "In stock")).await;
    Mock::given(method("GET"))
        .and(path("/p/private"))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page(
            "Hidden", "H-1", "1.00", "In stock",
        )))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), dir.path(), &[(SITE, &["/c/1"])]);
    let outcomes = Runner::from_config(Arc::new(config))
        .with_date(date(1))
        .run_all(None)
        .await;

    let stats = outcomes[0].result.as_ref().unwrap();
    assert_eq!(stats.stored, 1);

    let store = FsSnapshotStore::new(dir.path());
    assert_eq!(skus(&store, SITE, date(1)), vec!["O-1"]);
}

#[tokio::test]
async fn test_failing_site_does_not_stop_others() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(&server, "/good", listing_page(&["/p/1"])).await;
    mount_html(&server, "/p/1", product_page("One", "G-1", "3.00", "In stock")).await;
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = create_test_config(
        &server.uri(),
        dir.path(),
        &[("good", &["/good"]), ("bad", &["/bad"])],
    );
    let runner = Runner::from_config(Arc::new(config)).with_date(date(1));

    let outcomes = runner.run_all(None).await;
    assert_eq!(outcomes.len(), 2);
    let good = outcomes.iter().find(|o| o.site == "good").unwrap();
    let bad = outcomes.iter().find(|o| o.site == "bad").unwrap();
    assert_eq!(good.result.as_ref().unwrap().stored, 1);
    assert!(matches!(bad.result, Err(ShelfError::DiscoveryFailed { .. })));

    let only = runner.run_all(Some("good")).await;
    assert_eq!(only.len(), 1);
    assert_eq!(only[0].site, "good");
}

#[tokio::test]
async fn test_absurd_crawl_delay_does_not_abort_other_sites() {
    let good_server = MockServer::start().await;
    let odd_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_html(&good_server, "/c/1", listing_page(&["/p/1"])).await;
    mount_html(&good_server, "/p/1", product_page("One", "G-1", "3.00", "In stock")).await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nCrawl-delay: 1e30\n"))
        .mount(&odd_server)
        .await;
    mount_html(&odd_server, "/c/1", listing_page(&[])).await;

    let mut config = create_test_config(&good_server.uri(), dir.path(), &[("good", &["/c/1"])]);
    let odd = create_test_config(&odd_server.uri(), dir.path(), &[("odd", &["/c/1"])]);
    config.sites.extend(odd.sites);

    let outcomes = Runner::from_config(Arc::new(config))
        .with_date(date(1))
        .run_all(None)
        .await;

    assert_eq!(outcomes.len(), 2);
    let good = outcomes.iter().find(|o| o.site == "good").unwrap();
    let odd = outcomes.iter().find(|o| o.site == "odd").unwrap();
    assert_eq!(good.result.as_ref().unwrap().stored, 1);
    assert_eq!(odd.result.as_ref().unwrap().discovered, 0);
}
