//! Storage traits and error types

use crate::diff::ReportEnvelope;
use crate::product::Product;
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt file {path} at line {line}: {message}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for raw pages, daily snapshots and change reports
///
/// Raw writes are idempotent per `(site, date, url)`. Snapshots are append-only per
/// `(site, date)`: a second run on the same day adds records, it never rewrites earlier ones.
pub trait SnapshotStore: Send + Sync {
    /// Stores the fetched bytes of `url`, named by a digest of the URL
    ///
    /// # Arguments
    ///
    /// * `site` - Site name, used as a directory
    /// * `date` - Snapshot day
    /// * `url` - The URL as discovered; its SHA-256 names the file
    /// * `body` - Exact fetched bytes
    /// * `extension` - File extension without the dot, see [`crate::adapters::RawPage::extension`]
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - Where the bytes were written; the same path for the same inputs
    /// * `Err(StorageError)` - The directory or file could not be written
    fn write_raw(
        &self,
        site: &str,
        date: NaiveDate,
        url: &str,
        body: &[u8],
        extension: &str,
    ) -> StorageResult<PathBuf>;

    /// Appends `products` to the day's snapshot, one JSON record per line
    ///
    /// Earlier records of the same day are kept; readers resolve duplicates.
    fn append_snapshot(&self, site: &str, date: NaiveDate, products: &[Product]) -> StorageResult<()>;

    /// All records of the day's snapshot in file order; empty when there is none
    fn read_snapshot(&self, site: &str, date: NaiveDate) -> StorageResult<Vec<Product>>;

    /// Dates with a snapshot for `site`, ascending
    fn snapshot_dates(&self, site: &str) -> StorageResult<Vec<NaiveDate>>;

    /// The most recent snapshot strictly older than `date`
    ///
    /// # Returns
    ///
    /// * `Ok(Some((date, products)))` - The baseline day and its records
    /// * `Ok(None)` - No earlier snapshot exists
    /// * `Err(StorageError)` - Listing or reading failed
    fn latest_snapshot_before(
        &self,
        site: &str,
        date: NaiveDate,
    ) -> StorageResult<Option<(NaiveDate, Vec<Product>)>> {
        let Some(previous) = self
            .snapshot_dates(site)?
            .into_iter()
            .filter(|d| *d < date)
            .max()
        else {
            return Ok(None);
        };
        Ok(Some((previous, self.read_snapshot(site, previous)?)))
    }

    /// Persists the change report for `(report.site, report.date)`, replacing an earlier one
    fn write_change_report(&self, report: &ReportEnvelope) -> StorageResult<PathBuf>;

    /// The stored report for `(site, date)`
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - No report was written for that day
    /// * `Err(StorageError::Corrupt)` - The file exists but does not parse
    fn read_change_report(&self, site: &str, date: NaiveDate) -> StorageResult<Option<ReportEnvelope>>;
}
