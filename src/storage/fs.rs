//! Filesystem snapshot store

use crate::diff::ReportEnvelope;
use crate::output::markdown::format_change_report;
use crate::product::{sha256_hex, Product};
use crate::storage::{SnapshotStore, StorageError, StorageResult};
use chrono::NaiveDate;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Snapshot store rooted at the configured data directory
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_path(&self, site: &str, date: NaiveDate, url: &str, extension: &str) -> PathBuf {
        self.root
            .join("raw")
            .join(site)
            .join(date.format(DATE_FORMAT).to_string())
            .join(format!("{}.{}", sha256_hex(url.as_bytes()), extension))
    }

    pub fn snapshot_path(&self, site: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join("processed")
            .join(site)
            .join(format!("{}.jsonl", date.format(DATE_FORMAT)))
    }

    pub fn report_path(&self, site: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join("reports")
            .join(site)
            .join(format!("{}.json", date.format(DATE_FORMAT)))
    }
}

/// Writes `contents` to a sibling temp file and renames it over `path`
fn write_replace(path: &Path, contents: &[u8]) -> StorageResult<()> {
    ensure_parent(path)?;
    let tmp = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or_default()
    ));
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

impl SnapshotStore for FsSnapshotStore {
    fn write_raw(
        &self,
        site: &str,
        date: NaiveDate,
        url: &str,
        body: &[u8],
        extension: &str,
    ) -> StorageResult<PathBuf> {
        let path = self.raw_path(site, date, url, extension);
        write_replace(&path, body)?;
        Ok(path)
    }

    fn append_snapshot(&self, site: &str, date: NaiveDate, products: &[Product]) -> StorageResult<()> {
        let path = self.snapshot_path(site, date);
        ensure_parent(&path)?;

        // Serialize everything first so a failure leaves the file untouched
        let mut buf = Vec::new();
        for product in products {
            serde_json::to_writer(&mut buf, product)?;
            buf.push(b'\n');
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&buf)?;
        writer.flush()?;

        tracing::debug!(site, %date, records = products.len(), path = %path.display(), "snapshot appended");
        Ok(())
    }

    fn read_snapshot(&self, site: &str, date: NaiveDate) -> StorageResult<Vec<Product>> {
        let path = self.snapshot_path(site, date);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut products = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Product>(line) {
                Ok(product) => products.push(product),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "skipping malformed snapshot record"
                ),
            }
        }
        Ok(products)
    }

    fn snapshot_dates(&self, site: &str) -> StorageResult<Vec<NaiveDate>> {
        let dir = self.root.join("processed").join(site);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut dates = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(date) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
            {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    fn write_change_report(&self, report: &ReportEnvelope) -> StorageResult<PathBuf> {
        let path = self.report_path(&report.site, report.date);
        write_replace(&path, &serde_json::to_vec_pretty(report)?)?;
        write_replace(
            &path.with_extension("md"),
            format_change_report(report).as_bytes(),
        )?;
        Ok(path)
    }

    fn read_change_report(&self, site: &str, date: NaiveDate) -> StorageResult<Option<ReportEnvelope>> {
        let path = self.report_path(site, date);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                path,
                line: e.line(),
                message: e.to_string(),
            })
    }
}
