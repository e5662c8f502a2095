//! Human-facing output: markdown change reports and the end-of-run summary

pub mod markdown;
mod summary;

pub use markdown::format_change_report;
pub use summary::{format_run_summary, print_run_summary};
