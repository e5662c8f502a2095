//! End-of-run console summary

use crate::crawler::{SiteOutcome, SiteRunStats};
use chrono::NaiveDate;

/// Formats one block per site: counts, then the report counters or the failure
pub fn format_run_summary(date: NaiveDate, outcomes: &[SiteOutcome]) -> String {
    let mut out = format!("=== Shelfwatch run for {} ===\n\n", date);

    for outcome in outcomes {
        match &outcome.result {
            Ok(stats) => format_site(&mut out, &outcome.site, stats),
            Err(e) => out.push_str(&format!("{}: FAILED ({})\n\n", outcome.site, e)),
        }
    }

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    out.push_str(&format!(
        "{} site(s) run, {} failed\n",
        outcomes.len(),
        failed
    ));
    out
}

fn format_site(out: &mut String, site: &str, stats: &SiteRunStats) {
    out.push_str(&format!("{}:\n", site));
    out.push_str(&format!(
        "  Discovered: {}  Fetched: {}  Stored: {}  Skipped: {}\n",
        stats.discovered, stats.fetched, stats.stored, stats.skipped
    ));

    match (&stats.counters, stats.baseline_date) {
        (Some(c), Some(baseline)) => {
            out.push_str(&format!("  Changes since {}:\n", baseline));
            out.push_str(&format!("    new: {}  gone: {}\n", c.new, c.gone));
            out.push_str(&format!(
                "    price up: {}  price down: {}\n",
                c.price_up, c.price_down
            ));
            out.push_str(&format!(
                "    back in stock: {}  out of stock: {}\n",
                c.back_in_stock, c.out_of_stock
            ));
            if let Some(path) = &stats.report_path {
                out.push_str(&format!("  Report: {}\n", path.display()));
            }
        }
        _ => out.push_str("  No baseline snapshot; no report\n"),
    }
    out.push('\n');
}

/// Prints the run summary to stdout
pub fn print_run_summary(date: NaiveDate, outcomes: &[SiteOutcome]) {
    print!("{}", format_run_summary(date, outcomes));
}
