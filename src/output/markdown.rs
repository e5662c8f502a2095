//! Markdown rendering of change reports
//!
//! Written next to each JSON report so a human can skim a day's movements without tooling.

use crate::diff::{ChangeKind, FieldDelta, ProductChange, ReportEnvelope};
use serde_json::Value;

/// Field deltas shown per changed product, in this order
const HIGHLIGHT_FIELDS: &[&str] = &["price", "in_stock", "title", "images"];

/// Formats a change report as markdown
pub fn format_change_report(envelope: &ReportEnvelope) -> String {
    let report = &envelope.report;
    let counters = &report.counters;
    let mut md = String::new();

    md.push_str(&format!("# Changes for {} on {}\n\n", envelope.site, envelope.date));
    md.push_str(&format!("- **Baseline**: {}\n", envelope.baseline_date));
    md.push_str(&format!(
        "- **Generated**: {}\n\n",
        envelope.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    md.push_str("## Summary\n\n");
    md.push_str("| Change | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| New | {} |\n", counters.new));
    md.push_str(&format!("| Gone | {} |\n", counters.gone));
    md.push_str(&format!("| Price up | {} |\n", counters.price_up));
    md.push_str(&format!("| Price down | {} |\n", counters.price_down));
    md.push_str(&format!("| Back in stock | {} |\n", counters.back_in_stock));
    md.push_str(&format!("| Out of stock | {} |\n\n", counters.out_of_stock));

    if report.is_empty() {
        md.push_str("No material changes.\n");
        return md;
    }

    section(&mut md, "New products", report.changes.iter().filter(|c| c.kind == ChangeKind::New));

    let changed: Vec<&ProductChange> = report
        .changes
        .iter()
        .filter(|c| c.kind == ChangeKind::Changed)
        .collect();
    if !changed.is_empty() {
        md.push_str("## Changed products\n\n");
        for change in changed {
            md.push_str(&format!("- {}\n", label(change)));
            for field in HIGHLIGHT_FIELDS {
                if let Some(delta) = change.fields.get(*field) {
                    md.push_str(&format!("  - {}: {}\n", field, describe(delta)));
                }
            }
            let others = change.fields.len()
                - HIGHLIGHT_FIELDS
                    .iter()
                    .filter(|f| change.fields.contains_key(**f))
                    .count();
            if others > 0 {
                md.push_str(&format!("  - {} other field(s) changed\n", others));
            }
        }
        md.push('\n');
    }

    section(&mut md, "Gone products", report.changes.iter().filter(|c| c.kind == ChangeKind::Gone));

    md
}

fn section<'a>(md: &mut String, heading: &str, changes: impl Iterator<Item = &'a ProductChange>) {
    let lines: Vec<String> = changes.map(|c| format!("- {}\n", label(c))).collect();
    if lines.is_empty() {
        return;
    }
    md.push_str(&format!("## {}\n\n", heading));
    for line in lines {
        md.push_str(&line);
    }
    md.push('\n');
}

fn label(change: &ProductChange) -> String {
    match &change.title {
        Some(title) => format!("[{}]({}) `{}`", title.replace(['[', ']'], ""), change.url, change.key),
        None => format!("<{}> `{}`", change.url, change.key),
    }
}

fn describe(delta: &FieldDelta) -> String {
    format!("{} → {}", show(&delta.old), show(&delta.new))
}

fn show(value: &Value) -> String {
    match value {
        Value::Null => "none".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => format!("{} item(s)", items.len()),
        other => other.to_string(),
    }
}
