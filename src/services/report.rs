//! Missing-asset reports in plain text or CSV.

use crate::models::{AssetKind, MissingReference, RelinkOutcome};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use std::fmt::Write as _;
use std::fs;

/// On-disk layout of an exported report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    #[value(alias = "txt")]
    Text,
    Csv,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Csv => "csv",
        }
    }
}

/// Write a report of `references` to `path`.
///
/// The extension is forced to match `format`, so the file actually written may
/// differ from `path`; it is returned.
pub fn export_report(
    path: &Utf8Path,
    references: &[MissingReference],
    format: ReportFormat,
    source: Option<&str>,
) -> Result<Utf8PathBuf> {
    let target = path.with_extension(format.extension());

    let contents = match format {
        ReportFormat::Csv => render_csv(references),
        ReportFormat::Text => render_text(references, source, chrono::Local::now().naive_local()),
    };

    fs::write(&target, contents).with_context(|| format!("Failed to write report: {}", target))?;

    tracing::info!("{} report saved to {}", format.extension().to_uppercase(), target);
    Ok(target)
}

/// CSV with an `Asset Type,Asset Name,File Path` header and CRLF line endings.
pub fn render_csv(references: &[MissingReference]) -> String {
    let mut out = String::from("Asset Type,Asset Name,File Path\r\n");

    for reference in references {
        let row = [
            reference.kind.label(),
            reference.identity.as_str(),
            reference.original_path.as_str(),
        ]
            .map(csv_field)
            .join(",");
        out.push_str(&row);
        out.push_str("\r\n");
    }

    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Human-readable report grouped by kind, in the order kinds first appear.
pub fn render_text(references: &[MissingReference], source: Option<&str>, generated: NaiveDateTime) -> String {
    let rule = "=".repeat(50);
    let mut out = String::new();

    let _ = writeln!(out, "Missing Assets Report");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Source File: {}", source.unwrap_or("(unsaved)"));
    let _ = writeln!(out, "Date: {}", generated.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "Total Missing Assets: {}", references.len());
    let _ = writeln!(out, "{}", rule);
    out.push('\n');

    let mut by_kind: IndexMap<AssetKind, Vec<&MissingReference>> = IndexMap::new();
    for reference in references {
        by_kind.entry(reference.kind).or_default().push(reference);
    }

    for (kind, items) in &by_kind {
        let _ = writeln!(out, "\n{} ({} items):", kind, items.len());
        let _ = writeln!(out, "{}", "-".repeat(30));
        for item in items {
            let _ = writeln!(out, "  Name: {}", item.identity);
            let _ = writeln!(out, "  Path: {}", item.original_path);
            out.push('\n');
        }
    }

    out
}

/// Per-item account of a finished run, one line per processed item.
pub fn render_outcome(outcome: &RelinkOutcome) -> String {
    let (relinked, not_found, unbound) = outcome.tally();
    let mut out = String::new();

    let _ = writeln!(out, "{}", outcome.summary());
    let _ = writeln!(
        out,
        "Processed {} of {}: {} relinked, {} not found, {} rejected",
        outcome.processed, outcome.total, relinked, not_found, unbound
    );
    for result in &outcome.results {
        let _ = writeln!(
            out,
            "  [{}] {}: {}",
            result.reference.kind,
            result.reference.identity,
            result.message()
        );
    }
    if !outcome.remaining.is_empty() {
        let _ = writeln!(out, "Still missing: {}", outcome.remaining.len());
    }

    out
}
