//! End-of-run summary for the console.

use itertools::Itertools;
use std::time::Duration;

use crate::scrapers::{RunReport, SourceReport};

fn secs(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

fn source_line(s: &SourceReport) -> String {
    let mut line = format!(
        "  {:<6} {:>4} records  {:>4} urls  {:>3} skipped  {:>3} failed  {:>9}",
        s.source_code,
        s.records,
        s.urls,
        s.skipped,
        s.failed_urls.len(),
        secs(s.elapsed)
    );
    if s.records > 0 {
        line.push_str(&format!("  ({} / record)", secs(s.elapsed / s.records as u32)));
    }
    if let Some(error) = &s.error {
        line.push_str(&format!("  FAILED: {error}"));
    }
    line
}

/// Human-readable summary of a run: mode, duration, and per-source counts.
pub fn render_summary(report: &RunReport) -> String {
    let mode = if report.concurrent { "concurrent" } else { "sequential" };
    let failed = report
        .sources
        .iter()
        .filter(|s| !s.succeeded())
        .map(|s| s.source_code.as_str())
        .join(", ");

    let mut out = format!(
        "Scrape summary ({mode}, {} total)\n",
        secs(report.elapsed)
    );
    out.push_str(&report.sources.iter().map(source_line).join("\n"));
    if !report.sources.is_empty() {
        out.push('\n');
    }
    out.push_str(&format!(
        "Total: {} records from {} sources",
        report.records.len(),
        report.sources.len()
    ));
    if !report.records.is_empty() {
        let per_record = report.elapsed / report.records.len() as u32;
        out.push_str(&format!(", {} / record", secs(per_record)));
    }
    if !failed.is_empty() {
        out.push_str(&format!("\nFailed sources: {failed}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport {
            records: Vec::new(),
            sources: vec![
                SourceReport {
                    source_code: "IL".into(),
                    urls: 4,
                    records: 4,
                    elapsed: Duration::from_secs(8),
                    ..Default::default()
                },
                SourceReport {
                    source_code: "IN".into(),
                    error: Some("no detail-page URLs discovered".into()),
                    elapsed: Duration::from_millis(300),
                    ..Default::default()
                },
            ],
            error: None,
            concurrent: true,
            elapsed: Duration::from_secs(8),
        }
    }

    #[test]
    fn test_summary_lists_sources_and_failures() {
        let summary = render_summary(&report());
        assert!(summary.starts_with("Scrape summary (concurrent, 8.00s total)"));
        assert!(summary.contains("IL"));
        assert!(summary.contains("(2.00s / record)"));
        assert!(summary.contains("FAILED: no detail-page URLs discovered"));
        assert!(summary.ends_with("Failed sources: IN"));
    }

    #[test]
    fn test_summary_of_empty_run() {
        let summary = render_summary(&RunReport::default());
        assert!(summary.contains("sequential"));
        assert!(summary.contains("Total: 0 records from 0 sources"));
        assert!(!summary.contains("Failed sources"));
    }
}
