//! Report Sinks
//!
//! Sinks persist a [`FinalizedReport`]. The text sink renders one page per
//! (stream, column) pair, separated by form feeds, after a summary page.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use super::summary::{FinalizedReport, Metric};

/// Page separator for the paginated text report.
pub const PAGE_BREAK: &str = "\x0c\n";

/// Consumer of a finalized report.
pub trait ReportSink {
    fn name(&self) -> &str;

    fn write_report(&mut self, report: &FinalizedReport) -> Result<()>;
}

// =============================================================================
// TEXT
// =============================================================================

pub struct TextReportSink {
    path: PathBuf,
}

impl TextReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Summary page followed by one page per (stream, column).
    pub fn render_pages(report: &FinalizedReport) -> Vec<String> {
        let mut pages = vec![report.executive_summary()];

        for stream in &report.streams {
            for column in stream.columns() {
                pages.push(render_column_page(&stream.stream, column, |metric| {
                    stream.metric(column, metric).unwrap_or(0)
                }));
            }
        }

        pages
    }
}

fn render_column_page(stream: &str, column: &str, value: impl Fn(Metric) -> u64) -> String {
    let label_width = Metric::ALL
        .iter()
        .map(|m| m.as_str().len())
        .max()
        .unwrap_or(0);
    let value_width = column.len().max(
        Metric::ALL
            .iter()
            .map(|&m| value(m).to_string().len())
            .max()
            .unwrap_or(0),
    );
    let rule = format!("+-{}-+-{}-+\n", "-".repeat(label_width), "-".repeat(value_width));

    let mut page = format!("Stream: {}, Column: {}\n\n", stream, column);
    page.push_str(&rule);
    page.push_str(&format!(
        "| {:<lw$} | {:>vw$} |\n",
        "metric",
        column,
        lw = label_width,
        vw = value_width
    ));
    page.push_str(&rule);
    for metric in Metric::ALL {
        page.push_str(&format!(
            "| {:<lw$} | {:>vw$} |\n",
            metric.as_str(),
            value(metric),
            lw = label_width,
            vw = value_width
        ));
    }
    page.push_str(&rule);
    page
}

impl ReportSink for TextReportSink {
    fn name(&self) -> &str {
        "text"
    }

    fn write_report(&mut self, report: &FinalizedReport) -> Result<()> {
        let pages = Self::render_pages(report);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, pages.join(PAGE_BREAK))
            .with_context(|| format!("Failed to write report to {}", self.path.display()))?;
        info!(path = %self.path.display(), pages = pages.len(), "Tables saved");
        Ok(())
    }
}

// =============================================================================
// JSON
// =============================================================================

pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for JsonReportSink {
    fn name(&self) -> &str {
        "json"
    }

    fn write_report(&mut self, report: &FinalizedReport) -> Result<()> {
        let json = report.to_json().context("Failed to serialize report")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write JSON report to {}", self.path.display()))?;
        info!(path = %self.path.display(), "JSON report saved");
        Ok(())
    }
}

// =============================================================================
// MEMORY
// =============================================================================

/// Keeps every report it receives.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Vec<FinalizedReport>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> &[FinalizedReport] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<FinalizedReport> {
        self.reports
    }
}

impl ReportSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn write_report(&mut self, report: &FinalizedReport) -> Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}
