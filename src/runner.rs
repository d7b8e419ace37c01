//! Regression Runner
//!
//! Builds both record sources from the configuration, drives the pairing
//! loop and hands the finalized report to every sink.

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{OutputConfig, RegressionConfig, SourceSpec};
use crate::engine::{PairingLoop, StatsAggregator};
use crate::protocol::SourceLabel;
use crate::report::{FinalizedReport, JsonReportSink, ReportSink, TextReportSink};
use crate::source::{LineSource, RecordSource, SubprocessSource};

/// Open one side of the comparison.
pub async fn open_source(
    label: SourceLabel,
    spec: &SourceSpec,
    strict: bool,
) -> Result<Box<dyn RecordSource>> {
    let source: Box<dyn RecordSource> = match spec {
        SourceSpec::File(path) => {
            info!(source = %label, path = %path.display(), "replaying captured output");
            Box::new(LineSource::open(label, path).await?.strict(strict))
        }
        SourceSpec::Command(command) => {
            Box::new(SubprocessSource::spawn(label, command)?.strict(strict))
        }
    };
    Ok(source)
}

/// Sinks described by the output configuration.
pub fn sinks_for(output: &OutputConfig) -> Vec<Box<dyn ReportSink>> {
    let mut sinks: Vec<Box<dyn ReportSink>> =
        vec![Box::new(TextReportSink::new(&output.report_path))];
    if let Some(json_path) = &output.json_path {
        sinks.push(Box::new(JsonReportSink::new(json_path)));
    }
    sinks
}

/// Compare two already opened sources and write the report to `sinks`.
pub async fn run_with_sources(
    left: &mut dyn RecordSource,
    right: &mut dyn RecordSource,
    primary_key: &str,
    sinks: &mut [Box<dyn ReportSink>],
) -> Result<FinalizedReport> {
    let report = PairingLoop::new(StatsAggregator::new(primary_key))
        .run(left, right)
        .await
        .context("Regression run aborted")?;

    for line in report.executive_summary().lines() {
        info!("{}", line);
    }

    for sink in sinks.iter_mut() {
        sink.write_report(&report)
            .with_context(|| format!("{} sink failed", sink.name()))?;
    }

    Ok(report)
}

/// Run a full regression comparison as configured.
pub async fn run_regression(
    config: &RegressionConfig,
    sinks: &mut [Box<dyn ReportSink>],
) -> Result<FinalizedReport> {
    config.validate()?;

    let mut left = open_source(
        SourceLabel::Left,
        &config.source_spec(SourceLabel::Left),
        config.strict,
    )
    .await?;
    let mut right = open_source(
        SourceLabel::Right,
        &config.source_spec(SourceLabel::Right),
        config.strict,
    )
    .await?;

    info!(
        connector = %config.connector,
        left = %config.left_version,
        right = %config.right_version,
        primary_key = %config.primary_key,
        "starting regression run"
    );

    run_with_sources(left.as_mut(), right.as_mut(), &config.primary_key, sinks).await
}
