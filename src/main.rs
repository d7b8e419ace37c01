//! Connector Regression CLI
//!
//! Runs two versions of a connector side by side and reports, per stream
//! and column, how their records differ.
//!
//! Usage:
//!   connector-regression --connector source-stripe --left-version 4.5.4 --right-version 5.0.0
//!   connector-regression --left-file captures/old.jsonl --right-file captures/new.jsonl --json report.json
//!
//! Environment:
//!   REGRESSION_CONFIG_PATH - TOML config file (default: regression.toml)
//!   REGRESSION_PRIMARY_KEY - Record field used to match rows
//!   RUST_LOG - Log filter (overrides --verbose)

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use connector_regression::config::RegressionConfig;
use connector_regression::protocol::SourceLabel;
use connector_regression::runner::{run_regression, sinks_for};

#[derive(Parser, Debug)]
#[command(name = "connector-regression")]
#[command(about = "Diff the records of two connector runs field by field")]
struct Args {
    /// TOML config file; missing file means defaults
    #[arg(long, env = "REGRESSION_CONFIG_PATH", default_value = "regression.toml")]
    config: PathBuf,

    /// Connector image name
    #[arg(long, env = "REGRESSION_CONNECTOR")]
    connector: Option<String>,

    /// Image tag for the left run
    #[arg(long)]
    left_version: Option<String>,

    /// Image tag for the right run
    #[arg(long)]
    right_version: Option<String>,

    /// Connector config file passed to `read --config`
    #[arg(long)]
    connector_config: Option<String>,

    /// Configured catalog passed to `read --catalog`
    #[arg(long)]
    catalog: Option<String>,

    /// Shell command producing the left run's output
    #[arg(long, conflicts_with = "left_file")]
    left_command: Option<String>,

    /// Shell command producing the right run's output
    #[arg(long, conflicts_with = "right_file")]
    right_command: Option<String>,

    /// Captured output to replay as the left run
    #[arg(long)]
    left_file: Option<PathBuf>,

    /// Captured output to replay as the right run
    #[arg(long)]
    right_file: Option<PathBuf>,

    /// Record field used to match rows between runs
    #[arg(long, env = "REGRESSION_PRIMARY_KEY")]
    primary_key: Option<String>,

    /// Paginated text report path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Also write the report as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Fail on stdout lines that are not protocol messages
    #[arg(long)]
    strict: bool,

    /// Debug logging (data mismatches, reconciliation, connector stderr)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(self, config: &mut RegressionConfig) {
        if let Some(v) = self.connector {
            config.connector = v;
        }
        if let Some(v) = self.left_version {
            config.left_version = v;
        }
        if let Some(v) = self.right_version {
            config.right_version = v;
        }
        if let Some(v) = self.connector_config {
            config.connector_config = v;
        }
        if let Some(v) = self.catalog {
            config.catalog = v;
        }
        for (label, command, file) in [
            (SourceLabel::Left, self.left_command, self.left_file),
            (SourceLabel::Right, self.right_command, self.right_file),
        ] {
            let side = config.side_mut(label);
            if command.is_some() {
                side.command = command;
                side.file = None;
            }
            if file.is_some() {
                side.file = file;
            }
        }
        if let Some(v) = self.primary_key {
            config.primary_key = v;
        }
        if let Some(v) = self.report {
            config.output.report_path = v;
        }
        if let Some(v) = self.json {
            config.output.json_path = Some(v);
        }
        if self.strict {
            config.strict = true;
        }
    }
}

/// Initialize tracing, honouring RUST_LOG when set
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "info,connector_regression=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = RegressionConfig::load_or_default(&args.config)?;
    args.apply(&mut config);

    let mut sinks = sinks_for(&config.output);
    match run_regression(&config, &mut sinks).await {
        Ok(report) => {
            info!(
                streams = report.streams.len(),
                differences = report.has_differences(),
                "regression run complete"
            );
            Ok(())
        }
        Err(e) => {
            error!("{:#}", e);
            Err(e)
        }
    }
}
