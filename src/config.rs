//! Regression run configuration
//!
//! Which connector runs to compare, how to key records, and where reports go.
//! Loaded from TOML; the CLI overrides individual fields.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::protocol::SourceLabel;

/// Regression run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionConfig {
    /// Connector image name, e.g. `source-stripe`
    #[serde(default = "default_connector")]
    pub connector: String,

    /// Image tag run on the left side
    #[serde(default = "default_version")]
    pub left_version: String,

    /// Image tag run on the right side
    #[serde(default = "default_version")]
    pub right_version: String,

    /// Connector config file, relative to the working directory
    #[serde(default = "default_connector_config")]
    pub connector_config: String,

    /// Configured catalog file, relative to the working directory
    #[serde(default = "default_catalog")]
    pub catalog: String,

    /// Shell command used for a side without an explicit command or file.
    /// Placeholders: `{connector}`, `{version}`, `{config}`, `{catalog}`.
    #[serde(default = "default_command_template")]
    pub command_template: String,

    #[serde(default)]
    pub left: SideConfig,

    #[serde(default)]
    pub right: SideConfig,

    /// Record field used to match rows between the two runs
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Fail on stdout lines that are not protocol messages
    #[serde(default)]
    pub strict: bool,

    #[serde(default)]
    pub output: OutputConfig,
}

fn default_connector() -> String {
    "source-stripe".to_string()
}
fn default_version() -> String {
    "4.5.4".to_string()
}
fn default_connector_config() -> String {
    "secrets/config.json".to_string()
}
fn default_catalog() -> String {
    "secrets/tmp_catalog.json".to_string()
}
fn default_command_template() -> String {
    "docker run --rm -v $(pwd)/secrets:/secrets -v $(pwd)/integration_tests:/integration_tests \
     airbyte/{connector}:{version} read --config /{config} --catalog /{catalog}"
        .to_string()
}
fn default_primary_key() -> String {
    "id".to_string()
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            connector: default_connector(),
            left_version: default_version(),
            right_version: default_version(),
            connector_config: default_connector_config(),
            catalog: default_catalog(),
            command_template: default_command_template(),
            left: SideConfig::default(),
            right: SideConfig::default(),
            primary_key: default_primary_key(),
            strict: false,
            output: OutputConfig::default(),
        }
    }
}

/// Per-side overrides. `file` wins over `command`, which wins over the template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Report outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Paginated text report
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    /// Optional JSON export
    #[serde(default)]
    pub json_path: Option<PathBuf>,
}

fn default_report_path() -> PathBuf {
    PathBuf::from("regression_report.txt")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_path: default_report_path(),
            json_path: None,
        }
    }
}

/// Where one side's messages come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Command(String),
    File(PathBuf),
}

impl RegressionConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("Using default regression config ({} not found)", path.display());
            Ok(Self::default())
        }
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn side(&self, label: SourceLabel) -> &SideConfig {
        match label {
            SourceLabel::Left => &self.left,
            SourceLabel::Right => &self.right,
        }
    }

    pub fn side_mut(&mut self, label: SourceLabel) -> &mut SideConfig {
        match label {
            SourceLabel::Left => &mut self.left,
            SourceLabel::Right => &mut self.right,
        }
    }

    pub fn version(&self, label: SourceLabel) -> &str {
        match label {
            SourceLabel::Left => &self.left_version,
            SourceLabel::Right => &self.right_version,
        }
    }

    /// Render the command template for one side.
    pub fn command_for(&self, label: SourceLabel) -> String {
        self.command_template
            .replace("{connector}", &self.connector)
            .replace("{version}", self.version(label))
            .replace("{config}", &self.connector_config)
            .replace("{catalog}", &self.catalog)
    }

    pub fn source_spec(&self, label: SourceLabel) -> SourceSpec {
        let side = self.side(label);
        if let Some(file) = &side.file {
            SourceSpec::File(file.clone())
        } else if let Some(command) = &side.command {
            SourceSpec::Command(command.clone())
        } else {
            SourceSpec::Command(self.command_for(label))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.primary_key.trim().is_empty() {
            bail!("primary_key must not be empty");
        }
        for label in [SourceLabel::Left, SourceLabel::Right] {
            if let SourceSpec::Command(command) = self.source_spec(label) {
                if command.trim().is_empty() {
                    bail!("{} command is empty", label);
                }
            }
        }
        Ok(())
    }
}
