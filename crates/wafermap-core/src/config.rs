use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use wafermap_parser::{SignalDirection, TestSpec};

use crate::catalog::DEFAULT_EXTENSION;
use crate::wafer::GridShape;

pub const CONFIG_ENV: &str = "WAFERMAP_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "configuration_app.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Run configuration: where the reports live and which devices must be
/// present.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub input_directory: PathBuf,
    pub asic_list: Vec<String>,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_tx_tests")]
    pub tx_tests: Vec<TestSpec>,
    #[serde(default = "default_rx_tests")]
    pub rx_tests: Vec<TestSpec>,
    #[serde(default)]
    pub die_grid: GridShape,
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_tx_tests() -> Vec<TestSpec> {
    vec![TestSpec::peak_to_peak(SignalDirection::Tx)]
}

fn default_rx_tests() -> Vec<TestSpec> {
    vec![TestSpec::peak_to_peak(SignalDirection::Rx)]
}

impl AppConfig {
    /// Loads a `.toml` file as TOML and anything else as JSON, then validates.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let config = if is_toml {
            Self::from_toml_str(&content)?
        } else {
            Self::from_json_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// `explicit`, then `$WAFERMAP_CONFIG`, then `configuration_app.json` in
    /// the working directory.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.asic_list.is_empty() {
            return Err(ConfigError::Invalid("asic_list must not be empty".to_string()));
        }
        let mut seen = BTreeSet::new();
        for device in &self.asic_list {
            let device = device.trim();
            if device.is_empty() {
                return Err(ConfigError::Invalid("asic_list contains an empty entry".to_string()));
            }
            if !seen.insert(device) {
                return Err(ConfigError::Invalid(format!(
                    "asic_list contains '{device}' more than once"
                )));
            }
        }
        if self.tx_tests.is_empty() || self.rx_tests.is_empty() {
            return Err(ConfigError::Invalid(
                "tx_tests and rx_tests must each name at least one test".to_string(),
            ));
        }
        if self.die_grid.is_empty() {
            return Err(ConfigError::Invalid("die_grid must have non-zero size".to_string()));
        }
        Ok(())
    }

    pub fn expected_devices(&self) -> BTreeSet<String> {
        self.asic_list
            .iter()
            .map(|device| device.trim().to_string())
            .collect()
    }
}
