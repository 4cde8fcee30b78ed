//! Store configuration via `statekit.toml`
//!
//! One config file drives every store opened by a registry: the schema
//! version compiled into the app, the directory durable backends write to,
//! and the default validation mode. Edit the file and restart to change it.

use crate::validation::ValidationMode;
use serde::{Deserialize, Serialize};
use statekit_core::{SemanticVersion, StoreError, StoreResult};
use std::path::{Path, PathBuf};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "statekit.toml";

/// Store configuration loaded from `statekit.toml`.
///
/// # Example
///
/// ```toml
/// # Schema version of persisted data; a major bump discards stored data
/// schema_version = "1.0.0"
///
/// # Directory for file, preferences and scenario data
/// data_dir = ".statekit"
///
/// # "strict" (default) or "lenient"
/// validation_mode = "strict"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Schema version stamped on every persisted document
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Root directory of durable backends
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Validation mode: `"strict"` or `"lenient"`
    #[serde(default = "default_validation_mode")]
    pub validation_mode: String,
}

fn default_schema_version() -> String {
    "1.0.0".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".statekit")
}

fn default_validation_mode() -> String {
    "strict".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            data_dir: default_data_dir(),
            validation_mode: default_validation_mode(),
        }
    }
}

impl StoreConfig {
    /// Default config with a different data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Parse the schema version.
    ///
    /// # Errors
    ///
    /// Returns `InvalidVersionFormat` if the string is not `M.m.p`.
    pub fn version(&self) -> StoreResult<SemanticVersion> {
        SemanticVersion::parse(&self.schema_version)
    }

    /// Parse the validation mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"strict"` or `"lenient"`.
    pub fn mode(&self) -> StoreResult<ValidationMode> {
        match self.validation_mode.as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "lenient" => Ok(ValidationMode::Lenient),
            other => Err(StoreError::InvalidConfiguration(format!(
                "Invalid validation mode '{}' in statekit.toml. Expected \"strict\" or \"lenient\".",
                other
            ))),
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# statekit store configuration
#
# Schema version of persisted data. Stores whose persisted version is a
# major version behind this one start empty.
schema_version = "1.0.0"

# Directory for file-backed, preferences and scenario data
data_dir = ".statekit"

# Validation mode: "strict" (default) or "lenient"
#   "strict"  = a violating mutation is rejected and nothing is applied
#   "lenient" = the mutation is applied and the violation is logged
validation_mode = "strict"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds an
    /// invalid version or validation mode.
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidConfiguration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            StoreError::InvalidConfiguration(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        // Validate parsed values eagerly
        config.version()?;
        config.mode()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> StoreResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> StoreResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            StoreError::InvalidConfiguration(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
