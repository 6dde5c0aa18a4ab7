//! Engine configuration via `strata-state.toml`
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Options apply process-wide: the snapshot runtime is shared by every
//! engine in the process.

use crate::transaction::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use strata_concurrency::RuntimeOptions;
use strata_core::{Error, Result};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "strata-state.toml";

/// Engine configuration loaded from `strata-state.toml`.
///
/// # Example
///
/// ```toml
/// optimistic_merge = true
/// reclaim_records = true
///
/// [retry]
/// max_reruns = 3
/// initial_backoff_ms = 10
/// backoff_ceiling_ms = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Compute apply merges outside the runtime lock first
    #[serde(default = "default_true")]
    pub optimistic_merge: bool,
    /// Recycle unreachable records after each publication
    #[serde(default = "default_true")]
    pub reclaim_records: bool,
    /// Retry policy for `with_mutable_snapshot_retry`
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_true() -> bool {
    true
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            optimistic_merge: true,
            reclaim_records: true,
            retry: RetryConfig::default(),
        }
    }
}

impl StateConfig {
    /// Runtime options derived from this config
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            optimistic_merge: self.optimistic_merge,
            reclaim_records: self.reclaim_records,
        }
    }

    /// Check field combinations serde cannot
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the retry backoff starts above its ceiling.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Strata state engine configuration
#
# Resolve apply conflicts optimistically outside the runtime lock, then
# re-validate under it (default: true)
optimistic_merge = true

# Recycle records no open snapshot can read after each publication
# (default: true)
reclaim_records = true

# Reruns of a conflicting with_mutable_snapshot_retry block. The backoff
# doubles per rerun from initial_backoff_ms up to backoff_ceiling_ms.
[retry]
max_reruns = 3
initial_backoff_ms = 10
backoff_ceiling_ms = 100
"#
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StateConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(message) => Error::Config(format!("{} ({})", message, path.display())),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
