// crates/evolvedb-config/src/config.rs
// ============================================================================
// Module: evolvedb Configuration
// Description: TOML configuration model, loading, and validation.
// Purpose: Build store contexts and run retention from a config file.
// Dependencies: evolvedb-core, evolvedb-store-sqlite, serde, toml, tracing
// ============================================================================

//! ## Overview
//! Configuration is loaded from TOML with strict limits and validated before
//! use. Resolution order for the file: explicit path, then the
//! [`CONFIG_ENV_VAR`] environment variable, then [`DEFAULT_CONFIG_NAME`] in
//! the working directory.
//! Invariants:
//! - Files larger than [`MAX_CONFIG_FILE_SIZE`] or not UTF-8 are rejected.
//! - Unknown keys are rejected.
//! - Validation fails closed; an invalid config never builds a context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use evolvedb_core::ArchivePolicy;
use evolvedb_core::ArchiveReport;
use evolvedb_core::StoreError;
use evolvedb_core::StoreId;
use evolvedb_core::TableName;
use evolvedb_core::TableStore;
use evolvedb_store_sqlite::SqliteStoreConfig;
use evolvedb_store_sqlite::SqliteTableStore;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "EVOLVEDB_CONFIG";
/// Config file name used when no path is given.
pub const DEFAULT_CONFIG_NAME: &str = "evolvedb.toml";
/// Maximum config file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// The config file is not valid TOML for this model.
    #[error("config parse error: {0}")]
    Parse(String),
    /// The config is well-formed but not acceptable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvolvedbConfig {
    /// Connection settings applied to every store.
    #[serde(default)]
    pub store: SqliteStoreConfig,
    /// Retention policies applied by [`EvolvedbConfig::run_retention`].
    #[serde(default)]
    pub retention: Vec<RetentionPolicy>,
}

/// Retention policy for one live table.
///
/// # Invariants
/// - `store` and `archive` name different files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionPolicy {
    /// Live store file.
    pub store: PathBuf,
    /// Table to trim.
    pub table: TableName,
    /// Archive store file.
    pub archive: PathBuf,
    /// Newest rows kept in the live table.
    pub records_to_keep: u64,
}

impl RetentionPolicy {
    /// Returns the archival policy for this entry.
    #[must_use]
    pub fn archive_policy(&self) -> ArchivePolicy {
        ArchivePolicy::keep(self.records_to_keep)
    }
}

impl EvolvedbConfig {
    /// Loads and validates configuration from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the path is unsafe, the file is missing,
    /// oversized, not UTF-8, not valid TOML, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        validate_path(&resolved)?;
        let metadata =
            std::fs::metadata(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let bytes = std::fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if u64::try_from(bytes.len()).ok().is_none_or(|len| len > MAX_CONFIG_FILE_SIZE) {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = String::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
        for (index, policy) in self.retention.iter().enumerate() {
            validate_store_path(&policy.store).map_err(|reason| {
                ConfigError::Invalid(format!("retention[{index}].store {reason}"))
            })?;
            validate_store_path(&policy.archive).map_err(|reason| {
                ConfigError::Invalid(format!("retention[{index}].archive {reason}"))
            })?;
            if policy.store == policy.archive {
                return Err(ConfigError::Invalid(format!(
                    "retention[{index}] archive must differ from store"
                )));
            }
        }
        Ok(())
    }

    /// Builds a store context from the `[store]` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the store settings are rejected.
    pub fn open_context(&self) -> Result<SqliteTableStore, ConfigError> {
        SqliteTableStore::new(self.store.clone())
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Applies every retention policy in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`]; earlier policies stay applied.
    pub fn run_retention(
        &self,
        context: &SqliteTableStore,
    ) -> Result<Vec<ArchiveReport>, StoreError> {
        let mut reports = Vec::with_capacity(self.retention.len());
        for policy in &self.retention {
            let report = context.archive(
                &StoreId::new(&policy.store),
                &policy.table,
                &StoreId::new(&policy.archive),
                &policy.archive_policy(),
            )?;
            debug!(
                store = %policy.store.display(),
                table = %policy.table,
                moved = report.moved,
                "retention policy applied"
            );
            reports.push(report);
        }
        Ok(reports)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the argument, environment, or default.
fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_CONFIG_NAME)
}

/// Validates config path length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Checks a store path from a retention entry; returns the failure reason.
fn validate_store_path(path: &Path) -> Result<(), &'static str> {
    if path.as_os_str().is_empty() {
        return Err("must be non-empty");
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err("exceeds max path length");
    }
    if path.components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH)
    {
        return Err("has an overlong path component");
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use evolvedb_store_sqlite::SqliteStoreMode;

    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EvolvedbConfig::from_toml("").unwrap();
        assert_eq!(config, EvolvedbConfig::default());
    }

    #[test]
    fn store_section_is_parsed() {
        let config = EvolvedbConfig::from_toml(
            "[store]\nbusy_timeout_ms = 250\njournal_mode = \"delete\"\n",
        )
        .unwrap();
        assert_eq!(config.store.busy_timeout_ms, 250);
        assert_eq!(config.store.journal_mode, SqliteStoreMode::Delete);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = EvolvedbConfig::from_toml("[store]\nbusy_timeout = 1\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn invalid_table_name_is_rejected() {
        let result = EvolvedbConfig::from_toml(
            r#"
[[retention]]
store = "a.sqlite"
table = "bad-name"
archive = "b.sqlite"
records_to_keep = 1
"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn retention_to_same_store_is_rejected() {
        let result = EvolvedbConfig::from_toml(
            r#"
[[retention]]
store = "a.sqlite"
table = "t"
archive = "a.sqlite"
records_to_keep = 1
"#,
        );
        let error = result.unwrap_err();
        assert!(error.to_string().contains("archive must differ from store"));
    }

    #[test]
    fn empty_store_path_is_rejected() {
        let result = EvolvedbConfig::from_toml(
            r#"
[[retention]]
store = ""
table = "t"
archive = "b.sqlite"
records_to_keep = 1
"#,
        );
        let error = result.unwrap_err();
        assert!(error.to_string().contains("retention[0].store must be non-empty"));
    }
}
