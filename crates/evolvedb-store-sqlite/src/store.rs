// crates/evolvedb-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Table Store
// Description: Store handle cache, connection settings, and error model.
// Purpose: Own one SQLite connection per store file and expose TableStore.
// Dependencies: evolvedb-core, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteTableStore`] is the explicit context object for every operation:
//! it owns the store handle cache (one connection per [`StoreId`], opened
//! lazily and kept until [`SqliteTableStore::close`]) and the schema cache.
//! Each handle serializes access to its connection with a mutex; writes hold
//! it for the whole read-modify-write and open `IMMEDIATE` transactions so
//! separate processes on the same file are serialized by `SQLite` as well.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use evolvedb_core::ArchivePolicy;
use evolvedb_core::ArchiveReport;
use evolvedb_core::ReadRequest;
use evolvedb_core::Record;
use evolvedb_core::StoreError;
use evolvedb_core::StoreId;
use evolvedb_core::TableName;
use evolvedb_core::TableStore;
use evolvedb_core::WriteOptions;
use evolvedb_core::WriteReceipt;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::schema::SchemaCache;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Connection settings applied to every store opened by a [`SqliteTableStore`].
///
/// # Invariants
/// - `busy_timeout_ms` is interpreted as milliseconds and must be greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl SqliteStoreConfig {
    /// Validates connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a setting is out of range.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        if self.busy_timeout_ms == 0 {
            return Err(SqliteStoreError::Invalid(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding record values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error (path, handle, or lock failure).
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error outside schema changes and queries.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Schema change failed.
    #[error("sqlite store schema error: {0}")]
    Schema(String),
    /// Query construction or execution failed.
    #[error("sqlite store query error: {0}")]
    Query(String),
    /// Invalid caller input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => Self::Storage(message),
            SqliteStoreError::Schema(message) => Self::Schema(message),
            SqliteStoreError::Query(message) => Self::Query(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

impl From<StoreError> for SqliteStoreError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Schema(message) => Self::Schema(message),
            StoreError::Query(message) => Self::Query(message),
            StoreError::Storage(message) => Self::Db(message),
            StoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps an engine error raised outside DDL and queries.
#[allow(clippy::needless_pass_by_value, reason = "Used directly with map_err.")]
pub(crate) fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store Handles
// ============================================================================

/// Live connection for one store file.
pub(crate) struct StoreHandle {
    /// Connection guarded by a mutex; holding it serializes store access.
    connection: Mutex<Connection>,
}

impl StoreHandle {
    /// Locks the connection.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite connection mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed schema-evolving table store.
pub struct SqliteTableStore {
    /// Connection settings.
    config: SqliteStoreConfig,
    /// Open handles keyed by store identifier.
    handles: Mutex<HashMap<StoreId, Arc<StoreHandle>>>,
    /// Column snapshots keyed by store and table.
    pub(crate) schemas: SchemaCache,
}

impl SqliteTableStore {
    /// Creates a store context; no files are opened until first use.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the configuration is invalid.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        Ok(Self { config, handles: Mutex::new(HashMap::new()), schemas: SchemaCache::default() })
    }

    /// Returns the number of open store handles.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.handles.lock().map_or(0, |handles| handles.len())
    }

    /// Closes every open handle and clears the schema cache.
    ///
    /// Handles still borrowed by in-flight operations close when those finish.
    /// The context remains usable and reopens stores lazily.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Io`] when the handle map lock is poisoned.
    pub fn close(&self) -> Result<(), SqliteStoreError> {
        let drained: Vec<Arc<StoreHandle>> = {
            let mut handles = self.lock_handles()?;
            handles.drain().map(|(_, handle)| handle).collect()
        };
        drop(drained);
        self.schemas.clear();
        Ok(())
    }

    /// Returns the handle for `store`, opening it on first use.
    pub(crate) fn handle(&self, store: &StoreId) -> Result<Arc<StoreHandle>, SqliteStoreError> {
        let mut handles = self.lock_handles()?;
        if let Some(handle) = handles.get(store) {
            return Ok(Arc::clone(handle));
        }
        let connection = open_connection(store.as_path(), &self.config)?;
        let handle = Arc::new(StoreHandle { connection: Mutex::new(connection) });
        handles.insert(store.clone(), Arc::clone(&handle));
        drop(handles);
        debug!(store = %store, "opened sqlite store");
        Ok(handle)
    }

    /// Returns the handle for `store` only when it is cached or its file exists.
    pub(crate) fn existing_handle(
        &self,
        store: &StoreId,
    ) -> Result<Option<Arc<StoreHandle>>, SqliteStoreError> {
        let cached = self.lock_handles()?.get(store).cloned();
        if cached.is_some() {
            return Ok(cached);
        }
        if !store.as_path().exists() {
            return Ok(None);
        }
        self.handle(store).map(Some)
    }

    /// Locks the handle map.
    fn lock_handles(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<StoreId, Arc<StoreHandle>>>, SqliteStoreError> {
        self.handles
            .lock()
            .map_err(|_| SqliteStoreError::Io("store handle map mutex poisoned".to_string()))
    }
}

impl TableStore for SqliteTableStore {
    fn write(
        &self,
        store: &StoreId,
        table: &TableName,
        record: &Record,
        options: &WriteOptions,
    ) -> Result<WriteReceipt, StoreError> {
        self.write_record(store, table, record, options).map_err(StoreError::from)
    }

    fn read(
        &self,
        store: &StoreId,
        table: &TableName,
        request: &ReadRequest,
    ) -> Result<Vec<Record>, StoreError> {
        self.read_records(store, table, request).map_err(StoreError::from)
    }

    fn archive(
        &self,
        source: &StoreId,
        table: &TableName,
        archive: &StoreId,
        policy: &ArchivePolicy,
    ) -> Result<ArchiveReport, StoreError> {
        self.archive_records(source, table, archive, policy).map_err(StoreError::from)
    }

    fn table_columns(
        &self,
        store: &StoreId,
        table: &TableName,
    ) -> Result<Vec<String>, StoreError> {
        self.columns(store, table).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.is_empty() {
        return Err(SqliteStoreError::Invalid("store path must be non-empty".to_string()));
    }
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(
    path: &Path,
    config: &SqliteStoreConfig,
) -> Result<Connection, SqliteStoreError> {
    validate_store_path(path)?;
    ensure_parent_dir(path)?;
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags)
        .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
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

    use super::*;

    #[test]
    fn config_rejects_zero_busy_timeout() {
        let config = SqliteStoreConfig { busy_timeout_ms: 0, ..SqliteStoreConfig::default() };
        assert!(SqliteTableStore::new(config).is_err());
    }

    #[test]
    fn validate_store_path_rejects_directories() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(validate_store_path(temp.path()).is_err());
    }

    #[test]
    fn validate_store_path_rejects_overlong_component() {
        let path = Path::new("/tmp").join("a".repeat(MAX_PATH_COMPONENT_LENGTH + 1));
        assert!(validate_store_path(&path).is_err());
    }

    #[test]
    fn handles_are_reused_and_closed() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = SqliteTableStore::new(SqliteStoreConfig::default()).unwrap();
        let id = StoreId::new(temp.path().join("nested").join("live.sqlite"));
        let first = store.handle(&id).unwrap();
        let second = store.handle(&id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.open_handles(), 1);
        drop((first, second));
        store.close().unwrap();
        assert_eq!(store.open_handles(), 0);
    }

    #[test]
    fn existing_handle_does_not_create_files() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = SqliteTableStore::new(SqliteStoreConfig::default()).unwrap();
        let id = StoreId::new(temp.path().join("missing.sqlite"));
        assert!(store.existing_handle(&id).unwrap().is_none());
        assert!(!id.as_path().exists());
    }

    #[test]
    fn store_errors_map_to_core_kinds() {
        assert_eq!(
            StoreError::from(SqliteStoreError::Io("x".to_string())),
            StoreError::Storage("x".to_string())
        );
        assert_eq!(
            StoreError::from(SqliteStoreError::Query("q".to_string())),
            StoreError::Query("q".to_string())
        );
    }
}
