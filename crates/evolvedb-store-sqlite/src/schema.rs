// crates/evolvedb-store-sqlite/src/schema.rs
// ============================================================================
// Module: Schema Cache and Evolution
// Description: Cached column snapshots and automatic column addition.
// Purpose: Grow table schemas to cover every field ever written.
// Dependencies: evolvedb-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! Tables start with a single `id INTEGER PRIMARY KEY AUTOINCREMENT` column
//! and gain one nullable column per previously unseen field. Column types are
//! inferred from the first value written: integers map to `INTEGER`, floats
//! to `REAL`, everything else to `TEXT`. Columns are never removed.
//!
//! The cache holds a column snapshot per (store, table). A snapshot is always
//! a subset of the on-disk columns: entries are dropped right after a column
//! is added and whenever a write rolls back. Missing tables are never cached.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use evolvedb_core::ROW_ID_COLUMN;
use evolvedb_core::Record;
use evolvedb_core::StoreId;
use evolvedb_core::TableName;
use evolvedb_core::Value;
use rusqlite::Connection;
use rusqlite::params;
use tracing::debug;

use crate::codec::quote_ident;
use crate::store::SqliteStoreError;
use crate::store::SqliteTableStore;

// ============================================================================
// SECTION: Column Types
// ============================================================================

/// Declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// `INTEGER` affinity.
    Integer,
    /// `REAL` affinity.
    Real,
    /// `TEXT` affinity.
    Text,
}

impl ColumnType {
    /// Infers the column type for a value.
    #[must_use]
    pub const fn for_value(value: &Value) -> Self {
        match value {
            Value::Integer(_) => Self::Integer,
            Value::Float(_) => Self::Real,
            Value::Null | Value::Text(_) => Self::Text,
        }
    }

    /// Maps a declared type from `PRAGMA table_info`.
    #[must_use]
    pub fn from_declared(declared: &str) -> Self {
        let declared = declared.to_ascii_uppercase();
        if declared.contains("INT") {
            Self::Integer
        } else if ["REAL", "FLOA", "DOUB"].iter().any(|pattern| declared.contains(pattern)) {
            Self::Real
        } else {
            Self::Text
        }
    }

    /// Returns the SQL type name.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }
}

/// Column name and declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name as stored.
    pub name: String,
    /// Declared type text.
    pub declared_type: String,
}

/// Cached column snapshot.
pub(crate) type Snapshot = Arc<Vec<ColumnInfo>>;

/// Returns true when `snapshot` has a column resolving to `name`.
pub(crate) fn has_column(snapshot: &[ColumnInfo], name: &str) -> bool {
    snapshot.iter().any(|column| column.name.eq_ignore_ascii_case(name))
}

// ============================================================================
// SECTION: Schema Cache
// ============================================================================

/// Column snapshots keyed by store and table.
#[derive(Default)]
pub(crate) struct SchemaCache {
    /// Cached snapshots.
    entries: Mutex<HashMap<(StoreId, TableName), Snapshot>>,
}

impl SchemaCache {
    /// Returns the column snapshot, loading it through `connection` on a miss.
    ///
    /// An empty snapshot means the table does not exist.
    pub(crate) fn columns(
        &self,
        connection: &Connection,
        store: &StoreId,
        table: &TableName,
    ) -> Result<Snapshot, SqliteStoreError> {
        let key = (store.clone(), table.clone());
        if let Some(snapshot) = self.lock()?.get(&key) {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = Arc::new(load_columns(connection, table)?);
        if !snapshot.is_empty() {
            self.lock()?.insert(key, Arc::clone(&snapshot));
        }
        Ok(snapshot)
    }

    /// Drops the snapshot for (store, table).
    pub(crate) fn invalidate(&self, store: &StoreId, table: &TableName) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(&(store.clone(), table.clone()));
    }

    /// Drops every snapshot.
    pub(crate) fn clear(&self) {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
    }

    /// Creates the table with its row key column if it does not exist.
    pub(crate) fn ensure_table(
        &self,
        connection: &Connection,
        table: &TableName,
    ) -> Result<(), SqliteStoreError> {
        connection
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} ({} INTEGER PRIMARY KEY AUTOINCREMENT);",
                quote_ident(table.as_str()),
                quote_ident(ROW_ID_COLUMN)
            ))
            .map_err(|err| SqliteStoreError::Schema(err.to_string()))
    }

    /// Adds every listed column missing from the table.
    ///
    /// Returns the number of columns added.
    pub(crate) fn ensure_columns<'a>(
        &self,
        connection: &Connection,
        store: &StoreId,
        table: &TableName,
        wanted: impl IntoIterator<Item = (&'a str, ColumnType)>,
    ) -> Result<usize, SqliteStoreError> {
        let mut added = 0;
        for (name, column_type) in wanted {
            if has_column(&self.columns(connection, store, table)?, name) {
                continue;
            }
            // Another context may have added the column since the snapshot was taken.
            self.invalidate(store, table);
            if has_column(&self.columns(connection, store, table)?, name) {
                continue;
            }
            connection
                .execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {} DEFAULT NULL;",
                    quote_ident(table.as_str()),
                    quote_ident(name),
                    column_type.sql()
                ))
                .map_err(|err| SqliteStoreError::Schema(err.to_string()))?;
            self.invalidate(store, table);
            added += 1;
            debug!(
                store = %store,
                table = %table,
                column = name,
                column_type = column_type.sql(),
                "added column"
            );
        }
        Ok(added)
    }

    /// Ensures the table exists and has a column for every field of `record`.
    pub(crate) fn ensure_record_columns(
        &self,
        connection: &Connection,
        store: &StoreId,
        table: &TableName,
        record: &Record,
    ) -> Result<usize, SqliteStoreError> {
        self.ensure_table(connection, table)?;
        self.ensure_columns(
            connection,
            store,
            table,
            record.iter().map(|(name, value)| (name.as_str(), ColumnType::for_value(value))),
        )
    }

    /// Locks the snapshot map.
    fn lock(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<(StoreId, TableName), Snapshot>>, SqliteStoreError> {
        self.entries
            .lock()
            .map_err(|_| SqliteStoreError::Io("schema cache mutex poisoned".to_string()))
    }
}

/// Reads column names and declared types from the engine.
pub(crate) fn load_columns(
    connection: &Connection,
    table: &TableName,
) -> Result<Vec<ColumnInfo>, SqliteStoreError> {
    let mut statement = connection
        .prepare_cached("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
        .map_err(|err| SqliteStoreError::Schema(err.to_string()))?;
    let rows = statement
        .query_map(params![table.as_str()], |row| {
            Ok(ColumnInfo { name: row.get(0)?, declared_type: row.get(1)? })
        })
        .map_err(|err| SqliteStoreError::Schema(err.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|err| SqliteStoreError::Schema(err.to_string()))
}

// ============================================================================
// SECTION: Public Schema API
// ============================================================================

impl SqliteTableStore {
    /// Returns the column names of `table`, row key included, in declaration order.
    ///
    /// A table that was never written has no columns.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the store cannot be opened or inspected.
    pub fn columns(
        &self,
        store: &StoreId,
        table: &TableName,
    ) -> Result<Vec<String>, SqliteStoreError> {
        let Some(handle) = self.existing_handle(store)? else {
            return Ok(Vec::new());
        };
        let connection = handle.lock()?;
        let snapshot = self.schemas.columns(&connection, store, table)?;
        drop(connection);
        Ok(snapshot.iter().map(|column| column.name.clone()).collect())
    }
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

    fn names(snapshot: &[ColumnInfo]) -> Vec<&str> {
        snapshot.iter().map(|column| column.name.as_str()).collect()
    }

    #[test]
    fn column_type_inference_follows_value_kind() {
        assert_eq!(ColumnType::for_value(&Value::Integer(1)), ColumnType::Integer);
        assert_eq!(ColumnType::for_value(&Value::Float(1.0)), ColumnType::Real);
        assert_eq!(ColumnType::for_value(&Value::Text("x".to_string())), ColumnType::Text);
        assert_eq!(ColumnType::for_value(&Value::Null), ColumnType::Text);
    }

    #[test]
    fn declared_types_map_by_affinity() {
        assert_eq!(ColumnType::from_declared("integer"), ColumnType::Integer);
        assert_eq!(ColumnType::from_declared("DOUBLE PRECISION"), ColumnType::Real);
        assert_eq!(ColumnType::from_declared(""), ColumnType::Text);
    }

    #[test]
    fn missing_tables_are_not_cached() {
        let connection = Connection::open_in_memory().unwrap();
        let cache = SchemaCache::default();
        let store = StoreId::new("memory");
        let table = TableName::parse("samples").unwrap();
        assert!(cache.columns(&connection, &store, &table).unwrap().is_empty());
        cache.ensure_table(&connection, &table).unwrap();
        assert_eq!(names(&cache.columns(&connection, &store, &table).unwrap()), vec!["id"]);
    }

    #[test]
    fn ensure_record_columns_adds_only_missing_columns() {
        let connection = Connection::open_in_memory().unwrap();
        let cache = SchemaCache::default();
        let store = StoreId::new("memory");
        let table = TableName::parse("samples").unwrap();
        let first = Record::new().with("temperature", 22.5).unwrap().with("humidity", 60).unwrap();
        assert_eq!(cache.ensure_record_columns(&connection, &store, &table, &first).unwrap(), 2);

        let second = Record::new().with("HUMIDITY", 61).unwrap().with("steps", 1500).unwrap();
        assert_eq!(cache.ensure_record_columns(&connection, &store, &table, &second).unwrap(), 1);

        let snapshot = cache.columns(&connection, &store, &table).unwrap();
        assert_eq!(names(&snapshot), vec!["id", "temperature", "humidity", "steps"]);
        let types: Vec<&str> =
            snapshot.iter().map(|column| column.declared_type.as_str()).collect();
        assert_eq!(types, vec!["INTEGER", "REAL", "INTEGER", "INTEGER"]);
    }

    #[test]
    fn snapshot_is_refreshed_after_column_addition() {
        let connection = Connection::open_in_memory().unwrap();
        let cache = SchemaCache::default();
        let store = StoreId::new("memory");
        let table = TableName::parse("samples").unwrap();
        cache.ensure_table(&connection, &table).unwrap();
        let before = cache.columns(&connection, &store, &table).unwrap();
        cache
            .ensure_columns(&connection, &store, &table, [("rx", ColumnType::Integer)])
            .unwrap();
        let after = cache.columns(&connection, &store, &table).unwrap();
        assert_eq!(names(&before), vec!["id"]);
        assert_eq!(names(&after), vec!["id", "rx"]);
    }
}
