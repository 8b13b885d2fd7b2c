// crates/evolvedb-store-sqlite/src/write.rs
// ============================================================================
// Module: Write Orchestrator
// Description: Atomic schema evolution, counter normalization, and insert.
// Purpose: Persist one record per call with all-or-nothing semantics.
// Dependencies: evolvedb-core, rusqlite, time, tracing
// ============================================================================

//! ## Overview
//! A write runs every step inside one `IMMEDIATE` transaction while holding
//! the store's connection lock:
//! 1. grow the main table to cover the record,
//! 2. in cumulative mode, grow the offsets table, normalize the tracked
//!    fields against the latest row and offsets row, and persist new offsets
//!    when a reset is detected,
//! 3. insert the row.
//!
//! Any failure rolls the whole transaction back and drops the schema
//! snapshots of both tables, so no partial column set, offsets row, or data
//! row survives.

// ============================================================================
// SECTION: Imports
// ============================================================================

use evolvedb_core::FieldName;
use evolvedb_core::ROW_ID_COLUMN;
use evolvedb_core::Record;
use evolvedb_core::StoreId;
use evolvedb_core::TableName;
use evolvedb_core::Value;
use evolvedb_core::WriteOptions;
use evolvedb_core::WriteReceipt;
use evolvedb_core::normalize;
use rusqlite::Connection;
use rusqlite::TransactionBehavior;
use rusqlite::params_from_iter;
use time::OffsetDateTime;
use tracing::warn;

use crate::codec::quote_ident;
use crate::codec::to_sql;
use crate::read::fetch_latest;
use crate::store::SqliteStoreError;
use crate::store::SqliteTableStore;
use crate::store::db_error;

// ============================================================================
// SECTION: Write Path
// ============================================================================

impl SqliteTableStore {
    /// Writes one record into `table`, creating the store, table and
    /// columns as needed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for reserved field names or
    /// non-numeric counters, [`SqliteStoreError::Schema`] when a column cannot
    /// be added, and [`SqliteStoreError::Db`] or [`SqliteStoreError::Io`] for
    /// engine and handle failures. Nothing is persisted on error.
    pub fn write_record(
        &self,
        store: &StoreId,
        table: &TableName,
        record: &Record,
        options: &WriteOptions,
    ) -> Result<WriteReceipt, SqliteStoreError> {
        validate_write(record, options)?;
        let mut row = record.clone();
        if let Some(field) = &options.timestamp_field {
            row.insert(field.clone(), Value::Integer(OffsetDateTime::now_utc().unix_timestamp()));
        }

        let handle = self.handle(store)?;
        let mut connection = handle.lock()?;
        let result = self.write_locked(&mut connection, store, table, row, options);
        drop(connection);

        if let Err(err) = &result {
            self.schemas.invalidate(store, table);
            self.schemas.invalidate(store, &table.offsets_table());
            warn!(store = %store, table = %table, error = %err, "write rolled back");
        }
        result
    }

    /// Runs the write transaction on a locked connection.
    fn write_locked(
        &self,
        connection: &mut Connection,
        store: &StoreId,
        table: &TableName,
        mut row: Record,
        options: &WriteOptions,
    ) -> Result<WriteReceipt, SqliteStoreError> {
        let tx =
            connection.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        self.schemas.ensure_record_columns(&tx, store, table, &row)?;

        let mut reset_detected = false;
        if let Some(fields) = &options.cumulative_fields {
            let offsets_table = table.offsets_table();
            self.schemas.ensure_record_columns(&tx, store, &offsets_table, &row)?;

            let last_totals =
                fetch_latest(&tx, &self.schemas, store, table)?.map(|(_, last)| last);
            let (offsets_id, offsets) =
                match fetch_latest(&tx, &self.schemas, store, &offsets_table)? {
                    Some((id, offsets)) => (Some(id), offsets),
                    None => (None, Record::new()),
                };
            let tracked = if fields.is_empty() { None } else { Some(fields.as_slice()) };
            let normalized = normalize(
                &row,
                &offsets,
                &last_totals.unwrap_or_default(),
                tracked,
                options.timestamp_field.as_ref(),
            )?;

            if normalized.reset_detected {
                store_offsets(&tx, &offsets_table, offsets_id, &normalized.offsets)?;
                warn!(
                    store = %store,
                    table = %table,
                    fields = normalized.offsets.len(),
                    "cumulative counter reset detected; offsets rebased"
                );
            }
            reset_detected = normalized.reset_detected;
            row.merge(normalized.totals);
        }

        let row_id = insert_row(&tx, table, &row)?;
        tx.commit().map_err(db_error)?;
        Ok(WriteReceipt { row_id, reset_detected })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects reserved names in the record and options.
fn validate_write(record: &Record, options: &WriteOptions) -> Result<(), SqliteStoreError> {
    let reserved = |field: &FieldName| {
        SqliteStoreError::Invalid(format!("field name is reserved: {field}"))
    };
    if let Some(field) = record.keys().find(|field| field.is_reserved()) {
        return Err(reserved(field));
    }
    if let Some(field) = options.timestamp_field.as_ref().filter(|field| field.is_reserved()) {
        return Err(reserved(field));
    }
    if let Some(field) =
        options.cumulative_fields.iter().flatten().find(|field| field.is_reserved())
    {
        return Err(reserved(field));
    }
    Ok(())
}

/// Inserts `row` and returns its row key.
fn insert_row(
    connection: &Connection,
    table: &TableName,
    row: &Record,
) -> Result<i64, SqliteStoreError> {
    if row.is_empty() {
        connection
            .execute(&format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table.as_str())), [])
            .map_err(db_error)?;
        return Ok(connection.last_insert_rowid());
    }
    let columns: Vec<String> = row.keys().map(|field| quote_ident(field.as_str())).collect();
    let placeholders: Vec<String> =
        (1 ..= columns.len()).map(|index| format!("?{index}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table.as_str()),
        columns.join(", "),
        placeholders.join(", ")
    );
    connection
        .execute(&sql, params_from_iter(row.iter().map(|(_, value)| to_sql(value))))
        .map_err(db_error)?;
    Ok(connection.last_insert_rowid())
}

/// Updates the latest offsets row in place, or inserts the first one.
fn store_offsets(
    connection: &Connection,
    offsets_table: &TableName,
    latest_id: Option<i64>,
    offsets: &Record,
) -> Result<(), SqliteStoreError> {
    let Some(id) = latest_id else {
        insert_row(connection, offsets_table, offsets)?;
        return Ok(());
    };
    if offsets.is_empty() {
        return Ok(());
    }
    let assignments: Vec<String> = offsets
        .keys()
        .enumerate()
        .map(|(index, field)| format!("{} = ?{}", quote_ident(field.as_str()), index + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        quote_ident(offsets_table.as_str()),
        assignments.join(", "),
        quote_ident(ROW_ID_COLUMN),
        offsets.len() + 1
    );
    let values = offsets
        .iter()
        .map(|(_, value)| to_sql(value))
        .chain(std::iter::once(rusqlite::types::Value::Integer(id)));
    connection.execute(&sql, params_from_iter(values)).map_err(db_error)?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
