// crates/evolvedb-store-sqlite/src/read.rs
// ============================================================================
// Module: Read Path
// Description: Projection, filtering, ordering, and limits over one table.
// Purpose: Return stored rows as records without exposing SQL to callers.
// Dependencies: evolvedb-core, rusqlite
// ============================================================================

//! ## Overview
//! Reads build `SELECT ... FROM ... WHERE ... ORDER BY ... LIMIT ...` from
//! structured requests. Field names are checked against the table's columns
//! before any SQL is prepared; values are always bound parameters.
//!
//! Reads never create stores or tables: reading a store file or table that
//! does not exist yields no rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use evolvedb_core::FieldName;
use evolvedb_core::Filter;
use evolvedb_core::ROW_ID_COLUMN;
use evolvedb_core::ReadRequest;
use evolvedb_core::Record;
use evolvedb_core::StoreId;
use evolvedb_core::TableName;
use evolvedb_core::Value;
use rusqlite::Connection;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;

use crate::codec::column_field_names;
use crate::codec::quote_ident;
use crate::codec::row_to_record;
use crate::codec::to_sql;
use crate::schema::ColumnInfo;
use crate::schema::SchemaCache;
use crate::schema::has_column;
use crate::store::SqliteStoreError;
use crate::store::SqliteTableStore;

// ============================================================================
// SECTION: Public Read API
// ============================================================================

impl SqliteTableStore {
    /// Reads rows from `table` according to `request`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Query`] when a projected, filtered, or
    /// ordered field is not a column of the table, or when the query fails.
    pub fn read_records(
        &self,
        store: &StoreId,
        table: &TableName,
        request: &ReadRequest,
    ) -> Result<Vec<Record>, SqliteStoreError> {
        let Some(handle) = self.existing_handle(store)? else {
            return Ok(Vec::new());
        };
        let connection = handle.lock()?;
        let mut snapshot = self.schemas.columns(&connection, store, table)?;
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }
        if referenced_fields(request).any(|field| !has_column(&snapshot, field.as_str())) {
            self.schemas.invalidate(store, table);
            snapshot = self.schemas.columns(&connection, store, table)?;
        }

        let projection = projection(&snapshot, request)?;
        let select_list = if projection.is_empty() {
            quote_ident(ROW_ID_COLUMN)
        } else {
            projection
                .iter()
                .map(|field| quote_ident(field.as_str()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!("SELECT {select_list} FROM {}", quote_ident(table.as_str()));
        let mut params = Vec::new();

        let clauses = filter_clauses(&snapshot, &request.filters, &mut params)?;
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if !request.order_by.is_empty() {
            let mut keys = Vec::with_capacity(request.order_by.len());
            for order in &request.order_by {
                require_column(&snapshot, &order.field)?;
                keys.push(format!(
                    "{} {}",
                    quote_ident(order.field.as_str()),
                    order.direction.sql_keyword()
                ));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }
        if let Some(limit) = request.limit {
            params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }

        let mut statement = connection.prepare(&sql).map_err(query_error)?;
        let mut rows = statement.query(params_from_iter(params)).map_err(query_error)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(query_error)? {
            records.push(row_to_record(row, &projection)?);
        }
        Ok(records)
    }

    /// Returns the newest row of `table` without its row key.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the store cannot be opened or queried.
    pub fn latest(
        &self,
        store: &StoreId,
        table: &TableName,
    ) -> Result<Option<Record>, SqliteStoreError> {
        let Some(handle) = self.existing_handle(store)? else {
            return Ok(None);
        };
        let connection = handle.lock()?;
        Ok(fetch_latest(&connection, &self.schemas, store, table)?.map(|(_, record)| record))
    }

    /// Returns the number of rows in `table`; zero when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the store cannot be opened or queried.
    pub fn count(&self, store: &StoreId, table: &TableName) -> Result<u64, SqliteStoreError> {
        let Some(handle) = self.existing_handle(store)? else {
            return Ok(0);
        };
        let connection = handle.lock()?;
        if self.schemas.columns(&connection, store, table)?.is_empty() {
            return Ok(0);
        }
        count_rows(&connection, table)
    }
}

// ============================================================================
// SECTION: Shared Query Helpers
// ============================================================================

/// Maps a query-time engine error.
#[allow(clippy::needless_pass_by_value, reason = "Used directly with map_err.")]
pub(crate) fn query_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Query(err.to_string())
}

/// Fails unless `field` resolves to a column in `snapshot`.
pub(crate) fn require_column(
    snapshot: &[ColumnInfo],
    field: &FieldName,
) -> Result<(), SqliteStoreError> {
    if has_column(snapshot, field.as_str()) {
        Ok(())
    } else {
        Err(SqliteStoreError::Query(format!("unknown field: {field}")))
    }
}

/// Renders filters as SQL predicates, appending bound values to `params`.
pub(crate) fn filter_clauses(
    snapshot: &[ColumnInfo],
    filters: &[Filter],
    params: &mut Vec<SqlValue>,
) -> Result<Vec<String>, SqliteStoreError> {
    let mut clauses = Vec::with_capacity(filters.len());
    for filter in filters {
        require_column(snapshot, &filter.field)?;
        let column = quote_ident(filter.field.as_str());
        let operator = filter.comparator.sql_operator();
        if filter.comparator.takes_value() {
            params.push(to_sql(&filter.value));
            clauses.push(format!("{column} {operator} ?{}", params.len()));
        } else {
            clauses.push(format!("{column} {operator}"));
        }
    }
    Ok(clauses)
}

/// Returns the row count of an existing table.
pub(crate) fn count_rows(
    connection: &Connection,
    table: &TableName,
) -> Result<u64, SqliteStoreError> {
    let count: i64 = connection
        .query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table.as_str())), [], |row| {
            row.get(0)
        })
        .map_err(query_error)?;
    u64::try_from(count).map_err(|_| SqliteStoreError::Query("negative row count".to_string()))
}

/// Returns the row key and remaining columns of the newest row, if any.
pub(crate) fn fetch_latest(
    connection: &Connection,
    schemas: &SchemaCache,
    store: &StoreId,
    table: &TableName,
) -> Result<Option<(i64, Record)>, SqliteStoreError> {
    let snapshot = schemas.columns(connection, store, table)?;
    if snapshot.is_empty() {
        return Ok(None);
    }
    let names = column_field_names(snapshot.iter().map(|column| column.name.as_str()))?;
    let select_list =
        names.iter().map(|field| quote_ident(field.as_str())).collect::<Vec<_>>().join(", ");
    let sql = format!(
        "SELECT {select_list} FROM {} ORDER BY {} DESC LIMIT 1",
        quote_ident(table.as_str()),
        quote_ident(ROW_ID_COLUMN)
    );
    let mut statement = connection.prepare(&sql).map_err(query_error)?;
    let mut rows = statement.query([]).map_err(query_error)?;
    let Some(row) = rows.next().map_err(query_error)? else {
        return Ok(None);
    };
    let mut record = row_to_record(row, &names)?;
    match record.remove(ROW_ID_COLUMN) {
        Some(Value::Integer(id)) => Ok(Some((id, record))),
        _ => Err(SqliteStoreError::Query(format!("table {table} has no integer row key"))),
    }
}

/// Fields named anywhere in a read request.
fn referenced_fields(request: &ReadRequest) -> impl Iterator<Item = &FieldName> {
    request
        .fields
        .iter()
        .flatten()
        .chain(request.filters.iter().map(|filter| &filter.field))
        .chain(request.order_by.iter().map(|order| &order.field))
}

/// Resolves the projected fields for a request.
fn projection(
    snapshot: &[ColumnInfo],
    request: &ReadRequest,
) -> Result<Vec<FieldName>, SqliteStoreError> {
    let Some(fields) = &request.fields else {
        let names = column_field_names(snapshot.iter().map(|column| column.name.as_str()))?;
        return Ok(names
            .into_iter()
            .filter(|field| request.include_row_id || !field.is_row_id())
            .collect());
    };
    let mut projected = Vec::with_capacity(fields.len() + 1);
    if request.include_row_id {
        projected.push(FieldName::row_id());
    }
    for field in fields {
        require_column(snapshot, field)?;
        if !field.is_row_id() {
            projected.push(field.clone());
        }
    }
    Ok(projected)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
