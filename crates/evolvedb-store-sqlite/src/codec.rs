// crates/evolvedb-store-sqlite/src/codec.rs
// ============================================================================
// Module: SQLite Value Codec
// Description: Conversions between record values and SQLite values.
// Purpose: Keep value mapping and identifier quoting in one place.
// Dependencies: evolvedb-core, rusqlite
// ============================================================================

//! ## Overview
//! Values are always bound as statement parameters. Identifiers are
//! validated upstream and double-quoted here so keywords such as `order`
//! remain usable as field names.

// ============================================================================
// SECTION: Imports
// ============================================================================

use evolvedb_core::FieldName;
use evolvedb_core::Record;
use evolvedb_core::Value;
use rusqlite::Row;
use rusqlite::types::Value as SqlValue;
use rusqlite::types::ValueRef;

use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// Double-quotes an identifier for use in SQL text.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

// ============================================================================
// SECTION: Values
// ============================================================================

/// Converts a record value into an owned `SQLite` value.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(value) => SqlValue::Integer(*value),
        Value::Float(value) => SqlValue::Real(*value),
        Value::Text(value) => SqlValue::Text(value.clone()),
    }
}

/// Converts a borrowed `SQLite` value into a record value.
pub(crate) fn from_sql(value: ValueRef<'_>) -> Result<Value, SqliteStoreError> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(value) => Ok(Value::Integer(value)),
        ValueRef::Real(value) => Ok(Value::Float(value)),
        ValueRef::Text(bytes) => String::from_utf8(bytes.to_vec())
            .map(Value::Text)
            .map_err(|_| SqliteStoreError::Query("text column is not valid utf-8".to_string())),
        ValueRef::Blob(_) => {
            Err(SqliteStoreError::Query("blob columns are not supported".to_string()))
        }
    }
}

/// Reads the first `names.len()` columns of `row` into a record.
pub(crate) fn row_to_record(
    row: &Row<'_>,
    names: &[FieldName],
) -> Result<Record, SqliteStoreError> {
    let mut record = Record::new();
    for (index, name) in names.iter().enumerate() {
        let value = row.get_ref(index).map_err(|err| SqliteStoreError::Query(err.to_string()))?;
        record.insert(name.clone(), from_sql(value)?);
    }
    Ok(record)
}

/// Parses result column names into field names.
pub(crate) fn column_field_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<FieldName>, SqliteStoreError> {
    names
        .into_iter()
        .map(|name| {
            FieldName::parse(name).map_err(|err| {
                SqliteStoreError::Query(format!("column is not a valid field name: {err}"))
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("order"), "\"order\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn blobs_are_rejected() {
        assert!(from_sql(ValueRef::Blob(b"raw")).is_err());
    }

    #[test]
    fn scalars_round_trip_through_sql_values() {
        assert_eq!(to_sql(&Value::Integer(4)), SqlValue::Integer(4));
        assert_eq!(to_sql(&Value::Null), SqlValue::Null);
        assert_eq!(from_sql(ValueRef::Real(1.5)).ok(), Some(Value::Float(1.5)));
    }
}
