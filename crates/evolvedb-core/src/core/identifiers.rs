// crates/evolvedb-core/src/core/identifiers.rs
// ============================================================================
// Module: evolvedb Identifiers
// Description: Validated identifiers for stores, tables, and fields.
// Purpose: Guarantee that names reaching SQL text are plain identifiers.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Table and field names are spliced into DDL and DML statements, so they are
//! validated once at construction: an ASCII letter or underscore, followed by
//! ASCII alphanumerics or underscores, at most [`MAX_IDENTIFIER_LENGTH`]
//! bytes. Comparison between identifiers is ASCII case-insensitive, matching
//! how `SQLite` resolves column names.
//!
//! Store identifiers are opaque file paths resolved by the storage backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum identifier length in bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;
/// Name of the auto-incrementing row key column present in every table.
pub const ROW_ID_COLUMN: &str = "id";
/// Suffix appended to a table name to form its companion offsets table.
pub const OFFSETS_TABLE_SUFFIX: &str = "offsets";
/// Archive bookkeeping column holding the source store identifier.
pub const ARCHIVE_SOURCE_COLUMN: &str = "archive_source";
/// Archive bookkeeping column holding the row key at the source.
pub const ARCHIVE_SOURCE_ID_COLUMN: &str = "archive_source_id";
/// Field names callers may not write; they are owned by the storage layer.
pub const RESERVED_FIELDS: &[&str] =
    &[ROW_ID_COLUMN, ARCHIVE_SOURCE_COLUMN, ARCHIVE_SOURCE_ID_COLUMN];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Identifier was empty.
    #[error("identifier must be non-empty")]
    Empty,
    /// Identifier exceeded [`MAX_IDENTIFIER_LENGTH`].
    #[error("identifier exceeds {MAX_IDENTIFIER_LENGTH} bytes: {0}")]
    TooLong(String),
    /// Identifier contained a character outside `[A-Za-z0-9_]` or began with a digit.
    #[error("identifier contains invalid characters: {0}")]
    InvalidCharacter(String),
}

/// Validates a raw identifier string.
fn validate_identifier(raw: &str) -> Result<(), IdentifierError> {
    let mut chars = raw.chars();
    let Some(first) = chars.next() else {
        return Err(IdentifierError::Empty);
    };
    if raw.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierError::TooLong(raw.to_string()));
    }
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(IdentifierError::InvalidCharacter(raw.to_string()));
    }
    if !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(IdentifierError::InvalidCharacter(raw.to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Field (column) name within a table.
///
/// # Invariants
/// - Matches `[A-Za-z_][A-Za-z0-9_]*` and is at most [`MAX_IDENTIFIER_LENGTH`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldName(String);

impl FieldName {
    /// Parses and validates a field name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the name is not a plain identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdentifierError> {
        let raw = raw.into();
        validate_identifier(&raw)?;
        Ok(Self(raw))
    }

    /// Returns the row key column name.
    #[must_use]
    pub fn row_id() -> Self {
        Self(ROW_ID_COLUMN.to_string())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when both names resolve to the same column.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }

    /// Returns true when this is the row key column.
    #[must_use]
    pub fn is_row_id(&self) -> bool {
        self.matches(ROW_ID_COLUMN)
    }

    /// Returns true when the name is reserved for the storage layer.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        RESERVED_FIELDS.iter().any(|reserved| self.matches(reserved))
    }
}

impl TryFrom<String> for FieldName {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for FieldName {
    type Error = IdentifierError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<FieldName> for String {
    fn from(value: FieldName) -> Self {
        value.0
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Table name within a store.
///
/// # Invariants
/// - Matches `[A-Za-z_][A-Za-z0-9_]*`.
/// - Leaves room for [`OFFSETS_TABLE_SUFFIX`] within [`MAX_IDENTIFIER_LENGTH`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    /// Parses and validates a table name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the name is not a plain identifier or
    /// leaves no room for the offsets suffix.
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdentifierError> {
        let raw = raw.into();
        validate_identifier(&raw)?;
        if raw.len() + OFFSETS_TABLE_SUFFIX.len() > MAX_IDENTIFIER_LENGTH {
            return Err(IdentifierError::TooLong(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the companion table holding counter offsets.
    #[must_use]
    pub fn offsets_table(&self) -> Self {
        Self(format!("{}{OFFSETS_TABLE_SUFFIX}", self.0))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TableName {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for TableName {
    type Error = IdentifierError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Store identifier, resolved by the backend (a database file path for `SQLite`).
///
/// # Invariants
/// - Opaque; no normalization is applied, so two spellings of one file are two identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(PathBuf);

impl StoreId {
    /// Creates a store identifier from a path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Returns the identifier as a path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn field_name_accepts_plain_identifiers() {
        for raw in ["temperature", "_private", "rx_bytes2", "A"] {
            assert!(FieldName::parse(raw).is_ok(), "{raw} should be valid");
        }
    }

    #[test]
    fn field_name_rejects_sql_fragments() {
        for raw in ["", "1st", "name; DROP TABLE x", "a-b", "na me", "naïve"] {
            assert!(FieldName::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn field_name_rejects_overlong_names() {
        let raw = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert_eq!(FieldName::parse(raw.clone()), Err(IdentifierError::TooLong(raw)));
    }

    #[test]
    fn reserved_fields_match_case_insensitively() {
        assert!(FieldName::parse("ID").unwrap().is_reserved());
        assert!(FieldName::parse("Archive_Source_Id").unwrap().is_reserved());
        assert!(!FieldName::parse("identity").unwrap().is_reserved());
    }

    #[test]
    fn table_name_reserves_room_for_offsets_suffix() {
        let fits = "t".repeat(MAX_IDENTIFIER_LENGTH - OFFSETS_TABLE_SUFFIX.len());
        assert!(TableName::parse(fits).is_ok());
        let too_long = "t".repeat(MAX_IDENTIFIER_LENGTH - OFFSETS_TABLE_SUFFIX.len() + 1);
        assert!(TableName::parse(too_long).is_err());
    }

    #[test]
    fn offsets_table_appends_suffix() {
        let table = TableName::parse("interfaces").unwrap();
        assert_eq!(table.offsets_table().as_str(), "interfacesoffsets");
    }
}
