// crates/evolvedb-core/src/interfaces/mod.rs
// ============================================================================
// Module: evolvedb Interfaces
// Description: Backend-agnostic storage interface and error model.
// Purpose: Define the contract surface implemented by storage engines.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! A [`TableStore`] persists records into schema-evolving tables, reads them
//! back through structured requests, and moves old rows into an archive
//! store. Implementations must surface every failure: an empty result always
//! means "no matching rows", never "the query broke".

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::ArchivePolicy;
use crate::core::ArchiveReport;
use crate::core::ReadRequest;
use crate::core::Record;
use crate::core::StoreId;
use crate::core::TableName;
use crate::core::WriteOptions;
use crate::core::WriteReceipt;
use crate::core::identifiers::IdentifierError;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Storage errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - A detected counter reset is not an error; it is reported on [`WriteReceipt`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Schema change failed (DDL failure, invalid identifier).
    #[error("schema fault: {0}")]
    Schema(String),
    /// Query construction or execution failed.
    #[error("query fault: {0}")]
    Query(String),
    /// Store handle, I/O, or transaction failure.
    #[error("storage fault: {0}")]
    Storage(String),
    /// Caller input cannot be applied.
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl From<IdentifierError> for StoreError {
    fn from(error: IdentifierError) -> Self {
        Self::Schema(error.to_string())
    }
}

// ============================================================================
// SECTION: Table Store
// ============================================================================

/// Schema-on-write table storage.
pub trait TableStore {
    /// Appends `record` to `table`, evolving the schema and normalizing
    /// cumulative counters as requested by `options`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any step fails; nothing is persisted in that case.
    fn write(
        &self,
        store: &StoreId,
        table: &TableName,
        record: &Record,
        options: &WriteOptions,
    ) -> Result<WriteReceipt, StoreError>;

    /// Reads rows from `table`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the request references unknown fields or
    /// the query fails.
    fn read(
        &self,
        store: &StoreId,
        table: &TableName,
        request: &ReadRequest,
    ) -> Result<Vec<Record>, StoreError>;

    /// Moves the oldest rows beyond the retention threshold into `archive`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when either store fails; each store is left
    /// internally consistent and the call may be retried.
    fn archive(
        &self,
        source: &StoreId,
        table: &TableName,
        archive: &StoreId,
        policy: &ArchivePolicy,
    ) -> Result<ArchiveReport, StoreError>;

    /// Returns the current column names of `table`, row key included.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the schema cannot be inspected.
    fn table_columns(&self, store: &StoreId, table: &TableName)
    -> Result<Vec<String>, StoreError>;
}
