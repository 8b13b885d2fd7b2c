// crates/evolvedb-core/src/core/mod.rs
// ============================================================================
// Module: evolvedb Core Types
// Description: Identifiers, values, records, and request/receipt types.
// Purpose: Group the data model shared by every storage backend.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Core types carry no storage behavior. Identifiers are validated at
//! construction so backends can splice them into statements verbatim.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod identifiers;
pub mod query;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::ARCHIVE_SOURCE_COLUMN;
pub use identifiers::ARCHIVE_SOURCE_ID_COLUMN;
pub use identifiers::FieldName;
pub use identifiers::IdentifierError;
pub use identifiers::MAX_IDENTIFIER_LENGTH;
pub use identifiers::OFFSETS_TABLE_SUFFIX;
pub use identifiers::RESERVED_FIELDS;
pub use identifiers::ROW_ID_COLUMN;
pub use identifiers::StoreId;
pub use identifiers::TableName;
pub use query::ArchivePolicy;
pub use query::ArchiveReport;
pub use query::Comparator;
pub use query::Cutoff;
pub use query::Filter;
pub use query::OrderBy;
pub use query::ReadRequest;
pub use query::SortDirection;
pub use query::WriteOptions;
pub use query::WriteReceipt;
pub use value::Record;
pub use value::Value;
