// crates/evolvedb-store-sqlite/src/lib.rs
// ============================================================================
// Module: evolvedb SQLite Store Library
// Description: SQLite backend for the schema-evolving table store.
// Purpose: Persist, read, and archive records in SQLite store files.
// Dependencies: evolvedb-core, rusqlite, serde, thiserror, time, tracing
// ============================================================================

//! ## Overview
//! [`SqliteTableStore`] implements [`evolvedb_core::TableStore`] over one
//! `SQLite` file per store identifier.
//! Invariants:
//! - Table columns only ever grow; every field ever written has a column.
//! - A write is atomic: schema changes, offsets, and the row commit together.
//! - Archival never loses or duplicates a row, even when interrupted.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod archive;
mod codec;
mod read;
mod schema;
pub mod store;
mod write;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use schema::ColumnInfo;
pub use schema::ColumnType;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::SqliteTableStore;
