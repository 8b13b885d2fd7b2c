// crates/evolvedb-core/src/lib.rs
// ============================================================================
// Module: evolvedb Core Library
// Description: Public API surface for the evolvedb core.
// Purpose: Expose record types, query types, interfaces, and the counter normalizer.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! evolvedb core defines the backend-agnostic model for schema-on-write
//! ingestion: validated identifiers, tagged scalar values, insertion-ordered
//! records, structured filters, and the cumulative counter normalizer.
//! Storage engines integrate through the [`TableStore`] interface.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::StoreError;
pub use interfaces::TableStore;
pub use runtime::Normalized;
pub use runtime::normalize;
