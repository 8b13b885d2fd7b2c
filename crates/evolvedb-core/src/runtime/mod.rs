// crates/evolvedb-core/src/runtime/mod.rs
// ============================================================================
// Module: evolvedb Runtime
// Description: Storage-independent write-time computations.
// Purpose: Group pure helpers invoked by storage engines during writes.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Runtime helpers are pure functions over records; storage engines supply
//! the persisted state and apply the results inside their own transactions.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod counter;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use counter::Normalized;
pub use counter::normalize;
