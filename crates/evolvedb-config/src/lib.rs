// crates/evolvedb-config/src/lib.rs
// ============================================================================
// Module: evolvedb Config Library
// Description: Configuration model for store contexts and retention.
// Purpose: Load evolvedb settings from TOML with fail-closed validation.
// Dependencies: evolvedb-core, evolvedb-store-sqlite, serde, toml, tracing
// ============================================================================

//! ## Overview
//! [`EvolvedbConfig`] carries the `SQLite` connection settings and the list
//! of retention policies. [`EvolvedbConfig::open_context`] builds the store
//! context and [`EvolvedbConfig::run_retention`] applies every policy.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::DEFAULT_CONFIG_NAME;
pub use config::EvolvedbConfig;
pub use config::MAX_CONFIG_FILE_SIZE;
pub use config::RetentionPolicy;
