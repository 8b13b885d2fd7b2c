//! Retention tests for evolvedb-config.
// crates/evolvedb-config/tests/retention.rs
// =============================================================================
// Module: Retention Tests
// Description: Apply configured retention policies against real stores.
// Purpose: Ensure config-driven archival trims live tables as declared.
// =============================================================================

use evolvedb_config::EvolvedbConfig;
use evolvedb_core::ArchiveReport;
use evolvedb_core::Record;
use evolvedb_core::StoreId;
use evolvedb_core::TableName;
use evolvedb_core::TableStore;
use evolvedb_core::WriteOptions;
use tempfile::TempDir;

type TestResult = Result<(), String>;

fn config_for(dir: &TempDir, keep: u64) -> Result<EvolvedbConfig, String> {
    let live = dir.path().join("live.sqlite");
    let archive = dir.path().join("archive.sqlite");
    let content = format!(
        "[store]\njournal_mode = \"delete\"\n\n[[retention]]\nstore = '{}'\n\
         table = \"interfaces\"\narchive = '{}'\nrecords_to_keep = {keep}\n",
        live.display(),
        archive.display(),
    );
    EvolvedbConfig::from_toml(&content).map_err(|err| err.to_string())
}

#[test]
fn run_retention_applies_each_policy() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let config = config_for(&dir, 2)?;
    let context = config.open_context().map_err(|err| err.to_string())?;

    let live = StoreId::new(dir.path().join("live.sqlite"));
    let table = TableName::parse("interfaces").map_err(|err| err.to_string())?;
    for rx in 1 ..= 5_i64 {
        let record = Record::new().with("rx", rx).map_err(|err| err.to_string())?;
        context
            .write(&live, &table, &record, &WriteOptions::default())
            .map_err(|err| err.to_string())?;
    }

    let reports = config.run_retention(&context).map_err(|err| err.to_string())?;
    if reports != vec![ArchiveReport { moved: 3, skipped: 0, remaining: 2 }] {
        return Err("retention did not move the oldest three rows".to_string());
    }
    let archive = StoreId::new(dir.path().join("archive.sqlite"));
    let archived = context.count(&archive, &table).map_err(|err| err.to_string())?;
    if archived != 3 {
        return Err(format!("expected 3 archived rows, got {archived}"));
    }
    Ok(())
}

#[test]
fn run_retention_without_data_is_a_no_op() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let config = config_for(&dir, 10)?;
    let context = config.open_context().map_err(|err| err.to_string())?;
    let reports = config.run_retention(&context).map_err(|err| err.to_string())?;
    if reports != vec![ArchiveReport::default()] {
        return Err("retention on an empty store reported work".to_string());
    }
    if dir.path().join("archive.sqlite").exists() || dir.path().join("live.sqlite").exists() {
        return Err("no-op retention created a store file".to_string());
    }
    Ok(())
}
