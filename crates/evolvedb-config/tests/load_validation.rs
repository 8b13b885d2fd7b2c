//! Config load validation tests for evolvedb-config.
// crates/evolvedb-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;

use evolvedb_config::ConfigError;
use evolvedb_config::EvolvedbConfig;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<EvolvedbConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn write_config(content: &[u8]) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content).map_err(|err| err.to_string())?;
    Ok(file)
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(
        EvolvedbConfig::load(Some(Path::new(&long_path))),
        "config path exceeds max length",
    )
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        EvolvedbConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_missing_file() -> TestResult {
    let dir = tempfile::TempDir::new().map_err(|err| err.to_string())?;
    assert_invalid(EvolvedbConfig::load(Some(&dir.path().join("absent.toml"))), "config io error")
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let file = write_config(&vec![b'a'; 1_048_577])?;
    assert_invalid(EvolvedbConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let file = write_config(&[0xFF, 0xFE, 0xFF])?;
    assert_invalid(EvolvedbConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_rejects_zero_busy_timeout() -> TestResult {
    let file = write_config(b"[store]\nbusy_timeout_ms = 0\n")?;
    assert_invalid(
        EvolvedbConfig::load(Some(file.path())),
        "busy_timeout_ms must be greater than zero",
    )
}

#[test]
fn load_accepts_full_config() -> TestResult {
    let file = write_config(
        br#"
[store]
busy_timeout_ms = 1000
journal_mode = "wal"
sync_mode = "normal"

[[retention]]
store = "data/live.sqlite"
table = "interfaces"
archive = "data/archive.sqlite"
records_to_keep = 10000
"#,
    )?;
    let config = EvolvedbConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.retention.len() != 1 {
        return Err(format!("expected one retention policy, got {}", config.retention.len()));
    }
    if config.retention[0].table.as_str() != "interfaces" {
        return Err("retention table was not parsed".to_string());
    }
    if config.store.busy_timeout_ms != 1000 {
        return Err("busy timeout was not parsed".to_string());
    }
    Ok(())
}
