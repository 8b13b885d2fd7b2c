// crates/evolvedb-store-sqlite/src/archive.rs
// ============================================================================
// Module: Archival Engine
// Description: Moves the oldest excess rows into a long-term store.
// Purpose: Bound live table size without losing or duplicating rows.
// Dependencies: evolvedb-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! Archival runs in three steps and never holds two store locks at once:
//! 1. under the source lock, count rows and select the oldest excess rows
//!    (narrowed by the policy's cutoff, filters and predicate);
//! 2. under the archive lock, in one transaction, create or grow the archive
//!    table and `INSERT OR IGNORE` each row keyed by
//!    (`archive_source`, `archive_source_id`);
//! 3. under the source lock, in one transaction, delete the selected ids.
//!
//! A crash between steps 2 and 3 leaves the rows at the source; the retry
//! skips them in the archive through the unique key and deletes them at the
//! source. A key hit only counts as skipped when the archived values equal
//! the candidate's; otherwise the run fails and the source keeps its rows.
//! Columns are reloaded from the engine before selection so every on-disk
//! column reaches the archive. When nothing needs to move the archive store
//! is never opened.

// ============================================================================
// SECTION: Imports
// ============================================================================

use evolvedb_core::ARCHIVE_SOURCE_COLUMN;
use evolvedb_core::ARCHIVE_SOURCE_ID_COLUMN;
use evolvedb_core::ArchivePolicy;
use evolvedb_core::ArchiveReport;
use evolvedb_core::ROW_ID_COLUMN;
use evolvedb_core::Record;
use evolvedb_core::StoreId;
use evolvedb_core::TableName;
use evolvedb_core::Value;
use rusqlite::Connection;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use tracing::info;
use tracing::warn;

use crate::codec::column_field_names;
use crate::codec::quote_ident;
use crate::codec::row_to_record;
use crate::codec::to_sql;
use crate::read::count_rows;
use crate::read::filter_clauses;
use crate::read::query_error;
use crate::read::require_column;
use crate::schema::ColumnInfo;
use crate::schema::ColumnType;
use crate::store::SqliteStoreError;
use crate::store::SqliteTableStore;
use crate::store::db_error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Rows selected for archival plus the source schema they were read with.
struct Candidates {
    /// Source columns at selection time.
    columns: Vec<ColumnInfo>,
    /// Source row key and user columns, oldest first.
    rows: Vec<(i64, Record)>,
    /// Source row count at selection time.
    total: u64,
}

// ============================================================================
// SECTION: Public Archival API
// ============================================================================

impl SqliteTableStore {
    /// Archives the oldest excess rows of `table` from `source` into `archive`.
    ///
    /// # Errors
    ///
    /// See [`SqliteTableStore::archive_with`].
    pub fn archive_records(
        &self,
        source: &StoreId,
        table: &TableName,
        archive: &StoreId,
        policy: &ArchivePolicy,
    ) -> Result<ArchiveReport, SqliteStoreError> {
        self.archive_with(source, table, archive, policy, |_| true)
    }

    /// Archives the oldest excess rows that also satisfy `predicate`.
    ///
    /// Rows rejected by the predicate stay at the source even though they
    /// count toward the excess.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when `source` and `archive` are the
    /// same store, [`SqliteStoreError::Query`] when a cutoff or filter names an
    /// unknown field, and engine errors from either store. A failed insert
    /// step leaves the source untouched.
    pub fn archive_with<P>(
        &self,
        source: &StoreId,
        table: &TableName,
        archive: &StoreId,
        policy: &ArchivePolicy,
        predicate: P,
    ) -> Result<ArchiveReport, SqliteStoreError>
    where
        P: Fn(&Record) -> bool,
    {
        if source == archive {
            return Err(SqliteStoreError::Invalid(
                "archive store must differ from the source store".to_string(),
            ));
        }
        let Some(keep) = policy.records_to_keep else {
            return Ok(ArchiveReport::default());
        };
        let Some(source_handle) = self.existing_handle(source)? else {
            return Ok(ArchiveReport::default());
        };

        let candidates = {
            let connection = source_handle.lock()?;
            self.select_candidates(&connection, source, table, keep, policy, &predicate)?
        };
        let Some(candidates) = candidates else {
            return Ok(ArchiveReport::default());
        };
        if candidates.rows.is_empty() {
            return Ok(ArchiveReport { remaining: candidates.total, ..ArchiveReport::default() });
        }

        let archive_handle = self.handle(archive)?;
        let (moved, skipped) = {
            let mut connection = archive_handle.lock()?;
            let inserted =
                self.insert_into_archive(&mut connection, source, table, archive, &candidates);
            drop(connection);
            if let Err(err) = &inserted {
                self.schemas.invalidate(archive, table);
                warn!(
                    archive = %archive,
                    table = %table,
                    error = %err,
                    "archive insert rolled back"
                );
            }
            inserted?
        };

        let remaining = {
            let mut connection = source_handle.lock()?;
            delete_rows(&mut connection, table, candidates.rows.iter().map(|(id, _)| *id))?
        };

        info!(
            source = %source,
            archive = %archive,
            table = %table,
            moved,
            skipped,
            remaining,
            "archived rows"
        );
        Ok(ArchiveReport { moved, skipped, remaining })
    }

    /// Selects the oldest excess rows; `None` when the table does not exist.
    fn select_candidates<P>(
        &self,
        connection: &Connection,
        source: &StoreId,
        table: &TableName,
        keep: u64,
        policy: &ArchivePolicy,
        predicate: &P,
    ) -> Result<Option<Candidates>, SqliteStoreError>
    where
        P: Fn(&Record) -> bool,
    {
        // Every on-disk column must reach the archive before the source rows go.
        self.schemas.invalidate(source, table);
        let snapshot = self.schemas.columns(connection, source, table)?;
        if snapshot.is_empty() {
            return Ok(None);
        }
        let total = count_rows(connection, table)?;
        let columns = Vec::clone(&snapshot);
        if total <= keep {
            return Ok(Some(Candidates { columns, rows: Vec::new(), total }));
        }

        let table_sql = quote_ident(table.as_str());
        let id_sql = quote_ident(ROW_ID_COLUMN);
        let mut params = vec![SqlValue::Integer(i64::try_from(total - keep).unwrap_or(i64::MAX))];
        let mut clauses = vec![format!(
            "{id_sql} IN (SELECT {id_sql} FROM {table_sql} ORDER BY {id_sql} ASC LIMIT ?1)"
        )];
        if let Some(cutoff) = &policy.before {
            require_column(&columns, &cutoff.field)?;
            params.push(to_sql(&cutoff.value));
            clauses.push(format!("{} < ?{}", quote_ident(cutoff.field.as_str()), params.len()));
        }
        clauses.extend(filter_clauses(&columns, &policy.filters, &mut params)?);

        let names = column_field_names(columns.iter().map(|column| column.name.as_str()))?;
        let select_list =
            names.iter().map(|field| quote_ident(field.as_str())).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT {select_list} FROM {table_sql} WHERE {} ORDER BY {id_sql} ASC",
            clauses.join(" AND ")
        );
        let mut statement = connection.prepare(&sql).map_err(query_error)?;
        let mut result = statement.query(params_from_iter(params)).map_err(query_error)?;
        let mut rows = Vec::new();
        while let Some(row) = result.next().map_err(query_error)? {
            let mut record = row_to_record(row, &names)?;
            let Some(Value::Integer(id)) = record.remove(ROW_ID_COLUMN) else {
                return Err(SqliteStoreError::Query(format!(
                    "table {table} has no integer row key"
                )));
            };
            if predicate(&record) {
                rows.push((id, record));
            }
        }
        Ok(Some(Candidates { columns, rows, total }))
    }

    /// Creates or grows the archive table and inserts every candidate.
    ///
    /// Returns the (moved, skipped) counts.
    fn insert_into_archive(
        &self,
        connection: &mut Connection,
        source: &StoreId,
        table: &TableName,
        archive: &StoreId,
        candidates: &Candidates,
    ) -> Result<(u64, u64), SqliteStoreError> {
        let tx =
            connection.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        self.schemas.ensure_table(&tx, table)?;
        self.schemas.ensure_columns(
            &tx,
            archive,
            table,
            [
                (ARCHIVE_SOURCE_COLUMN, ColumnType::Text),
                (ARCHIVE_SOURCE_ID_COLUMN, ColumnType::Integer),
            ],
        )?;
        self.schemas.ensure_columns(
            &tx,
            archive,
            table,
            candidates
                .columns
                .iter()
                .filter(|column| !column.name.eq_ignore_ascii_case(ROW_ID_COLUMN))
                .map(|column| {
                    (column.name.as_str(), ColumnType::from_declared(&column.declared_type))
                }),
        )?;
        tx.execute_batch(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({}, {});",
            quote_ident(&format!("{table}_archive_key")),
            quote_ident(table.as_str()),
            quote_ident(ARCHIVE_SOURCE_COLUMN),
            quote_ident(ARCHIVE_SOURCE_ID_COLUMN)
        ))
        .map_err(|err| SqliteStoreError::Schema(err.to_string()))?;

        let source_key = source.to_string();
        let mut moved = 0;
        let mut skipped = 0;
        for (id, record) in &candidates.rows {
            let mut columns: Vec<String> =
                record.keys().map(|field| quote_ident(field.as_str())).collect();
            columns.push(quote_ident(ARCHIVE_SOURCE_COLUMN));
            columns.push(quote_ident(ARCHIVE_SOURCE_ID_COLUMN));
            let placeholders: Vec<String> =
                (1 ..= columns.len()).map(|index| format!("?{index}")).collect();
            let sql = format!(
                "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
                quote_ident(table.as_str()),
                columns.join(", "),
                placeholders.join(", ")
            );
            let values = record
                .iter()
                .map(|(_, value)| to_sql(value))
                .chain([SqlValue::Text(source_key.clone()), SqlValue::Integer(*id)]);
            let changed = tx.execute(&sql, params_from_iter(values)).map_err(db_error)?;
            if changed > 0 {
                moved += 1;
                continue;
            }
            if !archived_matches(&tx, table, &source_key, *id, record)? {
                return Err(SqliteStoreError::Invalid(format!(
                    "archive already holds a different row for {source} id {id}; the source \
                     store was recreated"
                )));
            }
            skipped += 1;
        }
        tx.commit().map_err(db_error)?;
        Ok((moved, skipped))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when the archived row keyed by (`source_key`, `id`) holds the
/// same values as `record`.
fn archived_matches(
    connection: &Connection,
    table: &TableName,
    source_key: &str,
    id: i64,
    record: &Record,
) -> Result<bool, SqliteStoreError> {
    if record.is_empty() {
        return Ok(true);
    }
    let names: Vec<_> = record.keys().cloned().collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1 AND {} = ?2",
        names.iter().map(|field| quote_ident(field.as_str())).collect::<Vec<_>>().join(", "),
        quote_ident(table.as_str()),
        quote_ident(ARCHIVE_SOURCE_COLUMN),
        quote_ident(ARCHIVE_SOURCE_ID_COLUMN)
    );
    let mut statement = connection.prepare(&sql).map_err(db_error)?;
    let mut rows = statement.query(params![source_key, id]).map_err(db_error)?;
    let Some(row) = rows.next().map_err(db_error)? else {
        return Ok(false);
    };
    Ok(row_to_record(row, &names)? == *record)
}

/// Deletes `ids` from `table` in one transaction and returns the rows left.
fn delete_rows(
    connection: &mut Connection,
    table: &TableName,
    ids: impl IntoIterator<Item = i64>,
) -> Result<u64, SqliteStoreError> {
    let tx =
        connection.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
    {
        let mut statement = tx
            .prepare(&format!(
                "DELETE FROM {} WHERE {} = ?1",
                quote_ident(table.as_str()),
                quote_ident(ROW_ID_COLUMN)
            ))
            .map_err(db_error)?;
        for id in ids {
            statement.execute(params![id]).map_err(db_error)?;
        }
    }
    let remaining = count_rows(&tx, table)?;
    tx.commit().map_err(db_error)?;
    Ok(remaining)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use evolvedb_core::FieldName;
    use evolvedb_core::Filter;
    use evolvedb_core::ReadRequest;
    use evolvedb_core::WriteOptions;

    use super::*;
    use crate::store::SqliteStoreConfig;

    struct Fixture {
        _temp: tempfile::TempDir,
        store: SqliteTableStore,
        live: StoreId,
        archive: StoreId,
        table: TableName,
    }

    fn fixture(rows: i64) -> Fixture {
        let temp = tempfile::TempDir::new().unwrap();
        let store = SqliteTableStore::new(SqliteStoreConfig::default()).unwrap();
        let live = StoreId::new(temp.path().join("live.sqlite"));
        let archive = StoreId::new(temp.path().join("archive.sqlite"));
        let table = TableName::parse("samples").unwrap();
        for n in 0 .. rows {
            let record = Record::new().with("n", n).unwrap().with("even", n % 2 == 0).unwrap();
            store.write_record(&live, &table, &record, &WriteOptions::default()).unwrap();
        }
        Fixture { _temp: temp, store, live, archive, table }
    }

    fn field(raw: &str) -> FieldName {
        FieldName::parse(raw).unwrap()
    }

    #[test]
    fn same_store_is_rejected() {
        let f = fixture(2);
        let result = f.store.archive_records(&f.live, &f.table, &f.live, &ArchivePolicy::keep(0));
        assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
    }

    #[test]
    fn missing_keep_is_a_no_op() {
        let f = fixture(3);
        let report =
            f.store.archive_records(&f.live, &f.table, &f.archive, &ArchivePolicy::default());
        assert_eq!(report.unwrap(), ArchiveReport::default());
        assert!(!f.archive.as_path().exists());
    }

    #[test]
    fn missing_source_table_is_a_no_op() {
        let f = fixture(1);
        let other = TableName::parse("absent").unwrap();
        let report = f.store.archive_records(&f.live, &other, &f.archive, &ArchivePolicy::keep(0));
        assert_eq!(report.unwrap(), ArchiveReport::default());
        assert!(!f.archive.as_path().exists());
    }

    #[test]
    fn archive_rows_carry_bookkeeping_columns() {
        let f = fixture(3);
        let report = f
            .store
            .archive_records(&f.live, &f.table, &f.archive, &ArchivePolicy::keep(1))
            .unwrap();
        assert_eq!(report, ArchiveReport { moved: 2, skipped: 0, remaining: 1 });
        let columns = f.store.columns(&f.archive, &f.table).unwrap();
        assert_eq!(columns, vec!["id", "archive_source", "archive_source_id", "n", "even"]);
        let request = ReadRequest::default().limit(None).fields(vec![field("archive_source_id")]);
        let rows = f.store.read_records(&f.archive, &f.table, &request).unwrap();
        let ids: Vec<_> = rows.iter().map(|row| row.get("archive_source_id").cloned()).collect();
        assert_eq!(ids, vec![Some(Value::Integer(1)), Some(Value::Integer(2))]);
    }

    #[test]
    fn filters_and_predicate_narrow_candidates() {
        let f = fixture(6);
        let policy = ArchivePolicy::keep(2).filter(Filter::eq(field("even"), 1));
        let report = f
            .store
            .archive_with(&f.live, &f.table, &f.archive, &policy, |record| {
                record.get("n") != Some(&Value::Integer(2))
            })
            .unwrap();
        // Oldest four are n = 0 .. 4; even ones are 0 and 2; the predicate drops 2.
        assert_eq!(report, ArchiveReport { moved: 1, skipped: 0, remaining: 5 });
    }

    #[test]
    fn cutoff_on_unknown_field_is_a_query_error() {
        let f = fixture(3);
        let policy = ArchivePolicy::keep(1).before(field("timestamp"), 10);
        let result = f.store.archive_records(&f.live, &f.table, &f.archive, &policy);
        assert!(matches!(result, Err(SqliteStoreError::Query(_))));
    }
}
