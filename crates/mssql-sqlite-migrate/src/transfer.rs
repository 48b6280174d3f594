//! Row transfer between engines.
//!
//! Transfer is table-at-a-time and strictly sequential: read every row from
//! the source, coerce per destination column, write. Row-by-row mode trades
//! speed for resilience (a bad row is skipped and counted); batch mode is
//! all-or-nothing per table.

use crate::coerce;
use crate::config::InsertMode;
use crate::error::{Result, SqlErrorKind};
use crate::mssql::MssqlEngine;
use crate::schema::{Column, Introspect};
use crate::sqlite::SqliteEngine;
use crate::value::SqlValue;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Per-table transfer accounting.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub table: String,
    pub rows_read: u64,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
}

impl TransferOutcome {
    fn empty(table: &str) -> Self {
        Self {
            table: table.to_string(),
            rows_read: 0,
            rows_inserted: 0,
            rows_skipped: 0,
        }
    }
}

/// Result of one server-bound table transfer. A `Deferred` table hit a
/// missing-dependency rejection (its referenced table has no data yet) and
/// should be retried after the other tables.
#[derive(Debug)]
pub enum TableTransfer {
    Done(TransferOutcome),
    Deferred,
}

/// Copy one table's rows from SQL Server into SQLite.
pub async fn server_to_embedded(
    source: &mut MssqlEngine,
    dest: &mut SqliteEngine,
    table: &str,
    mode: InsertMode,
    skip_primary_key: bool,
) -> Result<TransferOutcome> {
    // A data-only run may target a destination missing some tables; that
    // skips the table, it does not abort the clone.
    if !dest.table_exists(table).await? {
        warn!("Destination table {} does not exist, skipping its data", table);
        return Ok(TransferOutcome::empty(table));
    }

    let mut columns = source.columns(table).await?;
    if skip_primary_key {
        if let Some(pk) = source.primary_key(table).await? {
            columns.retain(|c| c.name != pk);
        }
    }
    if columns.is_empty() {
        return Ok(TransferOutcome::empty(table));
    }

    let rows = source.select_all(table, &columns).await?;
    let names = columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>();

    write_rows_embedded(dest, table, &names, rows, mode)
}

/// Write rows into a SQLite table. Synchronous: rusqlite completes inline.
///
/// Values pass through [`coerce::for_sqlite`] (timestamps to day counts,
/// decimals to text). In row-by-row mode an integrity rejection skips that
/// row; in batch mode any rejection rolls the whole table back.
pub fn write_rows_embedded(
    dest: &SqliteEngine,
    table: &str,
    columns: &[String],
    rows: Vec<Vec<SqlValue>>,
    mode: InsertMode,
) -> Result<TransferOutcome> {
    let mut outcome = TransferOutcome::empty(table);
    outcome.rows_read = rows.len() as u64;

    let coerced: Vec<Vec<SqlValue>> = rows
        .into_iter()
        .map(|row| row.into_iter().map(coerce::for_sqlite).collect())
        .collect();

    match mode {
        InsertMode::Batch => match dest.insert_batch(table, columns, &coerced) {
            Ok(n) => outcome.rows_inserted = n,
            Err(e) => match e.kind() {
                SqlErrorKind::MalformedDefinition | SqlErrorKind::TransactionDesync => {
                    return Err(e)
                }
                // The batch rolled back whole; the table failed, not the run.
                _ => {
                    warn!("Batch insert into {} failed, no rows kept: {}", table, e);
                    outcome.rows_skipped = outcome.rows_read;
                }
            },
        },
        InsertMode::RowByRow => {
            for row in &coerced {
                match dest.insert_row(table, columns, row) {
                    Ok(n) => outcome.rows_inserted += n,
                    Err(e) => match e.kind() {
                        SqlErrorKind::MissingDependency => {
                            warn!("Table {} missing at destination: {}", table, e);
                            outcome.rows_skipped =
                                outcome.rows_read - outcome.rows_inserted;
                            break;
                        }
                        SqlErrorKind::MalformedDefinition
                        | SqlErrorKind::TransactionDesync => return Err(e),
                        _ => {
                            warn!("Skipping row in {}: {}", table, e);
                            outcome.rows_skipped += 1;
                        }
                    },
                }
            }
        }
    }

    info!(
        "Transferred {}: {} read, {} inserted, {} skipped",
        table, outcome.rows_read, outcome.rows_inserted, outcome.rows_skipped
    );
    Ok(outcome)
}

/// Copy one table's rows from SQLite into SQL Server.
///
/// The destination's declared column types drive value decoding, so the
/// destination table must already exist with matching column names.
pub async fn embedded_to_server(
    source: &mut SqliteEngine,
    dest: &mut MssqlEngine,
    table: &str,
    mode: InsertMode,
    skip_primary_key: bool,
) -> Result<TableTransfer> {
    let mut src_columns = source.columns(table).await?;
    let pk = source.primary_key(table).await?;
    if skip_primary_key {
        if let Some(pk) = &pk {
            src_columns.retain(|c| &c.name != pk);
        }
    }
    if src_columns.is_empty() {
        return Ok(TableTransfer::Done(TransferOutcome::empty(table)));
    }

    let dest_columns = dest.columns(table).await?;
    let mut aligned = Vec::with_capacity(src_columns.len());
    for src in &src_columns {
        let found = dest_columns
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(&src.name))
            .cloned()
            .ok_or_else(|| {
                crate::error::MigrateError::introspection(
                    table,
                    format!("destination is missing column {}", src.name),
                )
            })?;
        aligned.push(found);
    }

    let rows = source.select_all(table, &src_columns)?;

    // Explicit key values need the identity-insert override for the whole
    // write; without keys it is enabled lazily if the server asks for it.
    let write_keys = !skip_primary_key && pk.is_some();
    write_rows_server(dest, table, &aligned, rows, mode, write_keys).await
}

/// Write rows into an SQL Server table, bracketed by the identity-insert
/// override when explicit key values are carried.
pub async fn write_rows_server(
    dest: &mut MssqlEngine,
    table: &str,
    dest_columns: &[Column],
    rows: Vec<Vec<SqlValue>>,
    mode: InsertMode,
    write_keys: bool,
) -> Result<TableTransfer> {
    let mut identity_on = false;
    if write_keys {
        // Fails on tables without an identity column; the lazy path below
        // still covers those.
        match dest.set_identity_insert(table, true).await {
            Ok(()) => identity_on = true,
            Err(e) => debug!("identity insert not enabled for {}: {}", table, e),
        }
    }

    let result = write_rows_server_inner(dest, table, dest_columns, rows, mode, &mut identity_on)
        .await;

    if identity_on {
        // Always restore; the override is per-session and tables fight over it.
        if let Err(e) = dest.set_identity_insert(table, false).await {
            warn!("could not disable identity insert for {}: {}", table, e);
        }
    }

    result
}

async fn write_rows_server_inner(
    dest: &mut MssqlEngine,
    table: &str,
    dest_columns: &[Column],
    rows: Vec<Vec<SqlValue>>,
    mode: InsertMode,
    identity_on: &mut bool,
) -> Result<TableTransfer> {
    let mut outcome = TransferOutcome::empty(table);
    outcome.rows_read = rows.len() as u64;

    let names = dest_columns
        .iter()
        .map(|c| c.name.clone())
        .collect::<Vec<_>>();

    // Decode per destination column; a value that cannot be decoded skips
    // its row rather than aborting the table.
    let mut coerced = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(row.len());
        let mut ok = true;
        for (value, column) in row.into_iter().zip(dest_columns) {
            match coerce::for_mssql(value, column) {
                Ok(v) => values.push(v),
                Err(e) => {
                    warn!("Skipping row in {}: {}", table, e);
                    outcome.rows_skipped += 1;
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            coerced.push(values);
        }
    }

    match mode {
        InsertMode::Batch => match dest.insert_batch(table, &names, &coerced).await {
            Ok(n) => outcome.rows_inserted = n,
            Err(e) => match e.kind() {
                SqlErrorKind::MissingDependency => return Ok(TableTransfer::Deferred),
                SqlErrorKind::IdentityInsertRequired if !*identity_on => {
                    dest.set_identity_insert(table, true).await?;
                    *identity_on = true;
                    outcome.rows_inserted = dest.insert_batch(table, &names, &coerced).await?;
                }
                SqlErrorKind::IntegrityViolation => {
                    // The batch rolled back whole; the table failed, not the run.
                    warn!("Batch insert into {} failed, no rows kept: {}", table, e);
                    outcome.rows_skipped = outcome.rows_read;
                }
                _ => return Err(e),
            },
        },
        InsertMode::RowByRow => {
            for row in &coerced {
                match dest.insert_row(table, &names, row).await {
                    Ok(n) => outcome.rows_inserted += n,
                    Err(e) => match e.kind() {
                        SqlErrorKind::IntegrityViolation => {
                            warn!("Skipping row in {}: {}", table, e);
                            outcome.rows_skipped += 1;
                        }
                        SqlErrorKind::MissingDependency => return Ok(TableTransfer::Deferred),
                        SqlErrorKind::IdentityInsertRequired if !*identity_on => {
                            dest.set_identity_insert(table, true).await?;
                            *identity_on = true;
                            outcome.rows_inserted += dest.insert_row(table, &names, row).await?;
                        }
                        _ => return Err(e),
                    },
                }
            }
        }
    }

    info!(
        "Transferred {}: {} read, {} inserted, {} skipped",
        table, outcome.rows_read, outcome.rows_inserted, outcome.rows_skipped
    );
    Ok(TableTransfer::Done(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DdlExecutor;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn plain_column(name: &str) -> Column {
        Column {
            table: "T".into(),
            name: name.into(),
            ordinal: 0,
            is_nullable: true,
            data_type: "TEXT".into(),
            max_length: None,
            datetime_precision: None,
            is_primary_key: false,
            default_value: None,
        }
    }

    #[tokio::test]
    async fn test_row_by_row_skips_constraint_violations() {
        let mut dest = SqliteEngine::open_in_memory().unwrap();
        dest.execute_ddl("CREATE TABLE \"Author\" (\"Name\" TEXT NOT NULL, \"Born\" REAL)")
            .await
            .unwrap();

        let columns = vec!["Name".to_string(), "Born".to_string()];
        let dt = NaiveDate::from_ymd_opt(1975, 7, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rows = vec![
            vec![SqlValue::Text("O'Brien".into()), SqlValue::DateTime(dt)],
            vec![SqlValue::Null, SqlValue::Null], // violates NOT NULL
            vec![SqlValue::Text("Le Guin".into()), SqlValue::Null],
        ];

        let outcome =
            write_rows_embedded(&dest, "Author", &columns, rows, InsertMode::RowByRow).unwrap();
        assert_eq!(outcome.rows_read, 3);
        assert_eq!(outcome.rows_inserted, 2);
        assert_eq!(outcome.rows_skipped, 1);

        // The embedded quote survives parameter binding untouched.
        let mut name = plain_column("Name");
        name.table = "Author".into();
        let stored = dest.select_all("Author", &[name]).unwrap();
        assert_eq!(stored[0][0], SqlValue::Text("O'Brien".into()));
    }

    #[tokio::test]
    async fn test_batch_mode_is_all_or_nothing() {
        let mut dest = SqliteEngine::open_in_memory().unwrap();
        dest.execute_ddl("CREATE TABLE \"T\" (\"x\" INTEGER NOT NULL)")
            .await
            .unwrap();

        let columns = vec!["x".to_string()];
        let rows = vec![
            vec![SqlValue::I64(1)],
            vec![SqlValue::Null], // violates NOT NULL, poisons the batch
            vec![SqlValue::I64(3)],
        ];

        // The whole batch rolls back; the table is reported failed but the
        // clone goes on.
        let outcome =
            write_rows_embedded(&dest, "T", &columns, rows, InsertMode::Batch).unwrap();
        assert_eq!(outcome.rows_read, 3);
        assert_eq!(outcome.rows_inserted, 0);
        assert_eq!(outcome.rows_skipped, 3);

        assert!(dest.select_all("T", &[plain_column("x")]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_destination_table_skips_not_aborts() {
        let dest = SqliteEngine::open_in_memory().unwrap();

        let columns = vec!["x".to_string()];
        let rows = vec![vec![SqlValue::I64(1)], vec![SqlValue::I64(2)]];

        let outcome =
            write_rows_embedded(&dest, "Orders", &columns, rows, InsertMode::RowByRow).unwrap();
        assert_eq!(outcome.rows_read, 2);
        assert_eq!(outcome.rows_inserted, 0);
        assert_eq!(outcome.rows_skipped, 2);

        let batch_rows = vec![vec![SqlValue::I64(3)]];
        let outcome =
            write_rows_embedded(&dest, "Orders", &columns, batch_rows, InsertMode::Batch).unwrap();
        assert_eq!(outcome.rows_inserted, 0);
        assert_eq!(outcome.rows_skipped, 1);
    }

    #[tokio::test]
    async fn test_values_are_coerced_for_storage() {
        let mut dest = SqliteEngine::open_in_memory().unwrap();
        dest.execute_ddl("CREATE TABLE \"T\" (\"When\" REAL, \"Amount\" TEXT)")
            .await
            .unwrap();

        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let amount: Decimal = "19.99".parse().unwrap();
        let columns = vec!["When".to_string(), "Amount".to_string()];
        let rows = vec![vec![SqlValue::DateTime(dt), SqlValue::Decimal(amount)]];

        let outcome =
            write_rows_embedded(&dest, "T", &columns, rows, InsertMode::RowByRow).unwrap();
        assert_eq!(outcome.rows_inserted, 1);

        let cols = vec![plain_column("When"), plain_column("Amount")];
        let stored = dest.select_all("T", &cols).unwrap();
        match &stored[0][0] {
            SqlValue::F64(day_count) => {
                assert_eq!(crate::coerce::from_day_count(*day_count), Some(dt));
            }
            other => panic!("expected day count, got {:?}", other),
        }
        assert_eq!(stored[0][1], SqlValue::Text("19.99".into()));
    }
}
