//! SQLite engine adapter: file handling, pragma-based introspection,
//! DDL/DML execution, and driver-error classification.
//!
//! rusqlite is synchronous; every call here completes inline on the
//! current thread, which matches the strictly sequential clone flow.

use crate::error::{MigrateError, Result, SqlErrorKind};
use crate::ident::quote_sqlite;
use crate::resolver::DdlExecutor;
use crate::schema::{Column, ForeignKey, Introspect};
use crate::value::SqlValue;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::{debug, info};

/// A single SQLite database handle.
pub struct SqliteEngine {
    conn: Connection,
}

impl SqliteEngine {
    /// Open a database file, creating it when absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(&path)?;
        info!("Opened SQLite database {}", path.as_ref().display());
        Ok(Self { conn })
    }

    /// Open a database file that must already exist. Used when SQLite is
    /// the clone source, where silently creating an empty file would turn
    /// a bad path into an empty clone.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI,
        )?;
        info!("Opened SQLite database {}", path.as_ref().display());
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Close the handle, surfacing any deferred I/O error.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| MigrateError::Sqlite(e))
    }

    /// The stored `CREATE TABLE` statement for a table, verbatim from
    /// `sqlite_master`.
    pub fn create_table_sql(&self, table: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
        let mut rows = stmt.query([table])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(None),
        }
    }

    /// Read all rows of a table as a column-ordered projection.
    pub fn select_all(&self, table: &str, columns: &[Column]) -> Result<Vec<Vec<SqlValue>>> {
        let projection = columns
            .iter()
            .map(|c| quote_sqlite(&c.name))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let sql = format!("SELECT {} FROM {}", projection, quote_sqlite(table)?);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(convert_value_ref(row.get_ref(idx)?));
            }
            result.push(values);
        }

        debug!("Read {} rows from {}", result.len(), table);
        Ok(result)
    }

    /// Insert one row with bound parameters.
    pub fn insert_row(&self, table: &str, columns: &[String], values: &[SqlValue]) -> Result<u64> {
        let column_list = columns
            .iter()
            .map(|c| quote_sqlite(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let placeholders = (1..=values.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_sqlite(table)?,
            column_list,
            placeholders
        );

        let params = values
            .iter()
            .cloned()
            .map(rusqlite::types::Value::from)
            .collect::<Vec<_>>();
        let changed = self
            .conn
            .execute(&sql, rusqlite::params_from_iter(params))?;
        Ok(changed as u64)
    }

    /// Insert all rows of a table inside one transaction. Any failure rolls
    /// the whole batch back; no rows are inserted.
    pub fn insert_batch(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let column_list = columns
            .iter()
            .map(|c| quote_sqlite(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_sqlite(table)?,
            column_list,
            placeholders
        );

        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                let params = row
                    .iter()
                    .cloned()
                    .map(rusqlite::types::Value::from)
                    .collect::<Vec<_>>();
                inserted += stmt.execute(rusqlite::params_from_iter(params))? as u64;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

#[async_trait]
impl Introspect for SqliteEngine {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
                 ORDER BY name",
            )
            .map_err(|e| MigrateError::introspection("sqlite_master", e.to_string()))?;

        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| MigrateError::introspection("sqlite_master", e.to_string()))?;

        Ok(names)
    }

    async fn columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT cid, name, type, \"notnull\", dflt_value, pk \
                 FROM pragma_table_info(?1) ORDER BY cid",
            )
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?;

        let mut rows = stmt
            .query([table])
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?;

        let mut columns = Vec::new();
        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(MigrateError::introspection(table, e.to_string())),
            };

            let read = |idx: usize| {
                row.get_ref(idx)
                    .map_err(|e| MigrateError::introspection(table, e.to_string()))
            };

            let cid: i64 = match read(0)? {
                ValueRef::Integer(i) => i,
                _ => 0,
            };
            let name = match read(1)? {
                ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
                _ => String::new(),
            };
            let data_type = match read(2)? {
                ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
                _ => String::new(),
            };
            let not_null = matches!(read(3)?, ValueRef::Integer(i) if i != 0);
            // Default expressions keep their stored literal form.
            let default_value = match read(4)? {
                ValueRef::Null => None,
                ValueRef::Integer(i) => Some(i.to_string()),
                ValueRef::Real(f) => Some(f.to_string()),
                ValueRef::Text(t) => Some(String::from_utf8_lossy(t).to_string()),
                ValueRef::Blob(_) => None,
            };
            let pk = matches!(read(5)?, ValueRef::Integer(i) if i != 0);

            columns.push(Column {
                table: table.to_string(),
                name,
                ordinal: cid as i32 + 1,
                is_nullable: !not_null,
                data_type,
                max_length: None,
                datetime_precision: None,
                is_primary_key: pk,
                default_value,
            });
        }

        debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn primary_key(&mut self, table: &str) -> Result<Option<String>> {
        let columns = self.columns(table).await?;
        Ok(columns
            .into_iter()
            .find(|c| c.is_primary_key)
            .map(|c| c.name))
    }

    async fn foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKey>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, seq, \"table\", \"from\", \"to\", \
                 on_update, on_delete, \"match\" \
                 FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
            )
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?;

        let owner = table.to_string();
        let fks = stmt
            .query_map([table], move |row| {
                let column: String = row.get(3)?;
                Ok(ForeignKey {
                    id: row.get(0)?,
                    seq: row.get(1)?,
                    table: owner.clone(),
                    ref_table: row.get(2)?,
                    // SQLite has no stored constraint names; synthesize a
                    // stable one for the server-side ALTER TABLE script.
                    constraint_name: format!("FK_{}_{}", owner, column),
                    column,
                    ref_column: row.get(4)?,
                    on_update: row.get(5)?,
                    on_delete: row.get(6)?,
                    match_clause: row.get(7)?,
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?;

        debug!("Loaded {} foreign keys for {}", fks.len(), table);
        Ok(fks)
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?;
        Ok(count > 0)
    }
}

#[async_trait]
impl DdlExecutor for SqliteEngine {
    async fn execute_ddl(&mut self, script: &str) -> Result<()> {
        self.conn.execute_batch(script)?;
        Ok(())
    }
}

/// Translate a rusqlite error into an engine-agnostic kind.
///
/// SQLite reports most DDL-time problems through its message text rather
/// than distinct codes, so this matches on both.
pub fn classify(error: &rusqlite::Error) -> SqlErrorKind {
    if let rusqlite::Error::SqliteFailure(ffi_error, _) = error {
        if ffi_error.code == rusqlite::ErrorCode::ConstraintViolation {
            return SqlErrorKind::IntegrityViolation;
        }
    }

    let message = error.to_string().to_lowercase();
    if message.contains("no such table") {
        SqlErrorKind::MissingDependency
    } else if message.contains("already exists") {
        SqlErrorKind::DuplicateObject
    } else if message.contains("syntax error") || message.contains("incomplete input") {
        SqlErrorKind::MalformedDefinition
    } else if message.contains("cannot commit") || message.contains("no transaction is active") {
        SqlErrorKind::TransactionDesync
    } else {
        SqlErrorKind::Other
    }
}

/// Convert one stored cell to a [`SqlValue`].
fn convert_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::I64(i),
        ValueRef::Real(f) => SqlValue::F64(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_schema() -> SqliteEngine {
        let engine = SqliteEngine::open_in_memory().unwrap();
        engine
            .conn
            .execute_batch(
                r#"
                CREATE TABLE "Author" (
                    "AuthorId" INTEGER NOT NULL UNIQUE,
                    "Name" TEXT NOT NULL,
                    PRIMARY KEY("AuthorId" AUTOINCREMENT)
                );
                CREATE TABLE "Book" (
                    "BookId" INTEGER NOT NULL UNIQUE,
                    "Title" TEXT,
                    "AuthorId" INTEGER,
                    FOREIGN KEY("AuthorId") REFERENCES "Author"("AuthorId"),
                    PRIMARY KEY("BookId" AUTOINCREMENT)
                );
                "#,
            )
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_list_tables_hides_internal_tables() {
        let mut engine = engine_with_schema();
        // AUTOINCREMENT creates sqlite_sequence; it must stay hidden.
        let tables = engine.list_tables().await.unwrap();
        assert_eq!(tables, vec!["Author".to_string(), "Book".to_string()]);
    }

    #[tokio::test]
    async fn test_columns_and_primary_key() {
        let mut engine = engine_with_schema();

        let columns = engine.columns("Book").await.unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].name, "BookId");
        assert!(columns[0].is_primary_key);
        assert!(!columns[0].is_nullable);
        assert_eq!(columns[1].name, "Title");
        assert!(columns[1].is_nullable);

        let pk = engine.primary_key("Book").await.unwrap();
        assert_eq!(pk.as_deref(), Some("BookId"));
    }

    #[tokio::test]
    async fn test_foreign_keys_synthesize_constraint_names() {
        let mut engine = engine_with_schema();

        let fks = engine.foreign_keys("Book").await.unwrap();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].table, "Book");
        assert_eq!(fks[0].column, "AuthorId");
        assert_eq!(fks[0].ref_table, "Author");
        assert_eq!(fks[0].ref_column, "AuthorId");
        assert_eq!(fks[0].constraint_name, "FK_Book_AuthorId");

        assert!(engine.foreign_keys("Author").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_table_sql_round_trip() {
        let engine = engine_with_schema();
        let sql = engine.create_table_sql("Author").unwrap().unwrap();
        assert!(sql.contains("CREATE TABLE"));
        assert!(sql.contains("AUTOINCREMENT"));
        assert!(engine.create_table_sql("Missing").unwrap().is_none());
    }

    #[test]
    fn test_classify_missing_table_and_duplicate() {
        let engine = SqliteEngine::open_in_memory().unwrap();

        let missing = engine
            .conn
            .execute("INSERT INTO Nope VALUES (1)", [])
            .unwrap_err();
        assert_eq!(classify(&missing), SqlErrorKind::MissingDependency);

        engine.conn.execute_batch("CREATE TABLE T (x)").unwrap();
        let duplicate = engine
            .conn
            .execute_batch("CREATE TABLE T (x)")
            .unwrap_err();
        assert_eq!(classify(&duplicate), SqlErrorKind::DuplicateObject);

        let syntax = engine.conn.execute_batch("CREATE TABEL T (x)").unwrap_err();
        assert_eq!(classify(&syntax), SqlErrorKind::MalformedDefinition);
    }

    #[test]
    fn test_classify_constraint_violation() {
        let engine = SqliteEngine::open_in_memory().unwrap();
        engine
            .conn
            .execute_batch("CREATE TABLE T (x INTEGER NOT NULL)")
            .unwrap();
        let err = engine
            .conn
            .execute("INSERT INTO T (x) VALUES (NULL)", [])
            .unwrap_err();
        assert_eq!(classify(&err), SqlErrorKind::IntegrityViolation);
    }
}
