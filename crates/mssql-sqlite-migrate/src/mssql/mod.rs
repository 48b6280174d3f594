//! SQL Server engine adapter: connection, introspection, DDL/DML execution,
//! identity-insert override, and driver-error classification.

use crate::config::ServerConfig;
use crate::error::{MigrateError, Result, SqlErrorKind};
use crate::ident::quote_mssql;
use crate::resolver::DdlExecutor;
use crate::schema::{Column, ForeignKey, Introspect};
use crate::value::SqlValue;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, Config as TdsConfig, EncryptionLevel, Query, Row, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};
use uuid::Uuid;

/// Databases never listed or cloned.
pub const SYSTEM_DATABASES: &[&str] = &["master", "model", "tempdb", "msdb"];

/// A single authenticated SQL Server connection.
pub struct MssqlEngine {
    client: Client<Compat<TcpStream>>,
}

impl MssqlEngine {
    /// Connect to the configured database.
    pub async fn connect(config: &ServerConfig) -> Result<Self> {
        Self::connect_to(config, &config.database).await
    }

    /// Connect to `master` for database-level administration
    /// (existence check, CREATE DATABASE).
    pub async fn connect_master(config: &ServerConfig) -> Result<Self> {
        Self::connect_to(config, "master").await
    }

    async fn connect_to(config: &ServerConfig, database: &str) -> Result<Self> {
        if config.trusted {
            return Err(MigrateError::NotSupported(
                "trusted connections; use SQL authentication".into(),
            ));
        }

        let mut tds = TdsConfig::new();
        tds.host(&config.host);
        tds.port(config.port);
        tds.database(database);
        tds.authentication(AuthMethod::sql_server(&config.user, &config.password));

        match config.encrypt.to_lowercase().as_str() {
            "false" | "no" | "0" | "disable" => {
                tds.encryption(EncryptionLevel::NotSupported);
            }
            _ => {
                if config.trust_server_cert {
                    tds.trust_cert();
                }
                tds.encryption(EncryptionLevel::Required);
            }
        }

        let tcp = TcpStream::connect(tds.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(tds, tcp.compat_write()).await?;

        info!(
            "Connected to SQL Server: {}:{}/{}",
            config.host, config.port, database
        );

        Ok(Self { client })
    }

    /// Close the connection. Must be called on every exit path of the
    /// owning orchestrator.
    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }

    /// Whether a database exists on the server.
    pub async fn database_exists(&mut self, database: &str) -> Result<bool> {
        let mut query = Query::new("SELECT DB_ID(@P1)");
        query.bind(database.to_string());

        let row = query.query(&mut self.client).await?.into_row().await?;
        Ok(row.and_then(|r| r.get::<i32, _>(0)).is_some())
    }

    /// Create a database.
    pub async fn create_database(&mut self, database: &str) -> Result<()> {
        let sql = format!("CREATE DATABASE {}", quote_mssql(database)?);
        self.client.simple_query(&sql).await?.into_results().await?;
        info!("Created database {}", database);
        Ok(())
    }

    /// Toggle the identity-insert override for a table. While enabled the
    /// client may supply explicit values for an identity column.
    pub async fn set_identity_insert(&mut self, table: &str, enable: bool) -> Result<()> {
        let switch = if enable { "ON" } else { "OFF" };
        let sql = format!("SET IDENTITY_INSERT {} {}", quote_mssql(table)?, switch);
        self.client.simple_query(&sql).await?.into_results().await?;
        debug!("IDENTITY_INSERT {} for {}", switch, table);
        Ok(())
    }

    /// Re-enable checking for every foreign key on a table.
    pub async fn enable_foreign_keys(&mut self, table: &str) -> Result<()> {
        for fk in self.foreign_keys(table).await? {
            self.toggle_foreign_key(table, &fk.constraint_name, true)
                .await?;
        }
        Ok(())
    }

    /// Disable checking for every foreign key on a table.
    pub async fn disable_foreign_keys(&mut self, table: &str) -> Result<()> {
        for fk in self.foreign_keys(table).await? {
            self.toggle_foreign_key(table, &fk.constraint_name, false)
                .await?;
        }
        Ok(())
    }

    async fn toggle_foreign_key(
        &mut self,
        table: &str,
        constraint: &str,
        enable: bool,
    ) -> Result<()> {
        let sql = constraint_toggle_sql(table, constraint, enable)?;
        self.client.simple_query(&sql).await?.into_results().await?;
        Ok(())
    }

    /// Read all rows of a table as a column-ordered projection.
    pub async fn select_all(
        &mut self,
        table: &str,
        columns: &[Column],
    ) -> Result<Vec<Vec<SqlValue>>> {
        let projection = columns
            .iter()
            .map(|c| quote_mssql(&c.name))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let sql = format!("SELECT {} FROM {}", projection, quote_mssql(table)?);

        let rows = self
            .client
            .simple_query(&sql)
            .await?
            .into_first_result()
            .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                values.push(convert_row_value(&row, idx, &column.data_type));
            }
            result.push(values);
        }

        debug!("Read {} rows from {}", result.len(), table);
        Ok(result)
    }

    /// Insert one row with bound parameters.
    pub async fn insert_row(
        &mut self,
        table: &str,
        columns: &[String],
        values: &[SqlValue],
    ) -> Result<u64> {
        let column_list = columns
            .iter()
            .map(|c| quote_mssql(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let placeholders = (1..=values.len())
            .map(|i| format!("@P{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_mssql(table)?,
            column_list,
            placeholders
        );

        let params: Vec<&dyn ToSql> = values.iter().map(sql_param).collect();
        let result = self.client.execute(&sql, &params).await?;
        Ok(result.total())
    }

    /// Insert all rows of a table in one multi-row statement. Any failure
    /// aborts the whole statement; no rows are inserted.
    pub async fn insert_batch(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let column_list = columns
            .iter()
            .map(|c| quote_mssql(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        let mut placeholders = Vec::with_capacity(rows.len());
        let mut param = 1;
        for row in rows {
            let tuple = (0..row.len())
                .map(|i| format!("@P{}", param + i))
                .collect::<Vec<_>>()
                .join(", ");
            placeholders.push(format!("({})", tuple));
            param += row.len();
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_mssql(table)?,
            column_list,
            placeholders.join(", ")
        );

        let params: Vec<&dyn ToSql> = rows.iter().flatten().map(sql_param).collect();
        let result = self.client.execute(&sql, &params).await?;
        Ok(result.total())
    }
}

/// The `ALTER TABLE .. CHECK/NOCHECK CONSTRAINT` statement toggling one
/// foreign key.
fn constraint_toggle_sql(table: &str, constraint: &str, enable: bool) -> Result<String> {
    let action = if enable { "CHECK" } else { "NOCHECK" };
    Ok(format!(
        "ALTER TABLE {} {} CONSTRAINT {}",
        quote_mssql(table)?,
        action,
        quote_mssql(constraint)?
    ))
}

#[async_trait]
impl Introspect for MssqlEngine {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows = self
            .client
            .simple_query("SELECT name FROM sys.tables ORDER BY name")
            .await
            .map_err(|e| MigrateError::introspection("sys.tables", e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| MigrateError::introspection("sys.tables", e.to_string()))?;

        Ok(rows
            .iter()
            .filter_map(|r| r.get::<&str, _>(0).map(String::from))
            .collect())
    }

    async fn columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let sql = r#"
            SELECT
                TABLE_NAME,
                COLUMN_NAME,
                ORDINAL_POSITION,
                IS_NULLABLE,
                DATA_TYPE,
                CHARACTER_MAXIMUM_LENGTH,
                CAST(DATETIME_PRECISION AS INT),
                COLUMN_DEFAULT
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_NAME = @P1
            ORDER BY ORDINAL_POSITION
        "#;

        let mut query = Query::new(sql);
        query.bind(table.to_string());

        let rows = query
            .query(&mut self.client)
            .await
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(Column {
                table: row.get::<&str, _>(0).unwrap_or_default().to_string(),
                name: row.get::<&str, _>(1).unwrap_or_default().to_string(),
                ordinal: row.get::<i32, _>(2).unwrap_or(0),
                is_nullable: row.get::<&str, _>(3) != Some("NO"),
                data_type: row.get::<&str, _>(4).unwrap_or_default().to_string(),
                max_length: row.get::<i32, _>(5),
                datetime_precision: row.get::<i32, _>(6),
                // Filled in from primary_key() by callers that need it.
                is_primary_key: false,
                default_value: row.get::<&str, _>(7).map(String::from),
            });
        }

        debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn primary_key(&mut self, table: &str) -> Result<Option<String>> {
        let sql = r#"
            SELECT K.COLUMN_NAME
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS T
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE K
                ON K.CONSTRAINT_NAME = T.CONSTRAINT_NAME
            WHERE K.TABLE_NAME = @P1
              AND T.CONSTRAINT_TYPE = 'PRIMARY KEY'
            ORDER BY K.ORDINAL_POSITION
        "#;

        let mut query = Query::new(sql);
        query.bind(table.to_string());

        let row = query
            .query(&mut self.client)
            .await
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?
            .into_row()
            .await
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?;

        Ok(row.and_then(|r| r.get::<&str, _>(0).map(String::from)))
    }

    async fn foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKey>> {
        let sql = r#"
            SELECT KCU1.TABLE_NAME   AS ReferencedTableName,
                   KCU1.COLUMN_NAME  AS ReferencedColumnName,
                   KCU2.TABLE_NAME   AS ReferencingTableName,
                   KCU2.COLUMN_NAME  AS ReferencingColumnName,
                   KCU2.CONSTRAINT_NAME AS ConstraintName
            FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS AS RC
            INNER JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE AS KCU1
                ON RC.UNIQUE_CONSTRAINT_NAME = KCU1.CONSTRAINT_NAME
            INNER JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE AS KCU2
                ON RC.CONSTRAINT_NAME = KCU2.CONSTRAINT_NAME
            WHERE KCU2.TABLE_NAME = @P1
        "#;

        let mut query = Query::new(sql);
        query.bind(table.to_string());

        let rows = query
            .query(&mut self.client)
            .await
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?;

        let mut foreign_keys = Vec::new();
        for row in rows {
            let fk = ForeignKey {
                id: None,
                seq: None,
                ref_table: row.get::<&str, _>(0).unwrap_or_default().to_string(),
                ref_column: row.get::<&str, _>(1).unwrap_or_default().to_string(),
                table: row.get::<&str, _>(2).unwrap_or_default().to_string(),
                column: row.get::<&str, _>(3).unwrap_or_default().to_string(),
                constraint_name: row.get::<&str, _>(4).unwrap_or_default().to_string(),
                on_update: None,
                on_delete: None,
                match_clause: None,
            };
            if fk.table == table {
                foreign_keys.push(fk);
            }
        }

        debug!("Loaded {} foreign keys for {}", foreign_keys.len(), table);
        Ok(foreign_keys)
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let mut query = Query::new("SELECT OBJECT_ID(@P1, N'U')");
        query.bind(format!("dbo.{}", table));

        let row = query
            .query(&mut self.client)
            .await
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?
            .into_row()
            .await
            .map_err(|e| MigrateError::introspection(table, e.to_string()))?;

        Ok(row.and_then(|r| r.get::<i32, _>(0)).is_some())
    }
}

#[async_trait]
impl DdlExecutor for MssqlEngine {
    async fn execute_ddl(&mut self, script: &str) -> Result<()> {
        // into_results drains the stream so server errors surface here.
        self.client
            .simple_query(script)
            .await?
            .into_results()
            .await?;
        Ok(())
    }
}

/// Translate a tiberius error into an engine-agnostic kind.
///
/// The numeric codes are SQL Server's: 1767 foreign key references an
/// invalid table, 208 invalid object name, 2714 object already exists,
/// 173 column definition missing a data type, 3902 commit without a
/// transaction, 544/545 identity insert required, 515/547/2601/2627
/// row-level constraint violations.
pub fn classify(error: &tiberius::error::Error) -> SqlErrorKind {
    if let tiberius::error::Error::Server(token) = error {
        return match token.code() {
            1767 | 208 => SqlErrorKind::MissingDependency,
            2714 => SqlErrorKind::DuplicateObject,
            173 => SqlErrorKind::MalformedDefinition,
            3902 => SqlErrorKind::TransactionDesync,
            544 | 545 => SqlErrorKind::IdentityInsertRequired,
            515 | 547 | 2601 | 2627 => SqlErrorKind::IntegrityViolation,
            _ => SqlErrorKind::Other,
        };
    }
    SqlErrorKind::Other
}

/// Convert one projected cell to a [`SqlValue`] based on the column's
/// declared type.
fn convert_row_value(row: &Row, idx: usize, data_type: &str) -> SqlValue {
    match data_type.to_lowercase().as_str() {
        "bit" => row
            .get::<bool, _>(idx)
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        "tinyint" => row
            .get::<u8, _>(idx)
            .map(|v| SqlValue::I64(v as i64))
            .unwrap_or(SqlValue::Null),
        "smallint" => row
            .get::<i16, _>(idx)
            .map(|v| SqlValue::I64(v as i64))
            .unwrap_or(SqlValue::Null),
        "int" => row
            .get::<i32, _>(idx)
            .map(|v| SqlValue::I64(v as i64))
            .unwrap_or(SqlValue::Null),
        "bigint" => row
            .get::<i64, _>(idx)
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null),
        "real" => row
            .get::<f32, _>(idx)
            .map(|v| SqlValue::F64(v as f64))
            .unwrap_or(SqlValue::Null),
        "float" => row
            .get::<f64, _>(idx)
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null),
        "decimal" | "numeric" | "money" | "smallmoney" => row
            .get::<Decimal, _>(idx)
            .map(SqlValue::Decimal)
            .or_else(|| {
                row.get::<&str, _>(idx)
                    .and_then(|s| s.parse::<Decimal>().ok())
                    .map(SqlValue::Decimal)
            })
            .unwrap_or(SqlValue::Null),
        "date" | "time" | "datetime" | "datetime2" | "smalldatetime" => row
            .get::<NaiveDateTime, _>(idx)
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null),
        "uniqueidentifier" => row
            .get::<Uuid, _>(idx)
            .map(|u| SqlValue::Text(u.to_string()))
            .unwrap_or(SqlValue::Null),
        "binary" | "varbinary" | "image" => row
            .get::<&[u8], _>(idx)
            .map(|b| SqlValue::Blob(b.to_vec()))
            .unwrap_or(SqlValue::Null),
        // varchar, nvarchar, char, nchar, text, ntext, xml, ...
        _ => row
            .get::<&str, _>(idx)
            .map(|s| SqlValue::Text(s.to_string()))
            .unwrap_or(SqlValue::Null),
    }
}

const NULL_PARAM: Option<String> = None;

/// Borrow one value as a positional insert parameter. Decimals go through
/// the driver's borrowed-parameter trait, which carries the full numeric
/// precision onto the wire.
fn sql_param(value: &SqlValue) -> &dyn ToSql {
    match value {
        SqlValue::Null => &NULL_PARAM,
        SqlValue::Bool(b) => b,
        SqlValue::I64(i) => i,
        SqlValue::F64(f) => f,
        SqlValue::Text(s) => s,
        SqlValue::Blob(b) => b,
        SqlValue::Decimal(d) => d,
        SqlValue::DateTime(dt) => dt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_every_value_variant_is_bindable() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let values = [
            SqlValue::Null,
            SqlValue::Bool(true),
            SqlValue::I64(42),
            SqlValue::F64(1.5),
            SqlValue::Text("a".into()),
            SqlValue::Blob(vec![1, 2]),
            SqlValue::Decimal("19.99".parse().unwrap()),
            SqlValue::DateTime(dt),
        ];

        let params: Vec<&dyn ToSql> = values.iter().map(sql_param).collect();
        assert_eq!(params.len(), values.len());
    }

    #[test]
    fn test_constraint_toggle_sql() {
        assert_eq!(
            constraint_toggle_sql("Book", "FK_Book_AuthorId", false).unwrap(),
            "ALTER TABLE [Book] NOCHECK CONSTRAINT [FK_Book_AuthorId]"
        );
        assert_eq!(
            constraint_toggle_sql("Book", "FK_Book_AuthorId", true).unwrap(),
            "ALTER TABLE [Book] CHECK CONSTRAINT [FK_Book_AuthorId]"
        );
    }

    #[test]
    fn test_classify_server_error_codes() {
        use tiberius::error::Error;

        let io = Error::Io {
            kind: std::io::ErrorKind::ConnectionRefused,
            message: "refused".into(),
        };
        assert_eq!(classify(&io), SqlErrorKind::Other);
    }
}
