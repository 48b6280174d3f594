//! Schema metadata types and the introspection contract.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Column metadata, normalized across the two engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Owning table name.
    pub table: String,

    /// Column name.
    pub name: String,

    /// Ordinal position within the table. Unique per table.
    pub ordinal: i32,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Engine-native type string (e.g. "nvarchar", "INTEGER").
    pub data_type: String,

    /// Maximum character length for string/binary types (-1 for max).
    /// SQLite does not report one.
    pub max_length: Option<i32>,

    /// Fractional-second precision for datetime types.
    pub datetime_precision: Option<i32>,

    /// Whether the column is the table's primary key. At most one column
    /// per table carries this flag (composite keys are unsupported).
    pub is_primary_key: bool,

    /// Default value expression, if declared.
    pub default_value: Option<String>,
}

/// Foreign key metadata. The referencing table is always the table that was
/// introspected; the referenced table must eventually exist at the
/// destination for the constraint to be enforceable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Key id (SQLite foreign_key_list only).
    pub id: Option<i64>,

    /// Sequence number within the key (SQLite foreign_key_list only).
    pub seq: Option<i64>,

    /// Referencing table name.
    pub table: String,

    /// Referenced table name.
    pub ref_table: String,

    /// Referencing column name.
    pub column: String,

    /// Referenced column name.
    pub ref_column: String,

    /// Constraint name. Synthesized as `FK_{table}_{column}` for
    /// SQLite-sourced keys, which carry none.
    pub constraint_name: String,

    /// ON UPDATE action, if the engine reports one.
    pub on_update: Option<String>,

    /// ON DELETE action, if the engine reports one.
    pub on_delete: Option<String>,

    /// MATCH clause, if the engine reports one.
    pub match_clause: Option<String>,
}

/// Read-only schema introspection, implemented by each engine adapter.
///
/// All methods surface driver failures as
/// [`crate::error::MigrateError::Introspection`]; there is no retry at this
/// layer.
#[async_trait]
pub trait Introspect {
    /// List user tables, excluding the engine's hard-coded system set.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Columns of a table, ordered by ordinal position.
    async fn columns(&mut self, table: &str) -> Result<Vec<Column>>;

    /// The single primary-key column, if the table has one.
    async fn primary_key(&mut self, table: &str) -> Result<Option<String>>;

    /// Foreign keys where this table is the referencing side.
    async fn foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKey>>;

    /// Whether a table exists.
    async fn table_exists(&mut self, table: &str) -> Result<bool>;
}
