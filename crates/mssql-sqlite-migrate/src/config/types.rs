//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which way the clone runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// SQL Server source, SQLite destination.
    ServerToEmbedded,
    /// SQLite source, SQL Server destination.
    EmbeddedToServer,
}

/// How rows are written to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// Each row in its own statement/commit unit; a bad row is skipped.
    #[default]
    RowByRow,
    /// One multi-row insert per table, all-or-nothing.
    Batch,
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Clone direction.
    pub direction: Direction,

    /// SQL Server endpoint.
    pub server: ServerConfig,

    /// SQLite endpoint.
    pub embedded: EmbeddedConfig,

    /// Clone behavior.
    #[serde(default)]
    pub clone: CloneOptions,
}

/// SQL Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host.
    pub host: String,

    /// Server port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username (SQL authentication).
    #[serde(default)]
    pub user: String,

    /// Password (SQL authentication).
    #[serde(default)]
    pub password: String,

    /// Derive credentials from the calling process's identity instead of
    /// user/password. Not implemented; validation rejects it.
    #[serde(default)]
    pub trusted: bool,

    /// Encrypt connection (default: "true").
    #[serde(default = "default_true_string")]
    pub encrypt: String,

    /// Trust the server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

/// SQLite endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedConfig {
    /// Path to the database file. Created on demand when SQLite is the
    /// destination; must already exist when it is the source.
    pub path: PathBuf,
}

/// Clone behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneOptions {
    /// Clone the schema (default: true).
    #[serde(default = "default_true")]
    pub schema: bool,

    /// Clone the data (default: false).
    #[serde(default)]
    pub data: bool,

    /// Row insertion mode (default: row_by_row).
    #[serde(default)]
    pub insert_mode: InsertMode,

    /// Suppress writing primary-key values, letting the destination
    /// auto-generate them. Defaults to false in both directions: foreign key
    /// columns are copied verbatim, so re-keyed rows would dangle. Toward
    /// SQL Server the identity-insert override is bracketed to permit the
    /// explicit values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_primary_key: Option<bool>,

    /// Upper bound on dependency-retry rounds before the clone fails with
    /// an unresolved-dependency error (default: 10).
    #[serde(default = "default_retry_rounds")]
    pub max_retry_rounds: usize,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            schema: true,
            data: false,
            insert_mode: InsertMode::default(),
            skip_primary_key: None,
            max_retry_rounds: default_retry_rounds(),
        }
    }
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_true_string() -> String {
    "true".to_string()
}

fn default_retry_rounds() -> usize {
    10
}
