//! # mssql-sqlite-migrate
//!
//! Bidirectional schema and data cloning between SQL Server and SQLite.
//!
//! This library introspects one engine's catalog, translates its type system
//! and constraint syntax into the other engine's dialect, and materializes the
//! result table by table:
//!
//! - **Type translation** through an engine-agnostic category catalog
//! - **Creation-order resolution** via a bounded retry queue for
//!   forward-referencing foreign keys
//! - **Value coercion** during row transfer (day-count date encoding,
//!   decimal-to-text, parameter binding)
//! - **Row-level fault isolation** so a single bad row never aborts a table
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_sqlite_migrate::{Config, Orchestrator};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let report = Orchestrator::new(config).run().await?;
//!     println!("Cloned {} tables", report.tables_created);
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod catalog;
pub mod coerce;
pub mod config;
pub mod error;
pub mod ident;
pub mod mssql;
pub mod orchestrator;
pub mod resolver;
pub mod schema;
pub mod sqlite;
pub mod transfer;
pub mod value;

// Re-exports for convenient access
pub use catalog::{Engine, TypeCategory};
pub use config::{CloneOptions, Config, Direction, EmbeddedConfig, InsertMode, ServerConfig};
pub use error::{MigrateError, Result, SqlErrorKind};
pub use mssql::MssqlEngine;
pub use orchestrator::{CloneReport, HealthCheck, Orchestrator};
pub use resolver::{DependencyResolver, DdlExecutor, PendingCreation};
pub use schema::{Column, ForeignKey, Introspect};
pub use sqlite::SqliteEngine;
pub use transfer::TransferOutcome;
pub use value::SqlValue;
