//! End-to-end clone orchestration.
//!
//! One orchestrator run owns every connection it opens and closes them on
//! every exit path. The flow per direction is: connect, optionally create
//! the destination catalog objects, optionally move data, then (server
//! destination only) attach foreign key constraints last so that table
//! creation and data load never depend on constraint order.

use crate::builder;
use crate::config::{Config, Direction};
use crate::error::{Result, SqlErrorKind};
use crate::mssql::MssqlEngine;
use crate::resolver::{DdlExecutor, DependencyResolver, PendingCreation};
use crate::schema::Introspect;
use crate::sqlite::SqliteEngine;
use crate::transfer::{self, TableTransfer, TransferOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Summary of one completed clone run.
#[derive(Debug, Clone, Serialize)]
pub struct CloneReport {
    pub direction: Direction,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub tables_total: usize,
    pub tables_created: usize,
    pub tables_skipped: usize,
    pub rows_inserted: u64,
    pub outcomes: Vec<TransferOutcome>,
}

impl CloneReport {
    fn new(direction: Direction, started_at: DateTime<Utc>) -> Self {
        Self {
            direction,
            started_at,
            completed_at: started_at,
            duration_seconds: 0.0,
            tables_total: 0,
            tables_created: 0,
            tables_skipped: 0,
            rows_inserted: 0,
            outcomes: Vec::new(),
        }
    }

    fn finish(&mut self) {
        self.completed_at = Utc::now();
        self.duration_seconds = (self.completed_at - self.started_at)
            .num_milliseconds() as f64
            / 1000.0;
        self.rows_inserted = self.outcomes.iter().map(|o| o.rows_inserted).sum();
    }

    /// Serialize the report as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Drives a full clone per the loaded configuration.
pub struct Orchestrator {
    config: Config,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the clone to completion.
    pub async fn run(&self) -> Result<CloneReport> {
        info!("Starting clone ({:?})", self.config.direction);
        let report = match self.config.direction {
            Direction::ServerToEmbedded => self.run_server_to_embedded().await?,
            Direction::EmbeddedToServer => self.run_embedded_to_server().await?,
        };
        info!(
            "Clone finished in {:.1}s: {} tables created, {} skipped, {} rows",
            report.duration_seconds,
            report.tables_created,
            report.tables_skipped,
            report.rows_inserted
        );
        Ok(report)
    }

    async fn run_server_to_embedded(&self) -> Result<CloneReport> {
        let mut report = CloneReport::new(self.config.direction, Utc::now());

        let mut source = MssqlEngine::connect(&self.config.server).await?;
        let mut dest = SqliteEngine::open(&self.config.embedded.path)?;

        let result = self
            .clone_server_to_embedded(&mut source, &mut dest, &mut report)
            .await;

        let source_close = source.close().await;
        let dest_close = dest.close();
        result?;
        source_close?;
        dest_close?;

        report.finish();
        Ok(report)
    }

    async fn clone_server_to_embedded(
        &self,
        source: &mut MssqlEngine,
        dest: &mut SqliteEngine,
        report: &mut CloneReport,
    ) -> Result<()> {
        let tables = source.list_tables().await?;
        report.tables_total = tables.len();
        // Key values are preserved by default: re-keying under AUTOINCREMENT
        // would leave copied foreign key columns pointing at the old values.
        let skip_pk = self.config.clone.skip_primary_key.unwrap_or(false);

        if self.config.clone.schema {
            let mut pending = Vec::new();
            for table in &tables {
                if dest.table_exists(table).await? {
                    info!("Table {} already exists, skipping", table);
                    report.tables_skipped += 1;
                    continue;
                }

                let columns = source.columns(table).await?;
                let primary_key = source.primary_key(table).await?;
                let foreign_keys = source.foreign_keys(table).await?;
                let script = builder::sqlite_create_table(
                    table,
                    &columns,
                    primary_key.as_deref(),
                    &foreign_keys,
                    true,
                )?;
                pending.push(PendingCreation {
                    table: table.clone(),
                    script,
                });
            }

            let resolver = DependencyResolver::new(self.config.clone.max_retry_rounds);
            report.tables_created = resolver.create_all(dest, pending).await?;
        }

        if self.config.clone.data {
            for table in &tables {
                let outcome = transfer::server_to_embedded(
                    source,
                    dest,
                    table,
                    self.config.clone.insert_mode,
                    skip_pk,
                )
                .await?;
                report.outcomes.push(outcome);
            }
        }

        Ok(())
    }

    async fn run_embedded_to_server(&self) -> Result<CloneReport> {
        let mut report = CloneReport::new(self.config.direction, Utc::now());

        self.ensure_database().await?;

        let mut source = SqliteEngine::open_existing(&self.config.embedded.path)?;
        let mut dest = MssqlEngine::connect(&self.config.server).await?;

        let result = self
            .clone_embedded_to_server(&mut source, &mut dest, &mut report)
            .await;

        let dest_close = dest.close().await;
        let source_close = source.close();
        result?;
        dest_close?;
        source_close?;

        report.finish();
        Ok(report)
    }

    /// Create the destination database if it is absent, through a short
    /// administrative connection to `master`.
    async fn ensure_database(&self) -> Result<()> {
        let mut admin = MssqlEngine::connect_master(&self.config.server).await?;
        let result: Result<()> = async {
            if !admin.database_exists(&self.config.server.database).await? {
                admin.create_database(&self.config.server.database).await?;
            }
            Ok(())
        }
        .await;
        let close = admin.close().await;
        result?;
        close
    }

    async fn clone_embedded_to_server(
        &self,
        source: &mut SqliteEngine,
        dest: &mut MssqlEngine,
        report: &mut CloneReport,
    ) -> Result<()> {
        let tables = source.list_tables().await?;
        report.tables_total = tables.len();
        let skip_pk = self.config.clone.skip_primary_key.unwrap_or(false);

        if self.config.clone.schema {
            let mut pending = Vec::new();
            for table in &tables {
                if dest.table_exists(table).await? {
                    info!("Table {} already exists, skipping", table);
                    report.tables_skipped += 1;
                    continue;
                }

                let columns = source.columns(table).await?;
                let primary_key = source.primary_key(table).await?;
                let script =
                    builder::mssql_create_table(table, &columns, primary_key.as_deref())?;
                pending.push(PendingCreation {
                    table: table.clone(),
                    script,
                });
            }

            // Foreign keys go on after the data pass, so bare CREATE TABLE
            // scripts rarely defer; the resolver still covers engines that
            // reject other kinds of forward references.
            let resolver = DependencyResolver::new(self.config.clone.max_retry_rounds);
            report.tables_created = resolver.create_all(dest, pending).await?;
        }

        if self.config.clone.data {
            // Pre-existing destination tables may already carry enforced
            // foreign keys; suspend them for the load and restore after.
            for table in &tables {
                dest.disable_foreign_keys(table).await?;
            }

            let result = self
                .transfer_all_to_server(source, dest, &tables, skip_pk, report)
                .await;

            for table in &tables {
                if let Err(e) = dest.enable_foreign_keys(table).await {
                    warn!("could not re-enable foreign keys on {}: {}", table, e);
                }
            }
            result?;
        }

        if self.config.clone.schema {
            add_foreign_key_constraints(source, dest, &tables).await?;
        }

        Ok(())
    }

    /// Move every table's rows, retrying tables whose referenced data has
    /// not arrived yet in bounded rounds.
    async fn transfer_all_to_server(
        &self,
        source: &mut SqliteEngine,
        dest: &mut MssqlEngine,
        tables: &[String],
        skip_pk: bool,
        report: &mut CloneReport,
    ) -> Result<()> {
        let mut remaining: Vec<String> = tables.to_vec();

        for _round in 0..self.config.clone.max_retry_rounds {
            if remaining.is_empty() {
                break;
            }

            let mut deferred = Vec::new();
            for table in remaining {
                match transfer::embedded_to_server(
                    source,
                    dest,
                    &table,
                    self.config.clone.insert_mode,
                    skip_pk,
                )
                .await?
                {
                    TableTransfer::Done(outcome) => report.outcomes.push(outcome),
                    TableTransfer::Deferred => deferred.push(table),
                }
            }
            remaining = deferred;
        }

        for table in remaining {
            warn!("Data for {} never transferred: dependencies unresolved", table);
            report.outcomes.push(TransferOutcome {
                table,
                rows_read: 0,
                rows_inserted: 0,
                rows_skipped: 0,
            });
        }

        Ok(())
    }
}

/// Result of probing both configured endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub server_connected: bool,
    pub server_latency_ms: u64,
    pub server_error: Option<String>,
    pub embedded_connected: bool,
    pub embedded_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    /// Probe both endpoints without touching any data. The embedded side is
    /// opened the way the configured direction would open it, so a missing
    /// source file is reported here rather than mid-clone.
    pub async fn health_check(&self) -> Result<HealthCheck> {
        let start = std::time::Instant::now();
        let (server_connected, server_error) =
            match MssqlEngine::connect(&self.config.server).await {
                Ok(engine) => {
                    engine.close().await.ok();
                    (true, None)
                }
                Err(e) => (false, Some(e.to_string())),
            };
        let server_latency_ms = start.elapsed().as_millis() as u64;

        let embedded = match self.config.direction {
            Direction::ServerToEmbedded => SqliteEngine::open(&self.config.embedded.path),
            Direction::EmbeddedToServer => {
                SqliteEngine::open_existing(&self.config.embedded.path)
            }
        };
        let (embedded_connected, embedded_error) = match embedded {
            Ok(engine) => {
                engine.close().ok();
                (true, None)
            }
            Err(e) => (false, Some(e.to_string())),
        };

        Ok(HealthCheck {
            server_connected,
            server_latency_ms,
            server_error,
            embedded_connected,
            embedded_error,
            healthy: server_connected && embedded_connected,
        })
    }
}

/// Attach every introspected foreign key to the server-side tables. Runs
/// after data so constraint order never blocks creation or load; a
/// constraint that already exists is skipped.
pub async fn add_foreign_key_constraints(
    source: &mut SqliteEngine,
    dest: &mut MssqlEngine,
    tables: &[String],
) -> Result<()> {
    for table in tables {
        let foreign_keys = source.foreign_keys(table).await?;
        let Some(script) = builder::mssql_foreign_key_script(&foreign_keys)? else {
            continue;
        };

        match dest.execute_ddl(&script).await {
            Ok(()) => info!("Added {} foreign keys to {}", foreign_keys.len(), table),
            Err(e) if e.kind() == SqlErrorKind::DuplicateObject => {
                info!("Foreign keys on {} already exist, skipping", table);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
