//! mssql-sqlite-migrate CLI - SQL Server / SQLite schema and data cloning.

use clap::{Parser, Subcommand};
use mssql_sqlite_migrate::{Config, Direction, InsertMode, MigrateError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mssql-sqlite-migrate")]
#[command(about = "Bidirectional SQL Server / SQLite schema and data cloning")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a clone
    Run {
        /// Override clone direction
        #[arg(long, value_parser = parse_direction)]
        direction: Option<Direction>,

        /// Skip the schema pass even if the config enables it
        #[arg(long)]
        no_schema: bool,

        /// Clone data regardless of the config setting
        #[arg(long)]
        data: bool,

        /// Use one all-or-nothing batch per table instead of row-by-row
        #[arg(long)]
        batch: bool,
    },

    /// Test both database endpoints
    HealthCheck,
}

fn parse_direction(value: &str) -> Result<Direction, String> {
    match value {
        "server_to_embedded" => Ok(Direction::ServerToEmbedded),
        "embedded_to_server" => Ok(Direction::EmbeddedToServer),
        other => Err(format!(
            "unknown direction '{}' (expected server_to_embedded or embedded_to_server)",
            other
        )),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(MigrateError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            direction,
            no_schema,
            data,
            batch,
        } => {
            if let Some(direction) = direction {
                config.direction = direction;
            }
            if no_schema {
                config.clone.schema = false;
            }
            if data {
                config.clone.data = true;
            }
            if batch {
                config.clone.insert_mode = InsertMode::Batch;
            }

            let report = Orchestrator::new(config).run().await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nClone completed!");
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!(
                    "  Tables: {} created, {} skipped of {}",
                    report.tables_created, report.tables_skipped, report.tables_total
                );
                println!("  Rows inserted: {}", report.rows_inserted);
                for outcome in &report.outcomes {
                    if outcome.rows_skipped > 0 {
                        println!(
                            "  {} skipped {} of {} rows",
                            outcome.table, outcome.rows_skipped, outcome.rows_read
                        );
                    }
                }
            }
        }

        Commands::HealthCheck => {
            let result = Orchestrator::new(config).health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  SQL Server: {} ({}ms)",
                    if result.server_connected { "OK" } else { "FAILED" },
                    result.server_latency_ms
                );
                if let Some(ref err) = result.server_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  SQLite: {}",
                    if result.embedded_connected { "OK" } else { "FAILED" }
                );
                if let Some(ref err) = result.embedded_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
