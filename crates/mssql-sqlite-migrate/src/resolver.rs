//! Ordered creation of interdependent tables.
//!
//! Tables are created in whatever order introspection yields them. A script
//! rejected because it references a not-yet-created table goes onto a retry
//! queue; the queue is drained in rounds, alternating the end it pops from,
//! until it empties or the round limit is hit. The queue lives and dies
//! inside one [`DependencyResolver::create_all`] call.

use crate::error::{MigrateError, Result, SqlErrorKind};
use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// A creation script waiting to run, tagged with its table for reporting.
#[derive(Debug, Clone)]
pub struct PendingCreation {
    pub table: String,
    pub script: String,
}

/// Anything that can execute a DDL script. Both engines implement this, and
/// tests substitute an in-memory engine.
#[async_trait]
pub trait DdlExecutor: Send {
    async fn execute_ddl(&mut self, script: &str) -> Result<()>;
}

/// Drains a batch of creation scripts against one destination.
pub struct DependencyResolver {
    max_rounds: usize,
}

impl DependencyResolver {
    pub fn new(max_rounds: usize) -> Self {
        Self { max_rounds }
    }

    /// Run every pending script, retrying dependency rejections in bounded
    /// rounds. Returns the number of tables actually created; scripts whose
    /// object already exists are skipped without error.
    pub async fn create_all<E>(&self, executor: &mut E, pending: Vec<PendingCreation>) -> Result<usize>
    where
        E: DdlExecutor + ?Sized,
    {
        let mut queue: VecDeque<PendingCreation> = VecDeque::new();
        let mut created = 0usize;

        for item in pending {
            match executor.execute_ddl(&item.script).await {
                Ok(()) => {
                    info!("Created table {}", item.table);
                    created += 1;
                }
                Err(e) => match e.kind() {
                    SqlErrorKind::MissingDependency => {
                        debug!("Deferring {}: {}", item.table, e);
                        queue.push_back(item);
                    }
                    SqlErrorKind::DuplicateObject => {
                        debug!("Table {} already exists, skipping", item.table);
                    }
                    kind => return Err(Self::fatal(item.table, kind, e)),
                },
            }
        }

        created += self.drain(executor, queue).await?;
        Ok(created)
    }

    /// Retry deferred scripts. Each round walks the queue once; even rounds
    /// pop from the front, odd rounds from the back, and a still-blocked
    /// script is pushed to the opposite end so it waits for the next round.
    async fn drain<E>(&self, executor: &mut E, mut queue: VecDeque<PendingCreation>) -> Result<usize>
    where
        E: DdlExecutor + ?Sized,
    {
        let mut created = 0usize;
        let mut rounds = 0usize;

        while !queue.is_empty() {
            if rounds == self.max_rounds {
                return Err(Self::unsatisfied(queue, rounds));
            }

            let from_front = rounds % 2 == 0;
            let mut progressed = false;

            for _ in 0..queue.len() {
                // Queue is non-empty for the whole round.
                let item = if from_front {
                    queue.pop_front()
                } else {
                    queue.pop_back()
                };
                let Some(item) = item else { break };

                match executor.execute_ddl(&item.script).await {
                    Ok(()) => {
                        info!("Created table {} (round {})", item.table, rounds + 1);
                        created += 1;
                        progressed = true;
                    }
                    Err(e) => match e.kind() {
                        SqlErrorKind::MissingDependency => {
                            if from_front {
                                queue.push_back(item);
                            } else {
                                queue.push_front(item);
                            }
                        }
                        SqlErrorKind::DuplicateObject => {
                            debug!("Table {} already exists, skipping", item.table);
                            progressed = true;
                        }
                        kind => return Err(Self::fatal(item.table, kind, e)),
                    },
                }
            }

            rounds += 1;

            if !progressed {
                // A full round with zero successes cannot unblock anything.
                warn!("No progress in retry round {}", rounds);
                return Err(Self::unsatisfied(queue, rounds));
            }
        }

        Ok(created)
    }

    fn unsatisfied(queue: VecDeque<PendingCreation>, rounds: usize) -> MigrateError {
        MigrateError::DependencyUnsatisfied {
            tables: queue.into_iter().map(|p| p.table).collect(),
            rounds,
        }
    }

    fn fatal(table: String, kind: SqlErrorKind, error: MigrateError) -> MigrateError {
        match kind {
            SqlErrorKind::MalformedDefinition => MigrateError::MalformedDefinition {
                table,
                message: error.to_string(),
            },
            SqlErrorKind::TransactionDesync => MigrateError::TransactionDesync(error.to_string()),
            _ => error,
        }
    }
}
