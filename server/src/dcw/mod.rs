//! DB-Config Worker (DCW): a single long-running task that re-resolves
//! user macros embedded in item display names and writes the resolved
//! strings back to the database in batched updates.
//!
//! Grounded on `dbconfig_worker.c`'s `dbconfig_worker_thread` /
//! `dbsync_macros()`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use crate::db::{DbConfigStore, MacroResyncUpdate};
use crate::ipc::{DbConfigWorkerEndpoint, ShutdownRx};
use crate::macro_expand::MacroExpander;
use crate::process_title::ProcessTitle;
use crate::self_monitor::SelfMonitor;

/// Implementation-defined threshold (by accumulated staged-text length)
/// past which `macro_resync` flushes its batch early rather than holding
/// every update in memory for one giant statement. Mirrors the spirit of
/// the original's `zbx_db_execute_overflowed_sql` chunking, without
/// depending on a specific SQL string-builder.
const FLUSH_THRESHOLD_BYTES: usize = 64 * 1024;

/// Tick period for DCW's steady-state wait.
const TICK_PERIOD: Duration = Duration::from_secs(1);

pub struct DbConfigWorker {
    db: Arc<dyn DbConfigStore>,
    macro_expander: Arc<dyn MacroExpander>,
    request_endpoint: DbConfigWorkerEndpoint,
    shutdown: ShutdownRx,
    host_ids: Vec<u64>,
    self_monitor: SelfMonitor,
    process_title: ProcessTitle,
    processed: u64,
}

/// The `deleted` counter DCW historically returns is always zero in the
/// source; kept as a named, intentionally-unused field so the vestigial
/// nature is visible rather than silently dropped.
#[derive(Debug, Default)]
pub struct MacroResyncReport {
    pub updated: usize,
    pub deleted: usize,
}

impl DbConfigWorker {
    pub fn new(
        db: Arc<dyn DbConfigStore>,
        macro_expander: Arc<dyn MacroExpander>,
        request_endpoint: DbConfigWorkerEndpoint,
        shutdown: ShutdownRx,
    ) -> Self {
        Self {
            db,
            macro_expander,
            request_endpoint,
            shutdown,
            host_ids: Vec::new(),
            self_monitor: SelfMonitor::new(),
            process_title: ProcessTitle::new("db config worker", 1),
            processed: 0,
        }
    }

    /// Steady-state loop: block on the control channel with a 1s tick,
    /// running `macro_resync` on every wake, until `SHUTDOWN`.
    pub async fn run(mut self) {
        info!("db config worker started");
        let start = Instant::now();

        loop {
            self.self_monitor.set_idle();
            tokio::select! {
                biased;
                stopped = self.shutdown.recv() => {
                    if stopped {
                        break;
                    }
                }
                _ = tokio::time::sleep(TICK_PERIOD) => {}
                request = self.request_endpoint.recv() => {
                    match request {
                        Some(host_ids) => self.host_ids = host_ids,
                        None => break, // endpoint closed: treat like shutdown
                    }
                }
            }
            self.self_monitor.set_busy();

            match self.macro_resync().await {
                Ok(report) => {
                    self.processed += report.updated as u64;
                    debug!(?report, "macro resync completed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "macro resync failed, will retry next tick");
                }
            }

            self.process_title
                .maybe_update(self.processed, self.host_ids.len() as u64, start.elapsed());
        }

        info!("db config worker stopped");
    }

    /// Select macro-resync candidates, re-expand each display name against
    /// the cache's macro handle, stage an update for every row whose
    /// resolved text changed, and commit in one batch (flushing partway if
    /// the accumulated text grows past `FLUSH_THRESHOLD_BYTES`).
    #[instrument(skip(self))]
    async fn macro_resync(&self) -> Result<MacroResyncReport, crate::db::DbError> {
        let candidates = self.db.macro_resync_candidates().await?;

        let mut staged = Vec::new();
        let mut staged_bytes = 0usize;
        let mut report = MacroResyncReport::default();

        for candidate in candidates {
            let expanded = self.macro_expander.expand(&candidate.name, candidate.host_id);
            if expanded == candidate.name_resolved {
                continue;
            }

            let update = MacroResyncUpdate {
                item_id: candidate.item_id,
                name_resolved_upper: expanded.to_uppercase(),
                name_resolved: expanded,
            };
            staged_bytes += update.name_resolved.len() + update.name_resolved_upper.len();
            staged.push(update);
            report.updated += 1;

            if staged_bytes > FLUSH_THRESHOLD_BYTES {
                self.db
                    .apply_macro_resync_batch(std::mem::take(&mut staged))
                    .await?;
                staged_bytes = 0;
            }
        }

        self.db.apply_macro_resync_batch(staged).await?;
        // `deleted` is vestigial: the source always reports zero here too.
        Ok(report)
    }
}
