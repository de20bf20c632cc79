//! Periodic reindex scheduler.
//!
//! A reindex cycle waits for the search engine, refreshes snapshots, chunks
//! them, rebuilds the index and waits for the new index to report healthy.
//! Scheduled cycles refresh only stale snapshots; manual ones
//! ([`ReindexJob::run_forced_cycle`]) regenerate all of them:
//!
//! ```text
//! Idle ──▶ WaitingForSearchEngine ──▶ Indexing ──▶ Idle ──(interval)──▶ …
//!                   │ timeout                          ▲
//!                   └──────────── cycle aborted ───────┘
//! ```
//!
//! A health timeout aborts only the current cycle. [`ReindexScheduler`] runs
//! the first cycle immediately and then one per interval until
//! [`ReindexScheduler::stop`] is awaited.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chunk::fingerprint;
use crate::config::{Config, SnapshotConfig};
use crate::error::IndexUnhealthy;
use crate::indexer::{reindex, ReindexOutcome};
use crate::ingest::{prepare_chunks, SnapshotRefresh};
use crate::sources::{readers_from_config, SourceReader};
use crate::store::opensearch::OpenSearchClient;
use crate::store::{HealthStatus, SearchBackend};

/// Where the scheduler currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    WaitingForSearchEngine,
    Indexing,
}

/// Poll `backend.health(index)` every `poll` until it reports yellow or
/// green, giving up after `timeout`.
///
/// `index = None` checks the cluster. Connection errors count as not ready.
pub async fn wait_for_health(
    backend: &dyn SearchBackend,
    index: Option<&str>,
    poll: Duration,
    timeout: Duration,
) -> Result<HealthStatus, IndexUnhealthy> {
    let checked = index.unwrap_or("cluster");
    let started = Instant::now();
    loop {
        match backend.health(index).await {
            Ok(status) if status.is_ready() => {
                info!(checked, ?status, "search engine ready");
                return Ok(status);
            }
            Ok(status) => debug!(checked, ?status, "search engine not ready"),
            Err(e) => debug!(checked, error = %e, "health check failed"),
        }
        if started.elapsed() >= timeout {
            return Err(IndexUnhealthy {
                target: checked.to_string(),
                waited: started.elapsed(),
            });
        }
        tokio::time::sleep(poll).await;
    }
}

/// Result of one completed reindex cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub chunks: usize,
    pub fingerprint: String,
    pub outcome: ReindexOutcome,
}

/// Everything one reindex cycle needs.
pub struct ReindexJob {
    pub backend: Arc<dyn SearchBackend>,
    pub readers: Vec<Arc<dyn SourceReader>>,
    pub index_name: String,
    pub snapshots: SnapshotConfig,
    /// Refresh stale snapshots on scheduled cycles.
    pub refresh_snapshots: bool,
    pub health_poll: Duration,
    pub health_timeout: Duration,
    pub interval: Duration,
}

impl ReindexJob {
    pub fn from_config(config: &Config, backend: Arc<dyn SearchBackend>) -> Result<Self> {
        Ok(Self {
            backend,
            readers: readers_from_config(config)?,
            index_name: config.search.index_name.clone(),
            snapshots: config.snapshots.clone(),
            refresh_snapshots: config.scheduler.refresh_snapshots,
            health_poll: config.scheduler.health_poll(),
            health_timeout: config.scheduler.health_timeout(),
            interval: config.scheduler.interval(),
        })
    }

    /// Run one scheduled cycle now.
    pub async fn run_cycle(&self) -> Result<CycleReport, IndexUnhealthy> {
        self.cycle(self.scheduled_refresh(), &|_| {}).await
    }

    /// Regenerate every snapshot regardless of age, then run a cycle.
    pub async fn run_forced_cycle(&self) -> Result<CycleReport, IndexUnhealthy> {
        self.cycle(SnapshotRefresh::All, &|_| {}).await
    }

    fn scheduled_refresh(&self) -> SnapshotRefresh {
        if self.refresh_snapshots {
            SnapshotRefresh::Stale
        } else {
            SnapshotRefresh::Skip
        }
    }

    async fn cycle(
        &self,
        refresh: SnapshotRefresh,
        on_state: &(dyn Fn(SchedulerState) + Sync),
    ) -> Result<CycleReport, IndexUnhealthy> {
        on_state(SchedulerState::WaitingForSearchEngine);
        wait_for_health(
            self.backend.as_ref(),
            None,
            self.health_poll,
            self.health_timeout,
        )
        .await?;

        on_state(SchedulerState::Indexing);
        let chunks = prepare_chunks(&self.readers, &self.snapshots, refresh).await;
        let fingerprint = fingerprint(&chunks);
        let outcome = reindex(self.backend.as_ref(), &self.index_name, &chunks).await;

        if matches!(outcome, ReindexOutcome::Indexed { .. }) {
            wait_for_health(
                self.backend.as_ref(),
                Some(&self.index_name),
                self.health_poll,
                self.health_timeout,
            )
            .await?;
        }

        Ok(CycleReport {
            chunks: chunks.len(),
            fingerprint,
            outcome,
        })
    }
}

/// `companion reindex`: regenerate all snapshots and rebuild the index.
pub async fn run_reindex(config: &Config) -> Result<()> {
    let backend: Arc<dyn SearchBackend> = Arc::new(OpenSearchClient::new(&config.search)?);
    let job = ReindexJob::from_config(config, backend)?;
    let report = job.run_forced_cycle().await?;

    println!("reindex {}", job.index_name);
    println!("  chunks: {}", report.chunks);
    match &report.outcome {
        ReindexOutcome::Indexed { indexed, failed } => {
            println!("  indexed: {}", indexed);
            println!("  failed: {}", failed.len());
        }
        ReindexOutcome::CreateFailed(reason) => println!("  create failed: {}", reason),
        ReindexOutcome::BulkFailed(reason) => println!("  bulk insert failed: {}", reason),
    }
    println!("  fingerprint: {}", report.fingerprint);
    if !report.outcome.is_complete() {
        anyhow::bail!("reindex incomplete");
    }
    println!("ok");
    Ok(())
}

/// Handle to a running periodic reindex task.
pub struct ReindexScheduler {
    state: watch::Receiver<SchedulerState>,
    cycles: Arc<AtomicUsize>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReindexScheduler {
    /// Spawn the periodic task. The first cycle starts immediately.
    pub fn start(job: Arc<ReindexJob>) -> Self {
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cycles = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(run_loop(job, state_tx, shutdown_rx, cycles.clone()));
        Self {
            state: state_rx,
            cycles,
            shutdown: shutdown_tx,
            task,
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Cycles finished so far, successful or aborted.
    pub fn cycles_completed(&self) -> usize {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Signal shutdown and wait for the task to exit. An in-flight cycle is
    /// abandoned; the next start rebuilds the index from scratch.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "reindex scheduler task ended abnormally");
        }
    }
}

async fn run_loop(
    job: Arc<ReindexJob>,
    state: watch::Sender<SchedulerState>,
    mut shutdown: watch::Receiver<bool>,
    cycles: Arc<AtomicUsize>,
) {
    let set_state = |s: SchedulerState| {
        state.send_replace(s);
    };
    info!(interval_secs = job.interval.as_secs(), "reindex scheduler started");

    loop {
        tokio::select! {
            result = job.cycle(job.scheduled_refresh(), &set_state) => {
                match result {
                    Ok(report) => info!(
                        chunks = report.chunks,
                        fingerprint = %report.fingerprint,
                        complete = report.outcome.is_complete(),
                        "reindex cycle finished"
                    ),
                    Err(e) => error!(error = %e, "reindex cycle aborted"),
                }
                cycles.fetch_add(1, Ordering::SeqCst);
            }
            _ = shutdown.changed() => break,
        }
        set_state(SchedulerState::Idle);

        tokio::select! {
            _ = tokio::time::sleep(job.interval) => {}
            _ = shutdown.changed() => break,
        }
    }

    set_state(SchedulerState::Idle);
    info!("reindex scheduler stopped");
}
