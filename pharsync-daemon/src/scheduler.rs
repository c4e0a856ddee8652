//! Drives reconciliation: readiness wait, the initial full pass, then one
//! batch per coalesced wake-up.
//!
//! ```text
//! Starting → WaitingForSync → InitialReconcile → SteadyState → Stopped
//! ```
//!
//! Batches never overlap. Every task of a batch is joined before the next
//! drain, so one identity never has two reconciles in flight. Shutdown is
//! only observed between batches; a running batch always completes.

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;

use pharsync_core::Identity;
use pharsync_sync::{ArtifactSyncer, StatusWrite, SyncOutcome};

use crate::coalescer::ChangeCoalescer;
use crate::error::DaemonError;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    WaitingForSync,
    InitialReconcile,
    SteadyState,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Starting => "starting",
            Phase::WaitingForSync => "waiting-for-sync",
            Phase::InitialReconcile => "initial-reconcile",
            Phase::SteadyState => "steady-state",
            Phase::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Exponential retry schedule for the readiness wait.
///
/// `steps` is the number of readiness checks; the delays between them start
/// at `initial` and grow by `factor`. The default checks four times, sleeping
/// 10ms, 50ms and 250ms in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: u32,
    pub steps: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            factor: 5,
            steps: 4,
        }
    }
}

impl Backoff {
    /// Sleeps between consecutive checks (`steps - 1` of them).
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let factor = self.factor;
        std::iter::successors(Some(self.initial), move |prev| prev.checked_mul(factor))
            .take(self.steps.saturating_sub(1) as usize)
    }
}

// ---------------------------------------------------------------------------
// BatchReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub unchanged: usize,
    pub downloaded: usize,
    pub deleted: usize,
    pub absent: usize,
    pub failed: usize,
    /// Downloads whose checksum write-back failed (conflicts excluded).
    pub status_failures: usize,
    pub duration: Duration,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.unchanged + self.downloaded + self.deleted + self.absent + self.failed
    }

    fn record(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Unchanged => self.unchanged += 1,
            SyncOutcome::Downloaded { status, .. } => {
                self.downloaded += 1;
                if *status == StatusWrite::Failed {
                    self.status_failures += 1;
                }
            }
            SyncOutcome::Deleted => self.deleted += 1,
            SyncOutcome::Absent => self.absent += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// ReconcileScheduler
// ---------------------------------------------------------------------------

pub struct ReconcileScheduler {
    syncer: ArtifactSyncer,
    backoff: Backoff,
    phase: watch::Sender<Phase>,
}

impl ReconcileScheduler {
    pub fn new(syncer: ArtifactSyncer, backoff: Backoff) -> Self {
        let (phase, _) = watch::channel(Phase::Starting);
        Self {
            syncer,
            backoff,
            phase,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: Phase) {
        self.phase.send_replace(phase);
        tracing::debug!(phase = %phase, "scheduler phase changed");
    }

    /// Runs until shutdown is broadcast or every notifier is gone.
    ///
    /// Fails only if the initial list fails.
    pub async fn run(
        &self,
        mut coalescer: ChangeCoalescer,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), DaemonError> {
        self.enter(Phase::WaitingForSync);
        if !self.wait_for_sync().await {
            tracing::warn!("store did not report synced, reconciling anyway");
        }

        self.enter(Phase::InitialReconcile);
        if let Err(err) = self.reconcile_initial().await {
            self.enter(Phase::Stopped);
            return Err(err);
        }

        self.enter(Phase::SteadyState);
        tracing::info!("initial reconcile done, watching for changes");
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                woke = coalescer.wait() => {
                    if !woke {
                        tracing::info!("change notifications closed, stopping scheduler");
                        break;
                    }
                    let pending = coalescer.drain();
                    if pending.is_empty() {
                        continue;
                    }
                    // Awaited inside the arm: shutdown is not polled until
                    // the whole batch is joined.
                    self.reconcile_batch(pending).await;
                }
            }
        }

        self.enter(Phase::Stopped);
        Ok(())
    }

    /// Polls store readiness following the backoff schedule. Returns whether
    /// readiness was observed.
    pub async fn wait_for_sync(&self) -> bool {
        let store = self.syncer.store();
        if store.has_synced().await {
            return true;
        }
        for delay in self.backoff.delays() {
            tracing::info!(retry_in_ms = delay.as_millis() as u64, "waiting for initial sync");
            tokio::time::sleep(delay).await;
            if store.has_synced().await {
                return true;
            }
        }
        false
    }

    /// Reconciles every identity the store lists, as one batch.
    pub async fn reconcile_initial(&self) -> Result<BatchReport, DaemonError> {
        let resources = self.syncer.store().list().await.map_err(|err| {
            tracing::error!(error = %err, "failed to list plugins");
            err
        })?;
        let identities: HashSet<Identity> = resources.iter().map(|r| r.identity()).collect();
        Ok(self.reconcile_batch(identities).await)
    }

    /// One task per identity; returns after every task has finished.
    /// Per-identity failures are logged and counted, never propagated.
    pub async fn reconcile_batch<I>(&self, identities: I) -> BatchReport
    where
        I: IntoIterator<Item = Identity>,
    {
        let started = Instant::now();
        let mut tasks = JoinSet::new();
        for identity in identities {
            let syncer = self.syncer.clone();
            tasks.spawn(async move {
                let result = syncer.reconcile(&identity).await;
                (identity, result)
            });
        }
        tracing::info!(plugins = tasks.len(), "reconciling plugins");

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((identity, Ok(outcome))) => {
                    tracing::debug!(identity = %identity, outcome = outcome.label(), "reconciled plugin");
                    report.record(&outcome);
                }
                Ok((identity, Err(err))) => {
                    tracing::error!(identity = %identity, error = %err, "error reconciling plugin");
                    report.failed += 1;
                }
                Err(err) => {
                    tracing::error!(error = %err, "reconcile task join failure");
                    report.failed += 1;
                }
            }
        }
        report.duration = started.elapsed();

        tracing::info!(
            total = report.total(),
            unchanged = report.unchanged,
            downloaded = report.downloaded,
            deleted = report.deleted,
            absent = report.absent,
            failed = report.failed,
            duration_ms = report.duration.as_millis() as u64,
            "reconciliation complete",
        );
        report
    }
}
