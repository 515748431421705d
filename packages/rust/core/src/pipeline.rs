//! Pipeline coordinator: one reconciliation run per dataset.
//!
//! `Start → LoadSnapshot → FetchRanking → Reconcile → Delete → Update → Insert → Done`
//!
//! A run never returns an error. Failures before reconciliation end the run
//! as [`RunOutcome::Failed`]; batch failures are recorded and the run moves on.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use newsmirror_enricher::Enricher;
use newsmirror_shared::{AppConfig, Dataset, NewsMirrorError, Result};
use newsmirror_source::HnClient;
use newsmirror_storage::DocumentStore;

use crate::normalize::Normalizer;
use crate::reconcile::{Reconciler, Skip, diff};
use crate::snapshot::load_snapshot;
use crate::writer::{delete_batch, insert_batch, update_batch};

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    LoadSnapshot,
    FetchRanking,
    Reconcile,
    Delete,
    Update,
    Insert,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::LoadSnapshot => "load-snapshot",
            Self::FetchRanking => "fetch-ranking",
            Self::Reconcile => "reconcile",
            Self::Delete => "delete",
            Self::Update => "update",
            Self::Insert => "insert",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Final state of a run.
#[derive(Debug)]
pub enum RunOutcome {
    Done,
    Failed {
        stage: Stage,
        error: NewsMirrorError,
    },
}

/// Sizes of the id partitions computed for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionCounts {
    pub stored: usize,
    pub fresh: usize,
    pub removed: usize,
    pub new: usize,
    pub changed: usize,
}

/// Result of one write batch.
#[derive(Debug)]
pub struct BatchReport {
    pub stage: Stage,
    /// Number of operations the batch carried.
    pub attempted: usize,
    /// Number of operations applied, or why the batch was rolled back.
    pub result: Result<usize>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything a run did.
#[derive(Debug)]
pub struct RunReport {
    /// Dataset name as requested.
    pub dataset: String,
    pub outcome: RunOutcome,
    pub counts: PartitionCounts,
    /// One entry per write stage reached, in order.
    pub batches: Vec<BatchReport>,
    pub skipped: Vec<Skip>,
    pub elapsed: Duration,
}

impl RunReport {
    fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            outcome: RunOutcome::Done,
            counts: PartitionCounts::default(),
            batches: Vec::new(),
            skipped: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.outcome, RunOutcome::Done)
    }

    /// Batch report for a write stage, if that stage was reached.
    pub fn batch(&self, stage: Stage) -> Option<&BatchReport> {
        self.batches.iter().find(|b| b.stage == stage)
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, dataset: &str, stage: Stage);
    /// Called after each new or changed item has been fetched (or skipped).
    fn item_fetched(&self, current: usize, total: usize);
    /// Called when the run ends, successfully or not.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _dataset: &str, _stage: Stage) {}
    fn item_fetched(&self, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Runs reconciliation for named datasets against one store.
pub struct Pipeline<S> {
    client: HnClient,
    normalizer: Normalizer,
    store: S,
    concurrency: usize,
}

impl<S: DocumentStore> Pipeline<S> {
    pub fn new(client: HnClient, normalizer: Normalizer, store: S, concurrency: usize) -> Self {
        Self {
            client,
            normalizer,
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Build a pipeline from the application config.
    pub fn from_config(config: &AppConfig, store: S) -> Result<Self> {
        let client = HnClient::new(&config.source)?;
        let enricher = if config.enrichment.enabled {
            Some(Enricher::new(&config.enrichment)?)
        } else {
            None
        };
        let normalizer = Normalizer::new(config.source.item_link_base.clone(), enricher);
        Ok(Self::new(
            client,
            normalizer,
            store,
            config.pipeline.concurrency,
        ))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconcile one dataset. Never fails; see [`RunReport::outcome`].
    #[instrument(skip_all, fields(dataset = %dataset_name))]
    pub async fn run(&self, dataset_name: &str, progress: &dyn ProgressReporter) -> RunReport {
        let start = Instant::now();
        let mut report = RunReport::new(dataset_name);

        progress.phase(dataset_name, Stage::Start);
        match dataset_name.parse::<Dataset>() {
            Ok(dataset) => self.run_dataset(dataset, &mut report, progress).await,
            Err(e) => fail(&mut report, Stage::Start, e),
        }

        report.elapsed = start.elapsed();
        if report.is_done() {
            progress.phase(dataset_name, Stage::Done);
            info!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                skipped = report.skipped.len(),
                "run complete"
            );
        }
        progress.done(&report);
        report
    }

    async fn run_dataset(
        &self,
        dataset: Dataset,
        report: &mut RunReport,
        progress: &dyn ProgressReporter,
    ) {
        let name = dataset.name();

        // --- LoadSnapshot ---
        progress.phase(name, Stage::LoadSnapshot);
        let snapshot = match load_snapshot(&self.store, dataset).await {
            Ok(s) => s,
            Err(e) => return fail(report, Stage::LoadSnapshot, e),
        };

        // --- FetchRanking ---
        progress.phase(name, Stage::FetchRanking);
        let ranking = match self.client.ranking_url(dataset) {
            Ok(url) => self.client.fetch_ranking(&url).await,
            Err(e) => Err(e),
        };
        let fresh = match ranking {
            Ok(ids) => ids,
            Err(e) => return fail(report, Stage::FetchRanking, e),
        };

        // --- Reconcile ---
        progress.phase(name, Stage::Reconcile);
        let partition = diff(&snapshot.ids(), &fresh);
        report.counts = PartitionCounts {
            stored: snapshot.len(),
            fresh: partition.fresh.len(),
            removed: partition.removed.len(),
            new: partition.new.len(),
            changed: partition.changed.len(),
        };
        info!(
            stored = report.counts.stored,
            fresh = report.counts.fresh,
            removed = report.counts.removed,
            new = report.counts.new,
            changed = report.counts.changed,
            "diff computed"
        );

        let reconciler = Reconciler::new(&self.client, &self.normalizer, self.concurrency);
        let plan = reconciler
            .reconcile(&snapshot.items, partition, Utc::now(), progress)
            .await;

        // --- Delete ---
        progress.phase(name, Stage::Delete);
        let result = delete_batch(&self.store, dataset, &plan.to_delete, &snapshot.handles).await;
        record_batch(report, Stage::Delete, plan.to_delete.len(), result);

        // --- Update ---
        progress.phase(name, Stage::Update);
        let result = update_batch(&self.store, dataset, &plan.to_update, &snapshot.handles).await;
        record_batch(report, Stage::Update, plan.to_update.len(), result);

        // --- Insert ---
        progress.phase(name, Stage::Insert);
        let result = insert_batch(&self.store, dataset, &plan.to_insert).await;
        record_batch(report, Stage::Insert, plan.to_insert.len(), result);

        report.skipped = plan.skipped;
    }
}

fn fail(report: &mut RunReport, stage: Stage, error: NewsMirrorError) {
    error!(dataset = %report.dataset, %stage, error = %error, "run failed");
    report.outcome = RunOutcome::Failed { stage, error };
}

fn record_batch(report: &mut RunReport, stage: Stage, attempted: usize, result: Result<usize>) {
    if let Err(e) = &result {
        warn!(dataset = %report.dataset, %stage, attempted, error = %e, "batch failed, continuing");
    }
    report.batches.push(BatchReport {
        stage,
        attempted,
        result,
    });
}
