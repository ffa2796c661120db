//! Worker pool orchestration.
//!
//! Corpus files go into one shuffled queue. Worker threads pop chunks,
//! run load, claim, evaluate and persist for each file, put their own
//! crashed files back while attempts remain, and reshuffle so concurrent
//! runs over the same output directory rarely collide on the same file.

use crate::claim::{ClaimOutcome, ClaimStore, RecordState};
use crate::corpus::{self, SchemaJob};
use crate::eval::Evaluate;
use crate::result::{BenchError, BenchResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pool settings
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker threads
    pub workers: usize,
    /// Upper bound on files per queue pop
    pub chunk_size: usize,
    /// Times this run may try one file
    pub max_attempts: u32,
    /// Shuffle seed; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            chunk_size: 100,
            max_attempts: 1,
            seed: None,
        }
    }
}

/// Counts for one chunk: finished files, unfinished files, queue length after
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Files in the chunk that now have a final record
    pub done: usize,
    /// Files in the chunk that do not
    pub not_done: usize,
    /// Files left in the queue
    pub left: usize,
}

impl fmt::Display for ChunkProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {}; {} left", self.done, self.not_done, self.left)
    }
}

/// Receives progress from the pool. Called from worker threads.
pub trait ProgressSink: Sync {
    /// Queue built with `queued` files
    fn started(&self, _queued: usize) {}

    /// A chunk finished
    fn chunk_done(&self, _progress: &ChunkProgress) {}

    /// All workers returned
    fn finished(&self, _summary: &PoolSummary) {}
}

/// Sink that ignores progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Totals for one pool run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    /// Files given to the run
    pub total_files: usize,
    /// Files this run finished
    pub completed: usize,
    /// Finished files whose schema was rejected
    pub compile_errors: usize,
    /// Finished files with a wrong verdict
    pub validation_errors: usize,
    /// Files that already had a final record
    pub already_done: usize,
    /// Files held by another owner or lost to a racing claimer
    pub skipped: usize,
    /// Files whose pipeline panicked or failed to persist, attempts exhausted
    pub crashed: usize,
    /// Files that could not be read as corpus files
    pub invalid_inputs: usize,
    /// Results discarded because the claim was taken over
    pub ownership_lost: usize,
    /// Wall time, milliseconds
    pub elapsed_ms: u64,
}

impl PoolSummary {
    fn merge(mut self, other: &Self) -> Self {
        self.completed += other.completed;
        self.compile_errors += other.compile_errors;
        self.validation_errors += other.validation_errors;
        self.already_done += other.already_done;
        self.skipped += other.skipped;
        self.crashed += other.crashed;
        self.invalid_inputs += other.invalid_inputs;
        self.ownership_lost += other.ownership_lost;
        self
    }
}

/// Append-only `log.txt` shared by all workers
#[derive(Debug)]
pub struct DiagnosticLog {
    file: Mutex<File>,
}

impl DiagnosticLog {
    /// Open `path` for appending
    pub fn open(path: &Path) -> BenchResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append one timestamped entry
    pub fn append(&self, entry: &str) {
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let mut file = lock(&self.file);
        if let Err(e) = writeln!(file, "{stamp} {entry}") {
            tracing::warn!(error = %e, "failed to write diagnostic log");
        }
    }
}

#[derive(Debug, Clone)]
struct WorkItem {
    path: PathBuf,
    job_id: String,
    attempts: u32,
}

#[derive(Debug)]
struct Queue {
    items: Vec<WorkItem>,
    rng: StdRng,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FileOutcome {
    Completed { compile_error: bool, validation_error: bool },
    Skipped,
    InvalidInput(String),
    OwnershipLost,
    Crashed(String),
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_string())
}

/// Runs a corpus through one engine
#[derive(Debug)]
pub struct WorkerPool<'a> {
    ctx: &'a dyn Evaluate,
    store: &'a ClaimStore,
    config: PoolConfig,
    log: Option<DiagnosticLog>,
}

impl<'a> WorkerPool<'a> {
    /// Pool over a shared evaluator and claim store
    #[must_use]
    pub fn new(ctx: &'a dyn Evaluate, store: &'a ClaimStore, config: PoolConfig) -> Self {
        Self {
            ctx,
            store,
            config,
            log: None,
        }
    }

    /// Append chunk summaries and crash details to `log`
    #[must_use]
    pub fn with_log(mut self, log: DiagnosticLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Process every file and return the totals
    pub fn run(&self, files: &[PathBuf], progress: &dyn ProgressSink) -> BenchResult<PoolSummary> {
        if self.config.chunk_size == 0 || self.config.max_attempts == 0 {
            return Err(BenchError::config("chunk_size and max_attempts must be at least 1"));
        }
        let start = Instant::now();
        let mut summary = PoolSummary {
            total_files: files.len(),
            ..PoolSummary::default()
        };
        let mut items = self.initial_queue(files, &mut summary);

        let mut rng = self.config.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        items.shuffle(&mut rng);
        let queued = items.len();
        tracing::info!(
            queued,
            already_done = summary.already_done,
            skipped = summary.skipped,
            engine = %self.ctx.engine_name(),
            "starting pool"
        );
        progress.started(queued);

        let workers = self.config.workers.max(1).min(queued.max(1));
        let queue = Mutex::new(Queue { items, rng });
        let tallies: Vec<PoolSummary> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| s.spawn(|| self.worker(&queue, workers, progress)))
                .collect();
            handles
                .into_iter()
                .filter_map(|h| match h.join() {
                    Ok(tally) => Some(tally),
                    Err(payload) => {
                        tracing::error!(error = %panic_message(payload.as_ref()), "worker thread died");
                        None
                    }
                })
                .collect()
        });

        summary = tallies.iter().fold(summary, PoolSummary::merge);
        summary.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            completed = summary.completed,
            compile_errors = summary.compile_errors,
            validation_errors = summary.validation_errors,
            crashed = summary.crashed,
            elapsed_ms = summary.elapsed_ms,
            "pool finished"
        );
        progress.finished(&summary);
        Ok(summary)
    }

    fn initial_queue(&self, files: &[PathBuf], summary: &mut PoolSummary) -> Vec<WorkItem> {
        let mut items = Vec::with_capacity(files.len());
        for path in files {
            let job_id = match corpus::job_id(path) {
                Ok(id) => id,
                Err(e) => {
                    summary.invalid_inputs += 1;
                    self.note(&e.to_string());
                    continue;
                }
            };
            let state = self.store.state(&job_id);
            let runnable = state == RecordState::Missing
                || self.store.is_reclaimable(&self.store.path(&job_id), &state);
            match state {
                RecordState::Final(_) => summary.already_done += 1,
                _ if runnable => items.push(WorkItem {
                    path: path.clone(),
                    job_id,
                    attempts: 0,
                }),
                RecordState::Unreadable(detail) => {
                    tracing::debug!(job = %job_id, %detail, "unreadable record, leaving it alone");
                    summary.skipped += 1;
                }
                RecordState::Pending(_) | RecordState::Missing => summary.skipped += 1,
            }
        }
        items
    }

    fn worker(&self, queue: &Mutex<Queue>, workers: usize, progress: &dyn ProgressSink) -> PoolSummary {
        let mut tally = PoolSummary::default();
        loop {
            let chunk: Vec<WorkItem> = {
                let mut q = lock(queue);
                if q.items.is_empty() {
                    break;
                }
                let n = self.config.chunk_size.min(q.items.len() / workers + 1);
                q.items.drain(..n).collect()
            };

            let mut retry = Vec::new();
            let (mut done, mut not_done) = (0, 0);
            for item in chunk {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(&item)))
                    .unwrap_or_else(|payload| FileOutcome::Crashed(panic_message(payload.as_ref())));
                match &outcome {
                    FileOutcome::Completed {
                        compile_error,
                        validation_error,
                    } => {
                        tally.completed += 1;
                        tally.compile_errors += usize::from(*compile_error);
                        tally.validation_errors += usize::from(*validation_error);
                    }
                    FileOutcome::Skipped => tally.skipped += 1,
                    FileOutcome::InvalidInput(detail) => {
                        tally.invalid_inputs += 1;
                        self.note(&format!("invalid input {}: {detail}", item.path.display()));
                    }
                    FileOutcome::OwnershipLost => {
                        tally.ownership_lost += 1;
                        self.note(&format!("claim on {} was taken over", item.job_id));
                    }
                    FileOutcome::Crashed(detail) => {
                        let attempt = item.attempts + 1;
                        tracing::warn!(file = %item.path.display(), attempt, %detail, "file crashed");
                        self.note(&format!(
                            "crash in {} (attempt {attempt}): {detail}",
                            item.path.display()
                        ));
                        if attempt < self.config.max_attempts {
                            retry.push(WorkItem {
                                attempts: attempt,
                                ..item.clone()
                            });
                        } else {
                            tally.crashed += 1;
                        }
                    }
                }
                if self.store.is_done(&item.job_id) {
                    done += 1;
                } else {
                    not_done += 1;
                }
            }

            let left = {
                let mut q = lock(queue);
                q.items.extend(retry);
                let Queue { items, rng } = &mut *q;
                items.shuffle(rng);
                items.len()
            };
            let chunk_progress = ChunkProgress { done, not_done, left };
            tracing::info!("{chunk_progress}");
            self.note(&chunk_progress.to_string());
            progress.chunk_done(&chunk_progress);
        }
        tally
    }

    fn process(&self, item: &WorkItem) -> FileOutcome {
        let job = match SchemaJob::load(&item.path) {
            Ok(job) => job,
            Err(e) => return FileOutcome::InvalidInput(e.to_string()),
        };
        let claimed = if item.attempts == 0 {
            self.store.try_claim(&item.job_id)
        } else {
            self.store.retry_own(&item.job_id)
        };
        let claim = match claimed {
            Ok(ClaimOutcome::Claimed(claim)) => claim,
            Ok(ClaimOutcome::AlreadyClaimedOrDone) => return FileOutcome::Skipped,
            Err(e) => return FileOutcome::Crashed(format!("claim failed: {e}")),
        };

        tracing::debug!(job = %job.id, tests = job.tests.len(), "evaluating");
        let result = self.ctx.evaluate_job(&job);
        let compile_error = result.compile_error.is_some();
        let validation_error = result.validation_error.is_some();
        match self.store.complete(claim, result) {
            Ok(()) => FileOutcome::Completed {
                compile_error,
                validation_error,
            },
            Err(BenchError::OwnershipLost { .. }) => FileOutcome::OwnershipLost,
            Err(e) => FileOutcome::Crashed(format!("persist failed: {e}")),
        }
    }

    fn note(&self, entry: &str) {
        if let Some(log) = &self.log {
            log.append(entry);
        }
    }
}
