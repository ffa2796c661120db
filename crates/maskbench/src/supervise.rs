//! Worker process supervision.
//!
//! Panics are caught per file inside the pool, but an abort, a failed
//! allocation under the memory ceiling, or a stack overflow takes the whole
//! process down. In isolated mode the pool runs in a child process that
//! shares the supervisor's run id. When a child dies, the supervisor
//! releases the pending markers that run left behind so the next child can
//! claim them again. A file that has been pending in `max_attempts` dead
//! children stays pending and is reported as abandoned.

use crate::claim::ClaimStore;
use crate::pool::DiagnosticLog;
use crate::result::{BenchError, BenchResult};
use serde::Serialize;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

/// How a worker process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Exited successfully
    Finished,
    /// Exited with an error or was killed
    Died(String),
}

/// Starts one worker process for a run and waits for it
pub trait WorkerLauncher {
    /// Run a worker that claims under `run_id`
    fn launch(&mut self, run_id: &str) -> BenchResult<WorkerExit>;
}

/// Launches `program args... <run_id_flag> <run_id>`
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    run_id_flag: String,
}

impl CommandLauncher {
    /// Launcher for `program` with fixed `args`
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>, run_id_flag: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            run_id_flag: run_id_flag.into(),
        }
    }
}

impl WorkerLauncher for CommandLauncher {
    fn launch(&mut self, run_id: &str) -> BenchResult<WorkerExit> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.run_id_flag)
            .arg(run_id)
            .status()?;
        Ok(if status.success() {
            WorkerExit::Finished
        } else {
            WorkerExit::Died(describe_exit(status))
        })
    }
}

/// `exit code N`, `killed by signal N`, or a fallback
#[must_use]
pub fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("killed by signal {signal}");
        }
    }
    "terminated abnormally".to_string()
}

/// Totals for one supervised run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorSummary {
    /// Worker processes started
    pub launches: u32,
    /// Worker processes that died
    pub deaths: u32,
    /// Pending markers released for another try
    pub released: usize,
    /// Files left pending after killing `max_attempts` workers
    pub abandoned: Vec<String>,
    /// How the last worker died, if it did
    pub last_failure: Option<String>,
}

impl SupervisorSummary {
    /// Whether the last worker exited successfully
    #[must_use]
    pub const fn finished(&self) -> bool {
        self.last_failure.is_none()
    }
}

/// Relaunches worker processes until one finishes or no progress is possible
#[derive(Debug)]
pub struct Supervisor<'a> {
    store: &'a ClaimStore,
    max_attempts: u32,
    log: Option<&'a DiagnosticLog>,
}

impl<'a> Supervisor<'a> {
    /// Supervise the run that owns `store`
    #[must_use]
    pub const fn new(store: &'a ClaimStore, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
            log: None,
        }
    }

    /// Record worker deaths in `log`
    #[must_use]
    pub const fn with_log(mut self, log: &'a DiagnosticLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Launch workers until one finishes. After a death the run's markers
    /// are released and another worker is started, unless the death freed
    /// nothing and abandoned nothing new.
    pub fn run(&self, launcher: &mut dyn WorkerLauncher) -> BenchResult<SupervisorSummary> {
        if self.max_attempts == 0 {
            return Err(BenchError::config("max_attempts must be at least 1"));
        }
        let run_id = self.store.owner().run_id().to_string();
        let mut deaths: HashMap<String, u32> = HashMap::new();
        let mut summary = SupervisorSummary::default();
        loop {
            summary.launches += 1;
            let detail = match launcher.launch(&run_id)? {
                WorkerExit::Finished => {
                    summary.last_failure = None;
                    break;
                }
                WorkerExit::Died(detail) => detail,
            };
            summary.deaths += 1;
            tracing::warn!(run = %run_id, launch = summary.launches, %detail, "worker process died");
            self.note(&format!("worker process died ({detail})"));
            summary.last_failure = Some(detail);

            let released = self.store.release_run(&run_id, |job| {
                let count = deaths.entry(job.to_string()).or_insert(0);
                *count += 1;
                *count < self.max_attempts
            })?;
            let mut newly_abandoned = 0;
            for job in released.kept {
                if !summary.abandoned.contains(&job) {
                    self.note(&format!("gave up on {job}: pending in {} dead workers", self.max_attempts));
                    summary.abandoned.push(job);
                    newly_abandoned += 1;
                }
            }
            summary.released += released.retried.len();
            if released.retried.is_empty() && newly_abandoned == 0 {
                break;
            }
        }
        Ok(summary)
    }

    fn note(&self, entry: &str) {
        if let Some(log) = self.log {
            log.append(entry);
        }
    }
}
