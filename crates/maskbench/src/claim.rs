//! Filesystem job claims.
//!
//! A job is claimed by writing a pending marker to a temp file and linking
//! it into place as `<output_dir>/<job_id>`, failing if that name exists.
//! The owner later replaces the marker with the final record through a temp
//! file and rename. Both steps are atomic, so readers never see an empty or
//! half-written record. Any number of threads and processes can share one
//! output directory.
//!
//! Pending markers from other runs are never treated as finished work.
//! Whether one may be taken over is decided by [`ReclaimPolicy`]; takeovers
//! and completions are serialized by a create-only `<job_id>.takeover` lock.
//! Markers of the store's own run are left to the run itself
//! ([`ClaimStore::retry_own`], [`ClaimStore::release_run`]).

use crate::limits;
use crate::record::{JobResult, PendingMarker, StoredRecord};
use crate::result::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// When a record left by another run may be taken over. Unreadable records
/// follow the same policy; `DeadOwner` treats them as abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ReclaimRepr", into = "ReclaimRepr")]
pub enum ReclaimPolicy {
    /// Leave foreign markers alone; they count as crashes
    Never,
    /// Take over markers whose process is gone from this host
    #[default]
    DeadOwner,
    /// Take over markers older than this many seconds
    OlderThan(u64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ReclaimRepr {
    Name(String),
    Age { older_than_secs: u64 },
}

impl TryFrom<ReclaimRepr> for ReclaimPolicy {
    type Error = String;

    fn try_from(repr: ReclaimRepr) -> Result<Self, Self::Error> {
        match repr {
            ReclaimRepr::Name(name) => Self::parse(&name, None),
            ReclaimRepr::Age { older_than_secs } => Ok(Self::OlderThan(older_than_secs)),
        }
    }
}

impl From<ReclaimPolicy> for ReclaimRepr {
    fn from(policy: ReclaimPolicy) -> Self {
        match policy {
            ReclaimPolicy::Never => Self::Name("never".into()),
            ReclaimPolicy::DeadOwner => Self::Name("dead_owner".into()),
            ReclaimPolicy::OlderThan(secs) => Self::Age {
                older_than_secs: secs,
            },
        }
    }
}

impl ReclaimPolicy {
    /// Parse a policy name. `older_than` needs `stale_after_secs`.
    pub fn parse(name: &str, stale_after_secs: Option<u64>) -> Result<Self, String> {
        match (name.replace('-', "_").as_str(), stale_after_secs) {
            ("never", _) => Ok(Self::Never),
            ("dead_owner", _) => Ok(Self::DeadOwner),
            ("older_than", Some(secs)) => Ok(Self::OlderThan(secs)),
            ("older_than", None) => Err("older_than needs an age in seconds".to_string()),
            _ => Err(format!(
                "unknown reclaim policy '{name}' (expected never, dead_owner or older_than)"
            )),
        }
    }
}

/// Identity written into pending markers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    run_id: String,
    pid: u32,
    host: String,
}

impl Owner {
    /// A fresh run in this process
    #[must_use]
    pub fn current() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), std::process::id(), limits::hostname())
    }

    /// Explicit identity
    #[must_use]
    pub fn new(run_id: impl Into<String>, pid: u32, host: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            pid,
            host: host.into(),
        }
    }

    /// Run id
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn marker(&self) -> PendingMarker {
        PendingMarker::new(self.run_id.clone(), self.pid, self.host.clone())
    }

    fn owns(&self, marker: &PendingMarker) -> bool {
        marker.run_id == self.run_id && marker.pid == self.pid && marker.host == self.host
    }
}

/// Exclusive right to finish one job. Consumed by [`ClaimStore::complete`].
#[derive(Debug)]
pub struct Claim {
    job_id: String,
    marker: PendingMarker,
}

impl Claim {
    /// Claimed job
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

/// Own-run markers found by [`ClaimStore::release_run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Released {
    /// Markers removed so the job can be claimed again
    pub retried: Vec<String>,
    /// Markers left pending
    pub kept: Vec<String>,
}

/// Result of a claim attempt
#[derive(Debug)]
pub enum ClaimOutcome {
    /// The caller now owns the job
    Claimed(Claim),
    /// Someone else holds it or it is finished
    AlreadyClaimedOrDone,
}

impl ClaimOutcome {
    /// The claim, if one was taken
    #[must_use]
    pub fn claimed(self) -> Option<Claim> {
        match self {
            Self::Claimed(claim) => Some(claim),
            Self::AlreadyClaimedOrDone => None,
        }
    }
}

/// What an output file currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordState {
    /// No file
    Missing,
    /// Claimed, not finished
    Pending(PendingMarker),
    /// Finished
    Final(JobResult),
    /// Present but not a record
    Unreadable(String),
}

impl RecordState {
    /// Read and classify the file at `path`
    #[must_use]
    pub fn read(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => match StoredRecord::parse(&text) {
                Ok(StoredRecord::Pending(marker)) => Self::Pending(marker),
                Ok(StoredRecord::Final(result)) => Self::Final(result),
                Err(detail) => Self::Unreadable(detail),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Self::Missing,
            Err(e) => Self::Unreadable(e.to_string()),
        }
    }

    /// Whether a final record is present
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Final(_))
    }
}

/// Claim store rooted at one output directory
#[derive(Debug)]
pub struct ClaimStore {
    dir: PathBuf,
    owner: Owner,
    reclaim: ReclaimPolicy,
}

impl ClaimStore {
    /// Open (creating if needed) the output directory
    pub fn open(dir: impl Into<PathBuf>, owner: Owner) -> BenchResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            owner,
            reclaim: ReclaimPolicy::default(),
        })
    }

    /// Set the reclaim policy
    #[must_use]
    pub const fn with_reclaim(mut self, reclaim: ReclaimPolicy) -> Self {
        self.reclaim = reclaim;
        self
    }

    /// Output directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Identity used for claims
    #[must_use]
    pub const fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Output location of a job
    #[must_use]
    pub fn path(&self, job_id: &str) -> PathBuf {
        self.dir.join(job_id)
    }

    /// Current content of a job's output file
    #[must_use]
    pub fn state(&self, job_id: &str) -> RecordState {
        RecordState::read(&self.path(job_id))
    }

    /// Whether a final record exists for the job
    #[must_use]
    pub fn is_done(&self, job_id: &str) -> bool {
        self.state(job_id).is_final()
    }

    /// Claim a job by linking a pending marker into place, failing if the
    /// output file exists. An existing record of another run is taken over
    /// only if the reclaim policy allows it.
    pub fn try_claim(&self, job_id: &str) -> BenchResult<ClaimOutcome> {
        let path = self.path(job_id);
        let marker = self.owner.marker();
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        temp.write_all(StoredRecord::Pending(marker.clone()).to_json()?.as_bytes())?;
        match temp.persist_noclobber(&path) {
            Ok(_) => {
                tracing::trace!(job = job_id, "claimed");
                Ok(ClaimOutcome::Claimed(Claim {
                    job_id: job_id.to_string(),
                    marker,
                }))
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                let found = self.state(job_id);
                if self.is_reclaimable(&path, &found) {
                    self.take_over(job_id, &found)
                } else {
                    Ok(ClaimOutcome::AlreadyClaimedOrDone)
                }
            }
            Err(e) => Err(e.error.into()),
        }
    }

    /// Re-claim a job this run claimed earlier and did not finish
    pub fn retry_own(&self, job_id: &str) -> BenchResult<ClaimOutcome> {
        match self.state(job_id) {
            RecordState::Pending(marker) if self.owner.owns(&marker) => Ok(ClaimOutcome::Claimed(Claim {
                job_id: job_id.to_string(),
                marker,
            })),
            RecordState::Missing => self.try_claim(job_id),
            _ => Ok(ClaimOutcome::AlreadyClaimedOrDone),
        }
    }

    /// Whether a record found on disk may be taken over. Final records and
    /// markers of this store's own run never are.
    #[must_use]
    pub fn is_reclaimable(&self, path: &Path, state: &RecordState) -> bool {
        match (state, self.reclaim) {
            (RecordState::Missing | RecordState::Final(_), _) | (_, ReclaimPolicy::Never) => false,
            (RecordState::Pending(marker), _) if marker.run_id == self.owner.run_id => false,
            (RecordState::Pending(marker), ReclaimPolicy::DeadOwner) => {
                marker.host == self.owner.host
                    && marker.pid != 0
                    && (!limits::pid_alive(marker.pid) || marker.pid == self.owner.pid)
            }
            // claims and results are written whole, so nobody is still writing it
            (RecordState::Unreadable(_), ReclaimPolicy::DeadOwner) => true,
            (_, ReclaimPolicy::OlderThan(secs)) => {
                marker_age(path).is_some_and(|age| age >= Duration::from_secs(secs))
            }
        }
    }

    /// Release the pending markers `run_id` left behind, typically after a
    /// worker process of that run died. A marker is removed when `retry`
    /// returns true for its job, so the job can be claimed again; otherwise
    /// it stays pending.
    pub fn release_run(&self, run_id: &str, mut retry: impl FnMut(&str) -> bool) -> BenchResult<Released> {
        let mut names: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        let mut released = Released::default();
        for job_id in names {
            let RecordState::Pending(marker) = self.state(&job_id) else {
                continue;
            };
            if marker.run_id != run_id {
                continue;
            }
            if !retry(&job_id) {
                released.kept.push(job_id);
                continue;
            }
            let Some(_lock) = TakeoverLock::acquire(&self.dir, &job_id)? else {
                released.kept.push(job_id);
                continue;
            };
            match self.state(&job_id) {
                RecordState::Pending(current) if current == marker => {}
                _ => continue,
            }
            fs::remove_file(self.path(&job_id))?;
            tracing::debug!(job = %job_id, run = run_id, "released abandoned claim");
            released.retried.push(job_id);
        }
        Ok(released)
    }

    /// Persist the final record and release the claim. Fails with
    /// `OwnershipLost` if the marker no longer names this owner.
    pub fn complete(&self, claim: Claim, result: JobResult) -> BenchResult<()> {
        let lost = || BenchError::OwnershipLost {
            job_id: claim.job_id.clone(),
        };
        let Some(_lock) = TakeoverLock::acquire(&self.dir, &claim.job_id)? else {
            return Err(lost());
        };
        match self.state(&claim.job_id) {
            RecordState::Pending(current) if current.same_owner(&claim.marker) => {}
            _ => return Err(lost()),
        }
        write_atomic(&self.path(&claim.job_id), &StoredRecord::Final(result))?;
        tracing::trace!(job = %claim.job_id, "completed");
        Ok(())
    }

    fn take_over(&self, job_id: &str, seen: &RecordState) -> BenchResult<ClaimOutcome> {
        let Some(_lock) = TakeoverLock::acquire(&self.dir, job_id)? else {
            return Ok(ClaimOutcome::AlreadyClaimedOrDone);
        };
        // the record must be the one the policy judged
        if self.state(job_id) != *seen {
            return Ok(ClaimOutcome::AlreadyClaimedOrDone);
        }
        let marker = self.owner.marker();
        write_atomic(&self.path(job_id), &StoredRecord::Pending(marker.clone()))?;
        match seen {
            RecordState::Pending(previous) => tracing::info!(
                job = job_id,
                previous_run = %previous.run_id,
                previous_pid = previous.pid,
                "took over abandoned claim"
            ),
            _ => tracing::info!(job = job_id, "took over unreadable record"),
        }
        Ok(ClaimOutcome::Claimed(Claim {
            job_id: job_id.to_string(),
            marker,
        }))
    }
}

fn marker_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    SystemTime::now().duration_since(modified).ok()
}

fn write_atomic(path: &Path, record: &StoredRecord) -> BenchResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(record.to_json()?.as_bytes())?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// `<job_id>.takeover`, removed on drop
#[derive(Debug)]
struct TakeoverLock {
    path: PathBuf,
}

impl TakeoverLock {
    fn acquire(dir: &Path, job_id: &str) -> BenchResult<Option<Self>> {
        let path = dir.join(format!("{job_id}.takeover"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Some(Self { path })),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TakeoverLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove takeover lock");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn store(dir: &Path, run: &str) -> ClaimStore {
        ClaimStore::open(dir, Owner::new(run, std::process::id(), limits::hostname()))
            .unwrap()
            .with_reclaim(ReclaimPolicy::Never)
    }

    /// Same host, a pid that cannot be alive
    fn dead(dir: &Path, run: &str) -> ClaimStore {
        ClaimStore::open(dir, Owner::new(run, u32::MAX, limits::hostname())).unwrap()
    }

    fn result(id: &str) -> JobResult {
        JobResult {
            id: id.to_string(),
            num_tests: 1,
            num_valid_tests: 1,
            ..JobResult::default()
        }
    }

    mod claim_tests {
        use super::*;

        #[test]
        fn test_claim_then_complete() {
            let dir = tempfile::tempdir().unwrap();
            let store = store(dir.path(), "run-a");
            let claim = store.try_claim("a.json").unwrap().claimed().unwrap();
            assert_eq!(claim.job_id(), "a.json");
            assert!(matches!(store.state("a.json"), RecordState::Pending(_)));
            assert!(!store.is_done("a.json"));

            store.complete(claim, result("a.json")).unwrap();
            assert!(store.is_done("a.json"));
            assert!(!dir.path().join("a.json.takeover").exists());
            let text = fs::read_to_string(dir.path().join("a.json")).unwrap();
            assert!(text.contains("\"status\": \"final\""));
        }

        #[test]
        fn test_claim_leaves_only_the_marker() {
            let dir = tempfile::tempdir().unwrap();
            let store = store(dir.path(), "run-a");
            let _claim = store.try_claim("a.json").unwrap().claimed().unwrap();
            assert!(store.try_claim("a.json").unwrap().claimed().is_none());
            let names: Vec<_> = fs::read_dir(dir.path())
                .unwrap()
                .map(|e| e.unwrap().file_name().into_string().unwrap())
                .collect();
            assert_eq!(names, vec!["a.json"]);
            let text = fs::read_to_string(dir.path().join("a.json")).unwrap();
            assert!(matches!(StoredRecord::parse(&text), Ok(StoredRecord::Pending(_))));
        }

        #[test]
        fn test_second_claim_fails() {
            let dir = tempfile::tempdir().unwrap();
            let a = store(dir.path(), "run-a");
            let b = store(dir.path(), "run-b");
            assert!(a.try_claim("x.json").unwrap().claimed().is_some());
            assert!(a.try_claim("x.json").unwrap().claimed().is_none());
            assert!(b.try_claim("x.json").unwrap().claimed().is_none());
        }

        #[test]
        fn test_done_job_is_never_claimed() {
            let dir = tempfile::tempdir().unwrap();
            let a = store(dir.path(), "run-a").with_reclaim(ReclaimPolicy::OlderThan(0));
            let claim = a.try_claim("x.json").unwrap().claimed().unwrap();
            a.complete(claim, result("x.json")).unwrap();
            let b = store(dir.path(), "run-b").with_reclaim(ReclaimPolicy::OlderThan(0));
            assert!(b.try_claim("x.json").unwrap().claimed().is_none());
        }

        #[test]
        fn test_concurrent_claimers_get_one_winner() {
            let dir = tempfile::tempdir().unwrap();
            let wins = Arc::new(AtomicUsize::new(0));
            std::thread::scope(|s| {
                for i in 0..8 {
                    let wins = Arc::clone(&wins);
                    let path = dir.path();
                    s.spawn(move || {
                        let store = store(path, &format!("run-{i}"));
                        if store.try_claim("race.json").unwrap().claimed().is_some() {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                    });
                }
            });
            assert_eq!(wins.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn test_retry_own_only() {
            let dir = tempfile::tempdir().unwrap();
            let a = store(dir.path(), "run-a");
            let b = store(dir.path(), "run-b");
            let first = a.try_claim("x.json").unwrap().claimed().unwrap();
            drop(first);
            assert!(b.retry_own("x.json").unwrap().claimed().is_none());
            let again = a.retry_own("x.json").unwrap().claimed().unwrap();
            a.complete(again, result("x.json")).unwrap();
            assert!(a.is_done("x.json"));
        }
    }

    mod reclaim_tests {
        use super::*;

        #[test]
        fn test_never_leaves_foreign_marker() {
            let dir = tempfile::tempdir().unwrap();
            let a = store(dir.path(), "run-a");
            let _held = a.try_claim("x.json").unwrap().claimed().unwrap();
            let b = store(dir.path(), "run-b");
            assert!(b.try_claim("x.json").unwrap().claimed().is_none());
        }

        #[test]
        fn test_older_than_takes_over_and_old_owner_loses() {
            let dir = tempfile::tempdir().unwrap();
            let a = store(dir.path(), "run-a");
            let stale = a.try_claim("x.json").unwrap().claimed().unwrap();

            let b = store(dir.path(), "run-b").with_reclaim(ReclaimPolicy::OlderThan(0));
            let fresh = b.try_claim("x.json").unwrap().claimed().unwrap();

            let err = a.complete(stale, result("x.json")).unwrap_err();
            assert!(matches!(err, BenchError::OwnershipLost { .. }));
            b.complete(fresh, result("x.json")).unwrap();
            assert!(b.is_done("x.json"));
        }

        #[test]
        fn test_dead_owner_same_process_other_run() {
            let dir = tempfile::tempdir().unwrap();
            let a = store(dir.path(), "run-a");
            let _abandoned = a.try_claim("x.json").unwrap().claimed().unwrap();
            let b = store(dir.path(), "run-b").with_reclaim(ReclaimPolicy::DeadOwner);
            assert!(b.try_claim("x.json").unwrap().claimed().is_some());
        }

        #[test]
        fn test_dead_owner_ignores_other_hosts() {
            let dir = tempfile::tempdir().unwrap();
            let remote = ClaimStore::open(dir.path(), Owner::new("run-r", 1, "elsewhere")).unwrap();
            let _held = remote.try_claim("x.json").unwrap().claimed().unwrap();
            let b = store(dir.path(), "run-b").with_reclaim(ReclaimPolicy::DeadOwner);
            assert!(b.try_claim("x.json").unwrap().claimed().is_none());
        }

        #[test]
        fn test_default_policy_is_dead_owner() {
            assert_eq!(ReclaimPolicy::default(), ReclaimPolicy::DeadOwner);
            let dir = tempfile::tempdir().unwrap();
            let _abandoned = dead(dir.path(), "run-a").try_claim("x.json").unwrap();
            let b = ClaimStore::open(dir.path(), Owner::current()).unwrap();
            assert!(b.try_claim("x.json").unwrap().claimed().is_some());
        }

        #[test]
        fn test_own_run_markers_are_never_reclaimed() {
            let dir = tempfile::tempdir().unwrap();
            let _abandoned = dead(dir.path(), "run-a").try_claim("x.json").unwrap();
            let same_run = store(dir.path(), "run-a").with_reclaim(ReclaimPolicy::DeadOwner);
            assert!(same_run.try_claim("x.json").unwrap().claimed().is_none());
            let same_run = store(dir.path(), "run-a").with_reclaim(ReclaimPolicy::OlderThan(0));
            assert!(same_run.try_claim("x.json").unwrap().claimed().is_none());
        }

        #[test]
        fn test_unreadable_record_follows_policy() {
            for (policy, reclaimed) in [
                (ReclaimPolicy::Never, false),
                (ReclaimPolicy::DeadOwner, true),
                (ReclaimPolicy::OlderThan(0), true),
                (ReclaimPolicy::OlderThan(3600), false),
            ] {
                let dir = tempfile::tempdir().unwrap();
                fs::write(dir.path().join("x.json"), "").unwrap();
                let b = store(dir.path(), "run-b").with_reclaim(policy);
                let claim = b.try_claim("x.json").unwrap().claimed();
                assert_eq!(claim.is_some(), reclaimed, "{policy:?}");
                if let Some(claim) = claim {
                    b.complete(claim, result("x.json")).unwrap();
                    assert!(b.is_done("x.json"));
                }
            }
        }

        #[test]
        fn test_held_lock_blocks_takeover() {
            let dir = tempfile::tempdir().unwrap();
            let a = store(dir.path(), "run-a");
            let _held = a.try_claim("x.json").unwrap().claimed().unwrap();
            fs::write(dir.path().join("x.json.takeover"), "").unwrap();
            let b = store(dir.path(), "run-b").with_reclaim(ReclaimPolicy::OlderThan(0));
            assert!(b.try_claim("x.json").unwrap().claimed().is_none());
        }

        #[test]
        fn test_policy_parse_and_yaml() {
            assert_eq!(ReclaimPolicy::parse("never", None).unwrap(), ReclaimPolicy::Never);
            assert_eq!(ReclaimPolicy::parse("dead-owner", None).unwrap(), ReclaimPolicy::DeadOwner);
            assert_eq!(
                ReclaimPolicy::parse("older_than", Some(60)).unwrap(),
                ReclaimPolicy::OlderThan(60)
            );
            assert!(ReclaimPolicy::parse("older_than", None).is_err());
            assert!(ReclaimPolicy::parse("sometimes", None).is_err());

            let policy: ReclaimPolicy = serde_yaml_ng::from_str("older_than_secs: 30").unwrap();
            assert_eq!(policy, ReclaimPolicy::OlderThan(30));
            let policy: ReclaimPolicy = serde_yaml_ng::from_str("dead_owner").unwrap();
            assert_eq!(policy, ReclaimPolicy::DeadOwner);
            assert_eq!(serde_json::to_string(&ReclaimPolicy::Never).unwrap(), "\"never\"");
        }
    }

    mod release_tests {
        use super::*;

        #[test]
        fn test_release_run_removes_only_that_run() {
            let dir = tempfile::tempdir().unwrap();
            let crashed = dead(dir.path(), "run-a");
            let _a = crashed.try_claim("a.json").unwrap().claimed().unwrap();
            let _b = crashed.try_claim("b.json").unwrap().claimed().unwrap();
            let other = store(dir.path(), "run-b");
            let _c = other.try_claim("c.json").unwrap().claimed().unwrap();
            let done = crashed.try_claim("d.json").unwrap().claimed().unwrap();
            crashed.complete(done, result("d.json")).unwrap();

            let released = other.release_run("run-a", |job| job == "a.json").unwrap();
            assert_eq!(released.retried, vec!["a.json"]);
            assert_eq!(released.kept, vec!["b.json"]);
            assert_eq!(other.state("a.json"), RecordState::Missing);
            assert!(matches!(other.state("b.json"), RecordState::Pending(_)));
            assert!(matches!(other.state("c.json"), RecordState::Pending(_)));
            assert!(other.is_done("d.json"));
            assert!(other.try_claim("a.json").unwrap().claimed().is_some());
        }
    }

    #[test]
    fn test_unreadable_state() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("junk.json"), "not json").unwrap();
        let store = store(dir.path(), "run-a");
        assert!(matches!(store.state("junk.json"), RecordState::Unreadable(_)));
        assert_eq!(store.state("absent.json"), RecordState::Missing);
        assert!(store.try_claim("junk.json").unwrap().claimed().is_none());
    }
}
