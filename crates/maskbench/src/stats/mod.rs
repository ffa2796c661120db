//! Statistics over an output directory.
//!
//! All `*.json` records are read in name order and folded into one
//! [`AggregateStats`]. Sorting the latency samples for percentiles is the
//! only order-dependent step, so the result depends only on the record set.

pub mod histogram;
pub mod report;

pub use histogram::{cutoff_curve, percentile, CutoffPoint, LatencySummary, LogDecadeHistogram};

use crate::claim::RecordState;
use crate::eval::FailureKind;
use crate::record::JobResult;
use crate::result::BenchResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Corpus-level totals for one engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Engine name (last component of the output directory)
    pub engine: String,
    /// Record files read
    pub num_files: u64,
    /// Final records
    pub num_schemas: u64,
    /// Pending markers and unreadable files
    pub num_crashes: u64,
    /// Schemas the engine refused
    pub num_compile_errors: u64,
    /// Schemas with a wrong verdict
    pub num_validation_errors: u64,
    /// Of those, invalid instances accepted
    pub num_false_accepts: u64,
    /// Of those, valid instances rejected
    pub num_false_rejects: u64,
    /// Schemas compiled with every verdict right
    pub num_schemas_ok: u64,
    /// Tests across all final records
    pub num_tests: u64,
    /// Valid instances accepted
    pub num_valid_tests: u64,
    /// Invalid instances rejected
    pub num_invalid_tests: u64,
    /// Tokens stepped
    pub num_tokens: u64,
    /// Sum of time to first mask
    pub ttfm_us: u64,
    /// Slowest time to first mask
    pub max_ttfm_us: u64,
    /// Sum of step latencies
    pub masks_us: u64,
    /// Slowest step
    pub max_mask_us: u64,
    /// Mean time to first mask over compiled schemas
    pub avg_ttfm_us: f64,
    /// Mean step latency
    pub avg_mask_us: f64,
    /// Mean tokens per test of compiled schemas
    pub avg_tokens_per_test: f64,
    /// Time-to-first-mask percentiles
    pub ttfm: LatencySummary,
    /// Step latency percentiles
    pub mask: LatencySummary,
}

/// Fold state for [`AggregateStats`]
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    stats: AggregateStats,
    ttfm_samples: Vec<u64>,
    mask_samples: Vec<u64>,
    compiled_tests: u64,
}

impl Accumulator {
    /// Fold in one record file
    #[must_use]
    pub fn absorb(mut self, state: &RecordState) -> Self {
        match state {
            RecordState::Missing => return self,
            RecordState::Pending(_) | RecordState::Unreadable(_) => {
                self.stats.num_files += 1;
                self.stats.num_crashes += 1;
                return self;
            }
            RecordState::Final(result) => {
                self.stats.num_files += 1;
                self = self.absorb_result(result);
            }
        }
        self
    }

    /// Fold in one final result
    #[must_use]
    pub fn absorb_result(mut self, r: &JobResult) -> Self {
        let s = &mut self.stats;
        s.num_schemas += 1;
        s.num_tests += r.num_tests;
        if r.compile_error.is_some() {
            s.num_compile_errors += 1;
            return self;
        }
        s.ttfm_us += r.ttfm_us;
        s.max_ttfm_us = s.max_ttfm_us.max(r.max_ttfm_us);
        s.masks_us += r.masks_us;
        s.max_mask_us = s.max_mask_us.max(r.max_mask_us);
        s.num_tokens += r.num_tokens;
        s.num_valid_tests += r.num_valid_tests;
        s.num_invalid_tests += r.num_invalid_tests;
        match r.validation_error.as_deref() {
            Some(message) => {
                s.num_validation_errors += 1;
                match FailureKind::from_message(message) {
                    Some(FailureKind::FalseAccept) => s.num_false_accepts += 1,
                    Some(FailureKind::FalseReject) => s.num_false_rejects += 1,
                    None => {}
                }
            }
            None => s.num_schemas_ok += 1,
        }
        self.compiled_tests += r.num_tests;
        self.ttfm_samples.push(r.ttfm_us);
        self.mask_samples.extend_from_slice(&r.all_mask_us);
        self
    }

    /// Sort samples and derive averages and percentiles
    #[must_use]
    pub fn finish(mut self, engine: impl Into<String>) -> Aggregate {
        self.ttfm_samples.sort_unstable();
        self.mask_samples.sort_unstable();
        let s = &mut self.stats;
        s.engine = engine.into();
        let compiled = s.num_schemas - s.num_compile_errors;
        s.avg_ttfm_us = ratio(s.ttfm_us, compiled);
        s.avg_mask_us = ratio(s.masks_us, s.num_tokens);
        s.avg_tokens_per_test = ratio(s.num_tokens, self.compiled_tests);
        s.ttfm = LatencySummary::from_sorted(&self.ttfm_samples);
        s.mask = LatencySummary::from_sorted(&self.mask_samples);
        Aggregate {
            stats: self.stats,
            ttfm_us: self.ttfm_samples,
            mask_us: self.mask_samples,
        }
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Totals plus the sorted samples they were computed from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    /// Totals
    pub stats: AggregateStats,
    /// Time-to-first-mask samples, ascending
    pub ttfm_us: Vec<u64>,
    /// Step latency samples, ascending
    pub mask_us: Vec<u64>,
}

/// CSV files written next to a summary
pub const CSV_FILES: [&str; 4] = [
    "ttfm_us.csv",
    "masks_us.csv",
    "ttfm_histogram.csv",
    "masks_histogram.csv",
];

impl Aggregate {
    /// Write cutoff curves and log-decade histograms into `dir`
    pub fn write_csvs(&self, dir: &Path) -> BenchResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let contents = [
            histogram::cutoff_csv(&cutoff_curve(&self.ttfm_us)),
            histogram::cutoff_csv(&cutoff_curve(&self.mask_us)),
            LogDecadeHistogram::from_samples(&self.ttfm_us).to_csv(),
            LogDecadeHistogram::from_samples(&self.mask_us).to_csv(),
        ];
        let mut written = Vec::with_capacity(CSV_FILES.len());
        for (name, body) in CSV_FILES.iter().zip(contents) {
            let path = dir.join(name);
            std::fs::write(&path, body)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// `*.json` files of an output directory, sorted by name
pub fn record_files(dir: &Path) -> BenchResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Engine name of an output directory: its last path component
#[must_use]
pub fn engine_name(dir: &Path) -> String {
    dir.components()
        .next_back()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Aggregate every record in `dir`
pub fn aggregate_dir(dir: &Path) -> BenchResult<Aggregate> {
    let files = record_files(dir)?;
    tracing::debug!(dir = %dir.display(), files = files.len(), "aggregating");
    let acc = files
        .iter()
        .fold(Accumulator::default(), |acc, path| acc.absorb(&RecordState::read(path)));
    Ok(acc.finish(engine_name(dir)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::record::{PendingMarker, StoredRecord};
    use std::fs;

    fn final_result(id: &str, ttfm: u64, masks: &[u64], error: Option<&str>) -> JobResult {
        JobResult {
            id: id.to_string(),
            ttfm_us: ttfm,
            max_ttfm_us: ttfm,
            masks_us: masks.iter().sum(),
            max_mask_us: masks.iter().copied().max().unwrap_or(0),
            num_tokens: masks.len() as u64,
            num_tests: 2,
            all_mask_us: masks.to_vec(),
            num_valid_tests: 1,
            num_invalid_tests: u64::from(error.is_none()),
            compile_error: None,
            validation_error: error.map(str::to_string),
        }
    }

    fn write(dir: &Path, name: &str, record: &StoredRecord) {
        fs::write(dir.join(name), record.to_json().unwrap()).unwrap();
    }

    #[test]
    fn test_fold_counts() {
        let acc = Accumulator::default()
            .absorb_result(&final_result("a", 100, &[1, 2, 3], None))
            .absorb_result(&final_result("b", 300, &[10], Some("test #1: should reject but didn't")))
            .absorb_result(&JobResult::compile_failed("c", 5, "nope"))
            .absorb(&RecordState::Pending(PendingMarker::new("r", 1, "h")));
        let agg = acc.finish("guide");
        let s = &agg.stats;
        assert_eq!(s.engine, "guide");
        assert_eq!(s.num_files, 1);
        assert_eq!(s.num_schemas, 3);
        assert_eq!(s.num_crashes, 1);
        assert_eq!(s.num_compile_errors, 1);
        assert_eq!(s.num_validation_errors, 1);
        assert_eq!(s.num_false_accepts, 1);
        assert_eq!(s.num_false_rejects, 0);
        assert_eq!(s.num_schemas_ok, 1);
        assert_eq!(s.num_tests, 9);
        assert_eq!(s.num_tokens, 4);
        assert_eq!(s.ttfm_us, 400);
        assert_eq!(s.max_ttfm_us, 300);
        assert_eq!(s.masks_us, 16);
        assert_eq!(s.max_mask_us, 10);
        assert!((s.avg_ttfm_us - 200.0).abs() < f64::EPSILON);
        assert!((s.avg_mask_us - 4.0).abs() < f64::EPSILON);
        assert!((s.avg_tokens_per_test - 1.0).abs() < f64::EPSILON);
        assert_eq!(s.mask.count, 4);
        assert_eq!(s.mask.max, 10);
        assert_eq!(agg.mask_us, vec![1, 2, 3, 10]);
    }

    #[test]
    fn test_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let agg = aggregate_dir(dir.path()).unwrap();
        assert_eq!(agg.stats.num_files, 0);
        assert_eq!(agg.stats.avg_mask_us, 0.0);
        assert_eq!(agg.stats.ttfm, LatencySummary::default());
    }

    #[test]
    fn test_aggregate_dir_reads_only_json() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("interpreter");
        fs::create_dir(&out).unwrap();
        write(&out, "a.json", &StoredRecord::Final(final_result("a.json", 50, &[4, 6], None)));
        write(&out, "b.json", &StoredRecord::Pending(PendingMarker::new("r", 1, "h")));
        fs::write(out.join("log.txt"), "0 + 1; 0 left\n").unwrap();
        fs::write(out.join("c.json"), "garbage").unwrap();

        let agg = aggregate_dir(&out).unwrap();
        assert_eq!(agg.stats.engine, "interpreter");
        assert_eq!(agg.stats.num_files, 3);
        assert_eq!(agg.stats.num_schemas, 1);
        assert_eq!(agg.stats.num_crashes, 2);
        assert_eq!(agg.stats.num_tokens, 2);
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let records = [
            final_result("x", 7, &[5, 1], None),
            final_result("y", 3, &[9], None),
        ];
        write(first.path(), "1.json", &StoredRecord::Final(records[0].clone()));
        write(first.path(), "2.json", &StoredRecord::Final(records[1].clone()));
        write(second.path(), "1.json", &StoredRecord::Final(records[1].clone()));
        write(second.path(), "2.json", &StoredRecord::Final(records[0].clone()));
        let a = aggregate_dir(first.path()).unwrap();
        let b = aggregate_dir(second.path()).unwrap();
        assert_eq!(a.ttfm_us, b.ttfm_us);
        assert_eq!(a.mask_us, b.mask_us);
        assert_eq!(a.stats.ttfm, b.stats.ttfm);
        assert_eq!(a.stats.num_tokens, b.stats.num_tokens);
    }

    #[test]
    fn test_write_csvs() {
        let dir = tempfile::tempdir().unwrap();
        let agg = Accumulator::default()
            .absorb_result(&final_result("a", 20, &[2, 30, 400], None))
            .finish("x");
        let written = agg.write_csvs(dir.path()).unwrap();
        assert_eq!(written.len(), 4);
        let masks = fs::read_to_string(dir.path().join("masks_us.csv")).unwrap();
        assert!(masks.starts_with("cutoff time,count left\n"));
        let hist = fs::read_to_string(dir.path().join("masks_histogram.csv")).unwrap();
        assert_eq!(hist.lines().count(), 4);
    }

    #[test]
    fn test_engine_name() {
        assert_eq!(engine_name(Path::new("tmp/out/guide")), "guide");
        assert_eq!(engine_name(Path::new("tmp/out/guide/")), "guide");
    }
}
