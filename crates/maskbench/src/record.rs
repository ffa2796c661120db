//! On-disk records.
//!
//! Every output file is either a pending marker (a claim in progress) or a
//! final result, tagged by `status`. Files written before the tag existed
//! are recognised by their fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Final per-job result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Corpus file basename
    pub id: String,
    /// Compile plus matcher construction, microseconds
    pub ttfm_us: u64,
    /// Equal to `ttfm_us` for a single job; a maximum once aggregated
    pub max_ttfm_us: u64,
    /// Sum of per-token step latencies
    pub masks_us: u64,
    /// Slowest single step
    pub max_mask_us: u64,
    /// Tokens stepped across all tests
    pub num_tokens: u64,
    /// Tests in the corpus file
    pub num_tests: u64,
    /// Every step latency, in order
    #[serde(default)]
    pub all_mask_us: Vec<u64>,
    /// Valid instances the engine accepted
    pub num_valid_tests: u64,
    /// Invalid instances the engine rejected
    pub num_invalid_tests: u64,
    /// Engine refused the schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<String>,
    /// First verdict that disagreed with its label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
}

impl JobResult {
    /// Result for a schema the engine refused
    #[must_use]
    pub fn compile_failed(id: impl Into<String>, num_tests: usize, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            num_tests: num_tests as u64,
            compile_error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Whether the schema compiled and every test matched its label
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.compile_error.is_none() && self.validation_error.is_none()
    }
}

/// Claim placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMarker {
    /// Always 1
    #[serde(default = "one")]
    pub pending_file: u8,
    /// Run that holds the claim
    #[serde(default)]
    pub run_id: String,
    /// Owning process
    #[serde(default)]
    pub pid: u32,
    /// Owning host
    #[serde(default)]
    pub host: String,
    /// When the claim was taken
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

const fn one() -> u8 {
    1
}

impl PendingMarker {
    /// Marker for the given owner, stamped now
    #[must_use]
    pub fn new(run_id: impl Into<String>, pid: u32, host: impl Into<String>) -> Self {
        Self {
            pending_file: 1,
            run_id: run_id.into(),
            pid,
            host: host.into(),
            claimed_at: Some(Utc::now()),
        }
    }

    /// Whether both markers name the same run and process
    #[must_use]
    pub fn same_owner(&self, other: &Self) -> bool {
        self.run_id == other.run_id && self.pid == other.pid && self.host == other.host
    }
}

/// Content of an output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoredRecord {
    /// Claimed, not finished
    Pending(PendingMarker),
    /// Finished
    Final(JobResult),
}

impl StoredRecord {
    /// Parse a record, accepting untagged files from older runs
    pub fn parse(text: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        if value.get("status").is_some() {
            return serde_json::from_value(value).map_err(|e| e.to_string());
        }
        if value.get("num_tests").is_some() {
            return serde_json::from_value(value)
                .map(Self::Final)
                .map_err(|e| e.to_string());
        }
        if value.get("pending_file").is_some() {
            return serde_json::from_value(value)
                .map(Self::Pending)
                .map_err(|e| e.to_string());
        }
        Err("neither a pending marker nor a result".to_string())
    }

    /// Serialize for writing
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_final_is_tagged() {
        let record = StoredRecord::Final(JobResult {
            id: "a.json".into(),
            num_tests: 2,
            ..JobResult::default()
        });
        let text = record.to_json().unwrap();
        assert!(text.contains("\"status\": \"final\""));
        assert!(!text.contains("compile_error"));
        assert_eq!(StoredRecord::parse(&text).unwrap(), record);
    }

    #[test]
    fn test_pending_is_tagged() {
        let marker = PendingMarker::new("run-1", 42, "host-a");
        let text = StoredRecord::Pending(marker.clone()).to_json().unwrap();
        assert!(text.contains("\"status\": \"pending\""));
        assert!(text.contains("\"pending_file\": 1"));
        match StoredRecord::parse(&text).unwrap() {
            StoredRecord::Pending(back) => assert!(back.same_owner(&marker)),
            StoredRecord::Final(_) => panic!("expected pending"),
        }
    }

    #[test]
    fn test_legacy_records() {
        let legacy_pending = StoredRecord::parse("{\"pending_file\": 1}").unwrap();
        assert!(matches!(legacy_pending, StoredRecord::Pending(PendingMarker { pid: 0, .. })));

        let legacy_final = StoredRecord::parse(
            r#"{"id": "x.json", "ttfm_us": 10, "max_ttfm_us": 10, "masks_us": 0, "max_mask_us": 0,
                "num_tokens": 0, "num_tests": 0, "all_mask_us": [], "num_valid_tests": 0,
                "num_invalid_tests": 0, "compile_error": "boom"}"#,
        )
        .unwrap();
        match legacy_final {
            StoredRecord::Final(result) => assert_eq!(result.compile_error.as_deref(), Some("boom")),
            StoredRecord::Pending(_) => panic!("expected final"),
        }
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(StoredRecord::parse("{\"hello\": 1}").is_err());
        assert!(StoredRecord::parse("{").is_err());
    }

    #[test]
    fn test_compile_failed_zeroes_counters() {
        let result = JobResult::compile_failed("s.json", 4, "unsupported keyword");
        assert_eq!(result.num_tests, 4);
        assert_eq!(result.num_tokens, 0);
        assert_eq!(result.num_valid_tests + result.num_invalid_tests, 0);
        assert!(!result.is_ok());
    }
}
