//! maskbench: correctness and latency harness for grammar-constrained
//! decoding engines.
//!
//! A corpus of JSON-Schema files, each carrying labelled test instances, is
//! pushed through an engine under test. For every schema the harness times
//! compilation (time to first mask), then tokenizes each instance and steps
//! the matcher token by token, timing each step and checking the verdict
//! against the label. Results land as one JSON record per corpus file and
//! are aggregated into percentile summaries, histograms and comparison
//! tables.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────┐   ┌────────────┐
//! │ corpus   │──►│ claim store │──►│ engine   │──►│ evaluator  │
//! │ (*.json) │   │ (pending)   │   │ compile  │   │ step/time  │
//! └──────────┘   └─────────────┘   └──────────┘   └─────┬──────┘
//!                       ▲                               │
//!                       └──────── final record ◄────────┘
//!                                      │
//!                               ┌──────▼──────┐
//!                               │ stats/report│
//!                               └─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use maskbench::{EngineKind, EvalContext, SchemaJob, TokenizerSpec};
//! use serde_json::json;
//!
//! let tokenizer = TokenizerSpec::Bytes.build().unwrap();
//! let ctx = EvalContext::new(EngineKind::Interpreter, tokenizer);
//! let job = SchemaJob::new(
//!     "int.json",
//!     json!({"type": "integer"}),
//!     vec![
//!         maskbench::TestCase { data: json!(5), valid: true },
//!         maskbench::TestCase { data: json!("x"), valid: false },
//!     ],
//! );
//! let result = ctx.evaluate(&job);
//! assert_eq!(result.num_valid_tests, 1);
//! assert_eq!(result.num_invalid_tests, 1);
//! assert!(result.is_ok());
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Token-allowance bitmasks and score masking backends
pub mod bitmask;

/// Crash-tolerant per-file claims
#[allow(clippy::missing_errors_doc)]
pub mod claim;

/// Run configuration
#[allow(clippy::missing_errors_doc)]
pub mod config;

/// Corpus files and input expansion
#[allow(clippy::missing_errors_doc)]
pub mod corpus;

/// Engines under test
pub mod engine;

/// Token stream evaluation
#[allow(clippy::cast_possible_truncation)]
pub mod eval;

/// Process limits and owner liveness checks
#[allow(clippy::missing_errors_doc)]
pub mod limits;

/// Worker pool
#[allow(clippy::missing_errors_doc, clippy::cast_precision_loss)]
pub mod pool;

/// On-disk records
pub mod record;

mod result;

/// Aggregation and reports
#[allow(
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub mod stats;

/// Worker process supervision
#[allow(clippy::missing_errors_doc)]
pub mod supervise;

/// Tokenizer interface and reference tokenizers
#[allow(clippy::missing_errors_doc)]
pub mod tokenizer;

pub use bitmask::{MaskBackend, MaskWord, Scores, TokenBitmask};
pub use claim::{Claim, ClaimOutcome, ClaimStore, Owner, ReclaimPolicy, RecordState, Released};
pub use config::RunConfig;
pub use corpus::{expand_inputs, job_id, SchemaJob, TestCase};
pub use engine::{EngineKind, Matcher, SchemaRejected};
pub use eval::{EvalContext, Evaluate, FailureKind, TestOutcome, ValidationError};
pub use pool::{ChunkProgress, DiagnosticLog, NoProgress, PoolConfig, PoolSummary, ProgressSink, WorkerPool};
pub use record::{JobResult, PendingMarker, StoredRecord};
pub use result::{BenchError, BenchResult};
pub use stats::{aggregate_dir, Aggregate, AggregateStats, LatencySummary};
pub use supervise::{CommandLauncher, Supervisor, SupervisorSummary, WorkerExit, WorkerLauncher};
pub use tokenizer::{ByteTokenizer, TokenId, Tokenizer, TokenizerSpec, VocabTokenizer};
