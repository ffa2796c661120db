//! Token stream evaluation.
//!
//! For each test instance the evaluator serializes the data compactly,
//! tokenizes it, and steps a fresh fork of the compiled matcher one token at
//! a time, timing every step. The first rejected token ends the instance.
//! The verdict is then compared with the instance's label.

use crate::corpus::{SchemaJob, TestCase};
use crate::engine::{EngineKind, Matcher};
use crate::record::JobResult;
use crate::tokenizer::{TokenId, Tokenizer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Immutable evaluation settings shared by every worker
#[derive(Debug, Clone)]
pub struct EvalContext {
    engine: EngineKind,
    tokenizer: Arc<dyn Tokenizer>,
    require_complete: bool,
}

impl EvalContext {
    /// Context for `engine` over `tokenizer`
    #[must_use]
    pub fn new(engine: EngineKind, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            engine,
            tokenizer,
            require_complete: false,
        }
    }

    /// Count an instance as accepted only if the matcher ends in an
    /// accepting state
    #[must_use]
    pub const fn with_require_complete(mut self, require_complete: bool) -> Self {
        self.require_complete = require_complete;
        self
    }

    /// Engine under test
    #[must_use]
    pub const fn engine(&self) -> EngineKind {
        self.engine
    }

    /// Shared tokenizer
    #[must_use]
    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    /// Evaluate every test of `job`
    #[must_use]
    pub fn evaluate(&self, job: &SchemaJob) -> JobResult {
        let start = Instant::now();
        let matcher = match self.engine.compile(&job.schema, &self.tokenizer) {
            Ok(matcher) => matcher,
            Err(rejected) => {
                tracing::debug!(job = %job.id, engine = %self.engine, error = %rejected, "schema rejected");
                return JobResult::compile_failed(&job.id, job.tests.len(), rejected.detail);
            }
        };
        let ttfm_us = elapsed_us(start);

        let outcomes = job
            .tests
            .iter()
            .map(|test| self.run_test(&matcher, test));
        let mut result = JobResult {
            id: job.id.clone(),
            ttfm_us,
            max_ttfm_us: ttfm_us,
            num_tests: job.tests.len() as u64,
            ..JobResult::default()
        };
        let mut first_error: Option<ValidationError> = None;
        for (index, (test, outcome)) in job.tests.iter().zip(outcomes).enumerate() {
            result.num_tokens += outcome.mask_us.len() as u64;
            result.masks_us += outcome.mask_us.iter().sum::<u64>();
            result.max_mask_us = outcome.mask_us.iter().copied().fold(result.max_mask_us, u64::max);
            result.all_mask_us.extend_from_slice(&outcome.mask_us);
            match Verdict::judge(outcome.accepted, test.valid) {
                Verdict::ValidAccepted => result.num_valid_tests += 1,
                Verdict::InvalidRejected => result.num_invalid_tests += 1,
                Verdict::Wrong(kind) => {
                    first_error.get_or_insert(ValidationError {
                        test_index: index,
                        kind,
                    });
                }
            }
        }
        result.validation_error = first_error.map(|e| e.to_string());
        result
    }

    /// Step a fresh fork of `matcher` through one instance
    #[must_use]
    pub fn run_test(&self, matcher: &Matcher, test: &TestCase) -> TestOutcome {
        let text = test.data.to_string();
        let tokens = self.tokenizer.tokenize(&text);
        step_tokens(matcher.fork(), &tokens, self.require_complete)
    }
}

/// Turns a loaded job into its result. The worker pool runs jobs through
/// this trait.
pub trait Evaluate: fmt::Debug + Sync {
    /// Engine name used in pool logs
    fn engine_name(&self) -> String;

    /// Evaluate every test of `job`
    fn evaluate_job(&self, job: &SchemaJob) -> JobResult;
}

impl Evaluate for EvalContext {
    fn engine_name(&self) -> String {
        self.engine.to_string()
    }

    fn evaluate_job(&self, job: &SchemaJob) -> JobResult {
        self.evaluate(job)
    }
}

/// What happened to one instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOutcome {
    /// Engine accepted every token (and, if required, ended complete)
    pub accepted: bool,
    /// Latency of every step taken, microseconds
    pub mask_us: Vec<u64>,
}

/// Step `matcher` through `tokens`, stopping at the first rejection
#[must_use]
pub fn step_tokens(mut matcher: Matcher, tokens: &[TokenId], require_complete: bool) -> TestOutcome {
    let mut outcome = TestOutcome {
        accepted: true,
        mask_us: Vec::with_capacity(tokens.len()),
    };
    for &token in tokens {
        let start = Instant::now();
        let ok = matcher.step(token);
        outcome.mask_us.push(elapsed_us(start));
        if !ok {
            outcome.accepted = false;
            return outcome;
        }
    }
    if require_complete && !matcher.is_accepting() {
        outcome.accepted = false;
    }
    outcome
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    ValidAccepted,
    InvalidRejected,
    Wrong(FailureKind),
}

impl Verdict {
    const fn judge(accepted: bool, valid: bool) -> Self {
        match (accepted, valid) {
            (true, true) => Self::ValidAccepted,
            (false, false) => Self::InvalidRejected,
            (true, false) => Self::Wrong(FailureKind::FalseAccept),
            (false, true) => Self::Wrong(FailureKind::FalseReject),
        }
    }
}

/// Direction of a wrong verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Engine accepted an invalid instance
    FalseAccept,
    /// Engine rejected a valid instance
    FalseReject,
}

const FALSE_ACCEPT: &str = "should reject but didn't";
const FALSE_REJECT: &str = "should accept but didn't";

impl FailureKind {
    /// Classify a stored `validation_error` message
    #[must_use]
    pub fn from_message(message: &str) -> Option<Self> {
        if message.ends_with(FALSE_ACCEPT) {
            Some(Self::FalseAccept)
        } else if message.ends_with(FALSE_REJECT) {
            Some(Self::FalseReject)
        } else {
            None
        }
    }
}

/// First disagreement between an engine verdict and a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationError {
    /// Zero-based position of the test in the corpus file
    pub test_index: usize,
    /// Direction of the error
    pub kind: FailureKind,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            FailureKind::FalseAccept => FALSE_ACCEPT,
            FailureKind::FalseReject => FALSE_REJECT,
        };
        write!(f, "test #{}: {what}", self.test_index)
    }
}
