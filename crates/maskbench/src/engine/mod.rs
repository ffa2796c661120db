//! Engine adapters.
//!
//! Every engine under test is driven through the same surface: compile a
//! schema into a [`Matcher`], fork one matcher per test case, and step it
//! token by token. Engines are a closed set selected once per run.
//!
//! The reference engines shipped here differ the way production engines
//! do: `interpreter` computes the whole vocabulary mask before checking a
//! token and rejects schemas it does not fully understand, `guide` checks
//! only the candidate token and ignores keywords it does not know, and
//! `unconstrained` is the baseline that allows everything.

mod recognizer;
mod schema;

pub use schema::{CompileMode, Grammar, MAX_REQUIRED};

use crate::bitmask::{self, MaskWord};
use crate::tokenizer::{TokenId, Tokenizer};
use recognizer::Recognizer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// A schema the engine declines to compile. Recorded on the job, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct SchemaRejected {
    /// Engine-provided reason
    pub detail: String,
}

impl SchemaRejected {
    /// Create a rejection
    #[must_use]
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Engine under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Full-mask parser interpreter, strict schema support
    #[default]
    Interpreter,
    /// Per-token guide, lenient schema support
    Guide,
    /// Baseline that allows every in-vocabulary token
    Unconstrained,
}

impl EngineKind {
    /// Every engine
    pub const ALL: [Self; 3] = [Self::Interpreter, Self::Guide, Self::Unconstrained];

    /// Stable name, also used for output directories
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interpreter => "interpreter",
            Self::Guide => "guide",
            Self::Unconstrained => "unconstrained",
        }
    }

    /// Compile `schema` for `tokenizer`'s vocabulary
    pub fn compile(self, schema: &Value, tokenizer: &Arc<dyn Tokenizer>) -> Result<Matcher, SchemaRejected> {
        let inner = match self {
            Self::Interpreter => {
                let grammar = Grammar::compile(schema, CompileMode::Strict)?;
                Inner::Grammar(GrammarMatcher::new(grammar, tokenizer, StepMode::FullMask))
            }
            Self::Guide => {
                let grammar = Grammar::compile(schema, CompileMode::Lenient)?;
                Inner::Grammar(GrammarMatcher::new(grammar, tokenizer, StepMode::TokenCheck))
            }
            Self::Unconstrained => Inner::Unconstrained {
                vocab: tokenizer.vocab_size(),
            },
        };
        Ok(Matcher { inner })
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown engine '{s}' (expected interpreter, guide or unconstrained)"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepMode {
    FullMask,
    TokenCheck,
}

/// Per-test matching state
#[derive(Debug, Clone)]
pub struct Matcher {
    inner: Inner,
}

#[derive(Debug, Clone)]
enum Inner {
    Grammar(GrammarMatcher),
    Unconstrained { vocab: usize },
}

impl Matcher {
    /// Independent continuation from the current state
    #[must_use]
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Try to advance by one token. Accepting commits the token; rejecting
    /// leaves the state as it was.
    pub fn step(&mut self, token: TokenId) -> bool {
        match &mut self.inner {
            Inner::Grammar(m) => m.step(token),
            Inner::Unconstrained { vocab } => (token as usize) < *vocab,
        }
    }

    /// Write the current allowance into one bitmask row
    pub fn compute_mask<W: MaskWord>(&self, row: &mut [W]) {
        match &self.inner {
            Inner::Grammar(m) => m.compute_mask(row),
            Inner::Unconstrained { .. } => bitmask::fill_row(row),
        }
    }

    /// Whether the tokens consumed so far form a complete instance
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        match &self.inner {
            Inner::Grammar(m) => m.recognizer.is_accepting(),
            Inner::Unconstrained { .. } => true,
        }
    }

    /// Vocabulary the matcher was built for
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        match &self.inner {
            Inner::Grammar(m) => m.tokenizer.vocab_size(),
            Inner::Unconstrained { vocab } => *vocab,
        }
    }
}

#[derive(Debug, Clone)]
struct GrammarMatcher {
    recognizer: Recognizer,
    tokenizer: Arc<dyn Tokenizer>,
    mode: StepMode,
    scratch: Vec<u32>,
}

impl GrammarMatcher {
    fn new(grammar: Grammar, tokenizer: &Arc<dyn Tokenizer>, mode: StepMode) -> Self {
        let scratch = match mode {
            StepMode::FullMask => vec![0; bitmask::words_for::<u32>(tokenizer.vocab_size())],
            StepMode::TokenCheck => Vec::new(),
        };
        Self {
            recognizer: Recognizer::new(Arc::new(grammar)),
            tokenizer: Arc::clone(tokenizer),
            mode,
            scratch,
        }
    }

    fn step(&mut self, token: TokenId) -> bool {
        let Some(bytes) = self.tokenizer.token_bytes(token) else {
            return false;
        };
        if bytes.is_empty() {
            return false;
        }
        let bytes = bytes.to_vec();
        match self.mode {
            StepMode::FullMask => {
                let mut scratch = std::mem::take(&mut self.scratch);
                self.compute_mask(&mut scratch);
                let allowed = bitmask::is_allowed(&scratch, token as usize);
                self.scratch = scratch;
                allowed && self.recognizer.feed(&bytes)
            }
            StepMode::TokenCheck => self.recognizer.feed(&bytes),
        }
    }

    fn compute_mask<W: MaskWord>(&self, row: &mut [W]) {
        bitmask::clear_row(row);
        let first: Vec<_> = (0..=255u8).map(|b| self.recognizer.successors(&[b])).collect();
        for id in 0..self.tokenizer.vocab_size() {
            let Some(bytes) = TokenId::try_from(id)
                .ok()
                .and_then(|t| self.tokenizer.token_bytes(t))
            else {
                continue;
            };
            let Some((&head, rest)) = bytes.split_first() else {
                continue;
            };
            let viable = match &first[usize::from(head)] {
                Some(cursors) => rest.is_empty() || self.recognizer.accepts_from(cursors, rest),
                None => false,
            };
            if viable {
                bitmask::allow(row, id);
            }
        }
    }
}
