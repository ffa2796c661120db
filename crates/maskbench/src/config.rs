//! Run configuration.
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration. Command-line flags are applied on top by the CLI.
//!
//! ```yaml
//! inputs: [corpus/easy, corpus/hard]
//! output_dir: tmp/interpreter
//! engine: interpreter
//! tokenizer: bytes
//! workers: 0            # available parallelism
//! chunk_size: 100
//! memory_limit_gb: 32   # 0 disables the ceiling
//! reclaim: { older_than_secs: 3600 }
//! max_attempts: 2
//! seed: 7
//! require_complete: false
//! isolate: true         # pool runs in supervised worker processes
//! ```

use crate::claim::ReclaimPolicy;
use crate::engine::EngineKind;
use crate::eval::EvalContext;
use crate::result::{BenchError, BenchResult};
use crate::tokenizer::TokenizerSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for one `run`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Corpus files, directories or glob patterns
    pub inputs: Vec<String>,
    /// Where records are written
    pub output_dir: PathBuf,
    /// Engine under test
    pub engine: EngineKind,
    /// `bytes` or a vocabulary file
    pub tokenizer: String,
    /// Worker threads; 0 uses the available parallelism
    pub workers: usize,
    /// Upper bound on files taken per queue pop
    pub chunk_size: usize,
    /// Address space ceiling in GiB; 0 disables it
    pub memory_limit_gb: u64,
    /// Handling of pending markers left by other owners
    pub reclaim: ReclaimPolicy,
    /// Times a file may be tried by this run
    pub max_attempts: u32,
    /// Queue shuffle seed
    pub seed: Option<u64>,
    /// Only complete instances count as accepted
    pub require_complete: bool,
    /// Run the pool in worker processes under a supervisor
    pub isolate: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output_dir: PathBuf::from("tmp/output"),
            engine: EngineKind::default(),
            tokenizer: "bytes".to_string(),
            workers: 0,
            chunk_size: 100,
            memory_limit_gb: 32,
            reclaim: ReclaimPolicy::default(),
            max_attempts: 1,
            seed: None,
            require_complete: false,
            isolate: false,
        }
    }
}

impl RunConfig {
    /// Parse and validate YAML
    pub fn from_yaml(yaml: &str) -> BenchResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn load(path: &Path) -> BenchResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BenchError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> BenchResult<()> {
        if self.chunk_size == 0 {
            return Err(BenchError::config("chunk_size must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(BenchError::config("max_attempts must be at least 1"));
        }
        if self.tokenizer.is_empty() {
            return Err(BenchError::config("tokenizer must be 'bytes' or a vocabulary path"));
        }
        Ok(())
    }

    /// Effective number of worker threads
    #[must_use]
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }

    /// Tokenizer selection
    #[must_use]
    pub fn tokenizer_spec(&self) -> TokenizerSpec {
        TokenizerSpec::parse(&self.tokenizer)
    }

    /// Build the shared evaluation context
    pub fn eval_context(&self) -> BenchResult<EvalContext> {
        let tokenizer = self.tokenizer_spec().build()?;
        Ok(EvalContext::new(self.engine, tokenizer).with_require_complete(self.require_complete))
    }
}
