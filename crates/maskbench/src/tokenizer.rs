//! Tokenizers.
//!
//! Real model tokenizers are external collaborators; the harness only needs
//! the three operations on [`Tokenizer`]. Two reference tokenizers ship with
//! the crate: a byte-level one and a greedy longest-match vocabulary loaded
//! from a JSON token list.

use crate::result::{BenchError, BenchResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

/// Token id
pub type TokenId = u32;

/// Interface the evaluator and the engines use to talk about tokens
pub trait Tokenizer: Debug + Send + Sync {
    /// Number of token ids, including fallback tokens
    fn vocab_size(&self) -> usize;

    /// Bytes a token stands for; `None` for ids outside the vocabulary
    fn token_bytes(&self, id: TokenId) -> Option<&[u8]>;

    /// Split `text` into token ids
    fn tokenize(&self, text: &str) -> Vec<TokenId>;
}

/// Tokenizer selection as written in run configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TokenizerSpec {
    /// One token per byte
    #[default]
    Bytes,
    /// Vocabulary file (JSON list of token strings)
    Vocab(std::path::PathBuf),
}

impl TokenizerSpec {
    /// Parse `bytes` or a vocabulary path
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value == "bytes" {
            Self::Bytes
        } else {
            Self::Vocab(value.into())
        }
    }

    /// Build the tokenizer, shared across workers
    pub fn build(&self) -> BenchResult<Arc<dyn Tokenizer>> {
        Ok(match self {
            Self::Bytes => Arc::new(ByteTokenizer::new()),
            Self::Vocab(path) => Arc::new(VocabTokenizer::load(path)?),
        })
    }
}

impl std::fmt::Display for TokenizerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes => write!(f, "bytes"),
            Self::Vocab(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One token per byte value
#[derive(Debug, Clone)]
pub struct ByteTokenizer {
    table: Vec<[u8; 1]>,
}

impl ByteTokenizer {
    /// Create the 256-token byte vocabulary
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: (0..=255u8).map(|b| [b]).collect(),
        }
    }
}

impl Default for ByteTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for ByteTokenizer {
    fn vocab_size(&self) -> usize {
        256
    }

    fn token_bytes(&self, id: TokenId) -> Option<&[u8]> {
        self.table.get(id as usize).map(|b| b.as_slice())
    }

    fn tokenize(&self, text: &str) -> Vec<TokenId> {
        text.bytes().map(TokenId::from).collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VocabFile {
    List(Vec<String>),
    Object { tokens: Vec<String> },
}

/// Greedy longest-match tokenizer over a fixed vocabulary.
///
/// Every byte missing from the vocabulary as a single-byte token gets a
/// `<0xNN>` fallback id appended after the listed tokens, so any text
/// tokenizes.
#[derive(Debug, Clone)]
pub struct VocabTokenizer {
    tokens: Vec<Vec<u8>>,
    lookup: HashMap<Vec<u8>, TokenId>,
    max_len: usize,
}

impl VocabTokenizer {
    /// Build from token strings; duplicates keep their first id
    #[must_use]
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut all: Vec<Vec<u8>> = tokens.iter().map(|t| t.as_ref().as_bytes().to_vec()).collect();
        let mut lookup = HashMap::with_capacity(all.len() + 256);
        for (id, bytes) in all.iter().enumerate() {
            if !bytes.is_empty() {
                lookup.entry(bytes.clone()).or_insert(id as TokenId);
            }
        }
        for b in 0..=255u8 {
            if !lookup.contains_key([b].as_slice()) {
                lookup.insert(vec![b], all.len() as TokenId);
                all.push(vec![b]);
            }
        }
        let max_len = all.iter().map(Vec::len).max().unwrap_or(1);
        Self {
            tokens: all,
            lookup,
            max_len,
        }
    }

    /// Load a JSON token list (`["a", "bc"]` or `{"tokens": [...]}`)
    pub fn load(path: &Path) -> BenchResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BenchError::tokenizer(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: VocabFile = serde_json::from_str(&text).map_err(|e| {
            BenchError::tokenizer(format!("{} is not a token list: {e}", path.display()))
        })?;
        let tokens = match file {
            VocabFile::List(tokens) | VocabFile::Object { tokens } => tokens,
        };
        if tokens.is_empty() {
            return Err(BenchError::tokenizer(format!("{} lists no tokens", path.display())));
        }
        Ok(Self::from_tokens(&tokens))
    }
}

impl Tokenizer for VocabTokenizer {
    fn vocab_size(&self) -> usize {
        self.tokens.len()
    }

    fn token_bytes(&self, id: TokenId) -> Option<&[u8]> {
        self.tokens.get(id as usize).map(Vec::as_slice)
    }

    fn tokenize(&self, text: &str) -> Vec<TokenId> {
        let bytes = text.as_bytes();
        let mut out = Vec::with_capacity(bytes.len() / 2 + 1);
        let mut pos = 0;
        while pos < bytes.len() {
            let longest = self.max_len.min(bytes.len() - pos);
            let (id, len) = (1..=longest)
                .rev()
                .find_map(|len| self.lookup.get(&bytes[pos..pos + len]).map(|&id| (id, len)))
                // every single byte has an id, so this only guards an empty table
                .unwrap_or((TokenId::from(bytes[pos]), 1));
            out.push(id);
            pos += len;
        }
        out
    }
}
