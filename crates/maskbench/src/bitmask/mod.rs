//! Token-allowance bitmask codec.
//!
//! Token `t` lives in word `t / W` at bit `t % W`, least significant bit
//! first, where `W` is the bit width of the word type. A set bit means the
//! token is allowed. Freshly allocated masks allow everything.
//!
//! ```
//! use maskbench::bitmask::{self, TokenBitmask};
//!
//! let mut mask: TokenBitmask = TokenBitmask::allocate(1, 40);
//! assert_eq!(mask.words_per_row(), 2);
//! bitmask::disallow(mask.row_mut(0), 33);
//! assert!(!mask.is_allowed(0, 33));
//! assert!(mask.is_allowed(0, 39));
//! assert!(!mask.is_allowed(0, 40)); // beyond the declared vocabulary
//! ```

mod backend;

pub use backend::{MaskBackend, Scores};

use crate::result::{BenchError, BenchResult};
use std::fmt::Debug;

/// Storage word of a bitmask row
pub trait MaskWord: Copy + Eq + Debug + Send + Sync + 'static {
    /// Bits per word
    const BITS: usize;
    /// No token allowed
    const EMPTY: Self;
    /// Every token allowed
    const FULL: Self;

    /// Whether bit `idx` is set
    fn bit(self, idx: usize) -> bool;

    /// Set bit `idx`
    fn set_bit(&mut self, idx: usize);

    /// Clear bit `idx`
    fn clear_bit(&mut self, idx: usize);

    /// Number of set bits
    fn popcount(self) -> u32;
}

macro_rules! impl_mask_word {
    ($($t:ty),*) => {
        $(
            impl MaskWord for $t {
                const BITS: usize = <$t>::BITS as usize;
                const EMPTY: Self = 0;
                const FULL: Self = <$t>::MAX;

                #[inline]
                fn bit(self, idx: usize) -> bool {
                    (self >> idx) & 1 == 1
                }

                #[inline]
                fn set_bit(&mut self, idx: usize) {
                    *self |= 1 << idx;
                }

                #[inline]
                fn clear_bit(&mut self, idx: usize) {
                    *self &= !(1 << idx);
                }

                #[inline]
                fn popcount(self) -> u32 {
                    self.count_ones()
                }
            }
        )*
    };
}

impl_mask_word!(u32, u64);

/// Number of words needed to cover `vocab` tokens
#[must_use]
pub const fn words_for<W: MaskWord>(vocab: usize) -> usize {
    (vocab + W::BITS - 1) / W::BITS
}

/// Whether token `t` is allowed by `words`. Tokens beyond the words' coverage
/// are never allowed.
#[inline]
#[must_use]
pub fn is_allowed<W: MaskWord>(words: &[W], t: usize) -> bool {
    words.get(t / W::BITS).is_some_and(|w| w.bit(t % W::BITS))
}

/// Mark token `t` allowed. Out-of-range tokens are ignored.
#[inline]
pub fn allow<W: MaskWord>(words: &mut [W], t: usize) {
    if let Some(w) = words.get_mut(t / W::BITS) {
        w.set_bit(t % W::BITS);
    }
}

/// Mark token `t` disallowed. Out-of-range tokens are ignored.
#[inline]
pub fn disallow<W: MaskWord>(words: &mut [W], t: usize) {
    if let Some(w) = words.get_mut(t / W::BITS) {
        w.clear_bit(t % W::BITS);
    }
}

/// Disallow every token in the row
pub fn clear_row<W: MaskWord>(words: &mut [W]) {
    words.fill(W::EMPTY);
}

/// Allow every token in the row, padding bits included
pub fn fill_row<W: MaskWord>(words: &mut [W]) {
    words.fill(W::FULL);
}

/// Count allowed tokens below `vocab`
#[must_use]
pub fn count_allowed<W: MaskWord>(words: &[W], vocab: usize) -> usize {
    let full_words = vocab / W::BITS;
    let mut count: usize = words
        .iter()
        .take(full_words)
        .map(|w| w.popcount() as usize)
        .sum();
    let rem = vocab % W::BITS;
    if rem > 0 {
        if let Some(&last) = words.get(full_words) {
            count += (0..rem).filter(|&b| last.bit(b)).count();
        }
    }
    count
}

/// A batch of bitmask rows over a declared vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBitmask<W: MaskWord = u32> {
    batch: usize,
    vocab: usize,
    words_per_row: usize,
    words: Vec<W>,
}

impl<W: MaskWord> TokenBitmask<W> {
    /// Allocate `batch` rows covering `vocab` tokens, everything allowed
    #[must_use]
    pub fn allocate(batch: usize, vocab: usize) -> Self {
        let words_per_row = words_for::<W>(vocab);
        Self {
            batch,
            vocab,
            words_per_row,
            words: vec![W::FULL; batch * words_per_row],
        }
    }

    /// Wrap raw words. The row width is `words.len() / batch`, which may
    /// cover fewer tokens than `vocab`; uncovered tokens are disallowed.
    pub fn from_words(batch: usize, vocab: usize, words: Vec<W>) -> BenchResult<Self> {
        if batch == 0 {
            if !words.is_empty() {
                return Err(BenchError::config("empty mask batch with non-empty words"));
            }
            return Ok(Self {
                batch,
                vocab,
                words_per_row: words_for::<W>(vocab),
                words,
            });
        }
        if words.len() % batch != 0 {
            return Err(BenchError::config(format!(
                "{} mask words do not split into {batch} rows",
                words.len()
            )));
        }
        Ok(Self {
            batch,
            vocab,
            words_per_row: words.len() / batch,
            words,
        })
    }

    /// Number of rows
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Declared vocabulary size
    #[must_use]
    pub const fn vocab(&self) -> usize {
        self.vocab
    }

    /// Words per row
    #[must_use]
    pub const fn words_per_row(&self) -> usize {
        self.words_per_row
    }

    /// Tokens this mask can speak for: the declared vocabulary, capped by
    /// the bits actually stored per row
    #[must_use]
    pub const fn coverage(&self) -> usize {
        let stored = self.words_per_row * W::BITS;
        if self.vocab < stored {
            self.vocab
        } else {
            stored
        }
    }

    /// All words, row-major
    #[must_use]
    pub fn words(&self) -> &[W] {
        &self.words
    }

    /// Words of row `r`
    #[must_use]
    pub fn row(&self, r: usize) -> &[W] {
        let start = r * self.words_per_row;
        &self.words[start..start + self.words_per_row]
    }

    /// Mutable words of row `r`
    pub fn row_mut(&mut self, r: usize) -> &mut [W] {
        let start = r * self.words_per_row;
        &mut self.words[start..start + self.words_per_row]
    }

    /// Whether token `t` is allowed in row `r`
    #[must_use]
    pub fn is_allowed(&self, r: usize, t: usize) -> bool {
        t < self.coverage() && is_allowed(self.row(r), t)
    }

    /// Allowed tokens in row `r`
    #[must_use]
    pub fn count_allowed(&self, r: usize) -> usize {
        count_allowed(self.row(r), self.coverage())
    }
}
