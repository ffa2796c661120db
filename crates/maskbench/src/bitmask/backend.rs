//! Mask application backends.
//!
//! Every backend implements the same rule: a score survives only if its
//! token index is inside the mask's coverage and its bit is set; everything
//! else becomes negative infinity. The backends differ in how they walk the
//! data, not in what they compute.

use super::{is_allowed, MaskWord, TokenBitmask};
use crate::result::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};

/// Row-major `batch x width` view over a score buffer
#[derive(Debug)]
pub struct Scores<'a> {
    data: &'a mut [f32],
    batch: usize,
    width: usize,
}

impl<'a> Scores<'a> {
    /// View `data` as `batch` rows of `width` scores
    pub fn new(data: &'a mut [f32], batch: usize, width: usize) -> BenchResult<Self> {
        let expected = batch * width;
        if data.len() != expected {
            return Err(BenchError::ScoreLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, batch, width })
    }

    /// View a single score vector as a batch of one
    pub fn vector(data: &'a mut [f32]) -> Self {
        let width = data.len();
        Self {
            data,
            batch: 1,
            width,
        }
    }

    /// Number of rows
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Scores per row
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    fn row_mut(&mut self, r: usize) -> &mut [f32] {
        let start = r * self.width;
        &mut self.data[start..start + self.width]
    }
}

/// Strategy used to apply a mask to scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskBackend {
    /// One bit test per score
    #[default]
    Scalar,
    /// One word at a time, with fast paths for all-set and all-clear words
    Blocked,
    /// Whole-batch lane expansion, the layout tensor kernels use
    Tensor,
}

impl MaskBackend {
    /// Every backend, for conformance runs
    pub const ALL: [Self; 3] = [Self::Scalar, Self::Blocked, Self::Tensor];

    /// Stable name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Blocked => "blocked",
            Self::Tensor => "tensor",
        }
    }

    /// Force disallowed scores to negative infinity in place
    pub fn apply<W: MaskWord>(self, scores: &mut Scores<'_>, mask: &TokenBitmask<W>) -> BenchResult<()> {
        if scores.batch != mask.batch() {
            return Err(BenchError::ShapeMismatch {
                scores: scores.batch,
                mask: mask.batch(),
            });
        }
        match self {
            Self::Scalar => apply_scalar(scores, mask),
            Self::Blocked => apply_blocked(scores, mask),
            Self::Tensor => apply_tensor(scores, mask),
        }
        Ok(())
    }
}

fn apply_scalar<W: MaskWord>(scores: &mut Scores<'_>, mask: &TokenBitmask<W>) {
    let coverage = mask.coverage();
    for r in 0..scores.batch {
        let words = mask.row(r);
        for (t, score) in scores.row_mut(r).iter_mut().enumerate() {
            if t >= coverage || !is_allowed(words, t) {
                *score = f32::NEG_INFINITY;
            }
        }
    }
}

fn apply_blocked<W: MaskWord>(scores: &mut Scores<'_>, mask: &TokenBitmask<W>) {
    let coverage = mask.coverage().min(scores.width);
    for r in 0..scores.batch {
        let words = mask.row(r);
        let row = scores.row_mut(r);
        for (w_idx, &word) in words.iter().enumerate() {
            let start = w_idx * W::BITS;
            if start >= coverage {
                break;
            }
            let end = (start + W::BITS).min(coverage);
            if word == W::FULL {
                continue;
            }
            if word == W::EMPTY {
                row[start..end].fill(f32::NEG_INFINITY);
                continue;
            }
            for (b, score) in row[start..end].iter_mut().enumerate() {
                if !word.bit(b) {
                    *score = f32::NEG_INFINITY;
                }
            }
        }
        row[coverage..].fill(f32::NEG_INFINITY);
    }
}

fn apply_tensor<W: MaskWord>(scores: &mut Scores<'_>, mask: &TokenBitmask<W>) {
    // repeat each word BITS times, shift by lane index, keep the low bit
    let lanes = mask.words_per_row() * W::BITS;
    let bit_lanes: Vec<bool> = mask
        .words()
        .iter()
        .flat_map(|&w| (0..W::BITS).map(move |b| w.bit(b)))
        .collect();
    let cutoff = mask.coverage();
    let width = scores.width;
    for (flat, score) in scores.data.iter_mut().enumerate() {
        let (r, t) = (flat / width, flat % width);
        let keep = t < cutoff && bit_lanes[r * lanes + t];
        if !keep {
            *score = f32::NEG_INFINITY;
        }
    }
}
