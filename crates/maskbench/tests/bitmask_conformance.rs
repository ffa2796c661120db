//! Backend conformance for mask application.
//!
//! Every backend must agree with a bit-by-bit reference for both word
//! widths, any batch size and vocabularies that do not fill the last word.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use maskbench::bitmask::{self, MaskBackend, MaskWord, Scores, TokenBitmask};
use proptest::prelude::*;

fn reference<W: MaskWord>(mask: &TokenBitmask<W>, width: usize) -> Vec<bool> {
    let mut keep = Vec::with_capacity(mask.batch() * width);
    for r in 0..mask.batch() {
        for t in 0..width {
            keep.push(mask.is_allowed(r, t));
        }
    }
    keep
}

fn check_all_backends<W: MaskWord>(mask: &TokenBitmask<W>, width: usize) {
    let expected = reference(mask, width);
    for backend in MaskBackend::ALL {
        let mut data: Vec<f32> = (0..mask.batch() * width).map(|i| i as f32).collect();
        let mut scores = Scores::new(&mut data, mask.batch(), width).unwrap();
        backend.apply(&mut scores, mask).unwrap();
        for (i, (&score, &keep)) in data.iter().zip(&expected).enumerate() {
            if keep {
                assert_eq!(score, i as f32, "{} kept index {i}", backend.name());
            } else {
                assert_eq!(score, f32::NEG_INFINITY, "{} masked index {i}", backend.name());
            }
        }
    }
}

fn random_mask<W: MaskWord>(batch: usize, vocab: usize, allowed: &[usize]) -> TokenBitmask<W> {
    let mut mask = TokenBitmask::<W>::allocate(batch, vocab);
    for r in 0..batch {
        let row = mask.row_mut(r);
        bitmask::clear_row(row);
        for &t in allowed {
            bitmask::allow(row, (t + r * 31) % vocab.max(1));
        }
    }
    mask
}

#[test]
fn test_llama_sized_vocabularies() {
    for vocab in 32_000..32_032 {
        let allowed: Vec<usize> = (0..vocab).step_by(97).collect();
        check_all_backends(&random_mask::<u32>(1, vocab, &allowed), vocab);
        check_all_backends(&random_mask::<u64>(1, vocab, &allowed), vocab);
    }
}

#[test]
fn test_large_vocabulary_batches() {
    let vocab = 128_000;
    let allowed: Vec<usize> = (0..vocab).step_by(1013).collect();
    for batch in [1, 3, 10] {
        check_all_backends(&random_mask::<u32>(batch, vocab, &allowed), vocab);
        check_all_backends(&random_mask::<u64>(batch, vocab, &allowed), vocab);
    }
}

#[test]
fn test_scores_wider_than_vocabulary() {
    // 9 tokens in one u32 word whose padding bits are set
    let mask: TokenBitmask = TokenBitmask::allocate(2, 9);
    assert_ne!(mask.row(0)[0] >> 9, 0);
    check_all_backends(&mask, 16);
}

#[test]
fn test_short_rows_mask_the_uncovered_tail() {
    // rows hold one word but the vocabulary claims 100 tokens
    let mask = TokenBitmask::<u32>::from_words(2, 100, vec![u32::MAX, 0b1010]).unwrap();
    assert_eq!(mask.coverage(), 32);
    check_all_backends(&mask, 100);
}

#[test]
fn test_all_clear_masks_everything() {
    let mut mask: TokenBitmask<u64> = TokenBitmask::allocate(3, 200);
    for r in 0..3 {
        bitmask::clear_row(mask.row_mut(r));
    }
    check_all_backends(&mask, 200);
}

proptest! {
    #[test]
    fn prop_backends_agree_u32(
        batch in 1usize..4,
        vocab in 1usize..300,
        extra in 0usize..40,
        allowed in prop::collection::vec(0usize..300, 0..80),
    ) {
        let mask = random_mask::<u32>(batch, vocab, &allowed);
        check_all_backends(&mask, vocab + extra);
    }

    #[test]
    fn prop_backends_agree_u64(
        batch in 1usize..4,
        vocab in 1usize..300,
        extra in 0usize..40,
        allowed in prop::collection::vec(0usize..300, 0..80),
    ) {
        let mask = random_mask::<u64>(batch, vocab, &allowed);
        check_all_backends(&mask, vocab + extra);
    }

    #[test]
    fn prop_count_matches_bits(vocab in 1usize..500, allowed in prop::collection::vec(0usize..500, 0..100)) {
        let mask = random_mask::<u32>(1, vocab, &allowed);
        let counted = (0..vocab).filter(|&t| mask.is_allowed(0, t)).count();
        prop_assert_eq!(mask.count_allowed(0), counted);
    }

    #[test]
    fn prop_allow_then_disallow(vocab in 1usize..500, t in 0usize..500) {
        let t = t % vocab;
        let mut mask: TokenBitmask<u64> = TokenBitmask::allocate(1, vocab);
        bitmask::clear_row(mask.row_mut(0));
        bitmask::allow(mask.row_mut(0), t);
        prop_assert!(mask.is_allowed(0, t));
        prop_assert_eq!(mask.count_allowed(0), 1);
        bitmask::disallow(mask.row_mut(0), t);
        prop_assert_eq!(mask.count_allowed(0), 0);
    }
}
