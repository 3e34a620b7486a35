// ========================================================================================
//
//               THE BATCHED LANE SCORER: ONE TEXT AGAINST MANY PATTERNS
//
// ========================================================================================
//
// This module repeats the single-word flagging algorithm across a fixed-width group
// of patterns in lockstep, using portable SIMD over one 64-bit position word per
// lane. The text is scanned exactly once per group; every lane's flag words and
// window mask advance together with vectorized AND-NOT, shift, and select
// operations. There is no inter-lane communication beyond the shared scan index.
//
// The lanes must agree bit-for-bit with the scalar path. Two places where that is
// easy to lose:
//
//   - The window mask may only grow while the lane's own scan position is below its
//     bound. A comparison against the lane's doubled-bound mask would wrap once the
//     masks saturate, so the growth condition is kept as an explicit per-lane
//     counter compare.
//   - A lane whose pattern and text both have one symbol carries a negative bound;
//     its initial window must still cover position 0, matching the scalar
//     single-symbol fast path.
//
// After the scan, surviving lanes fall back to the scalar transposition replay;
// the per-lane flag words are exactly the words the scalar path would have built.

use std::simd::cmp::{SimdPartialEq, SimdPartialOrd};
use std::simd::num::SimdUint;
use std::simd::{Select, i64x8, u64x8};

use itertools::izip;
use log::debug;
use thiserror::Error;

use crate::index::{MultiPatternIndex, OccurrenceMasks};
use crate::kernel;
use crate::types::FlaggedChars;

/// One 64-bit position word per lane.
pub type LaneVec = u64x8;
/// Patterns scored per data-parallel pass.
pub const LANE_COUNT: usize = LaneVec::LEN;

/// Errors raised by the batched scoring surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    /// The output buffer must hold exactly one score per indexed pattern.
    #[error("score buffer holds {got} slots but the index has {expected} patterns")]
    ScoreBufferMismatch { expected: usize, got: usize },
    /// The lane algorithm records text matches in a single 64-bit word; longer
    /// texts belong on the scalar block path.
    #[error("text has {len} symbols, exceeding the 64-symbol lane capacity")]
    TextTooLong { len: usize },
}

/// Adapts one row of a [`MultiPatternIndex`] to the single-word mask interface so
/// the scalar transposition counter can replay a lane's flags unchanged.
struct LaneMasks<'a> {
    index: &'a MultiPatternIndex,
    row: usize,
}

impl OccurrenceMasks for LaneMasks<'_> {
    #[inline(always)]
    fn mask(&self, word: usize, symbol: u32) -> u64 {
        debug_assert_eq!(word, 0);
        self.index.row_mask(self.row, symbol)
    }
}

/// Jaro similarity between every indexed pattern and one text, thresholded by
/// `score_cutoff`; writes one score per pattern into `scores`.
///
/// Patterns are processed [`LANE_COUNT`] at a time; a partial tail group runs with
/// idle padding lanes. Lanes failing the common-character filter score 0.0 without
/// a transposition count.
pub fn similarity_batch(
    scores: &mut [f64],
    index: &MultiPatternIndex,
    text: &[u32],
    score_cutoff: f64,
) -> Result<(), BatchError> {
    if scores.len() != index.len() {
        return Err(BatchError::ScoreBufferMismatch {
            expected: index.len(),
            got: scores.len(),
        });
    }
    if text.len() > 64 {
        return Err(BatchError::TextTooLong { len: text.len() });
    }

    if score_cutoff > 1.0 {
        scores.fill(0.0);
        return Ok(());
    }

    if text.is_empty() {
        for (score, &pattern_len) in scores.iter_mut().zip(index.pattern_lens()) {
            *score = if pattern_len == 0 { 1.0 } else { 0.0 };
        }
        return Ok(());
    }

    debug!(
        "batch scoring {} patterns against a {}-symbol text in {} lane groups",
        index.len(),
        text.len(),
        index.len().div_ceil(LANE_COUNT)
    );

    let zero = LaneVec::splat(0);
    let one = LaneVec::splat(1);

    for (group, (score_chunk, len_chunk)) in scores
        .chunks_mut(LANE_COUNT)
        .zip(index.pattern_lens().chunks(LANE_COUNT))
        .enumerate()
    {
        let base = group * LANE_COUNT;

        // Per-lane window setup. Idle padding lanes in a tail group keep an empty
        // window and an empty occurrence row, so they can never flag anything.
        let mut bounds = [-1i64; LANE_COUNT];
        let mut window_init = [0u64; LANE_COUNT];
        let mut last_relevant = 0usize;
        for (lane, &pattern_len) in len_chunk.iter().enumerate() {
            let bound = kernel::sliding_window_bound(pattern_len, text.len());
            bounds[lane] = bound;
            // A negative bound still admits position 0, matching the scalar
            // single-symbol fast path; the scan must then reach position 0 too.
            window_init[lane] = kernel::low_bits(bound.max(0) + 1);
            last_relevant = last_relevant.max((pattern_len as i64 + bound.max(0)) as usize);
        }

        // The whole group stops scanning at the last position any lane's window
        // can reach.
        let text_cur = &text[..text.len().min(last_relevant)];

        let bound_vec = i64x8::from_array(bounds);
        let mut window = LaneVec::from_array(window_init);
        let mut pattern_flags = zero;
        let mut text_flags = zero;
        let mut counter = one;
        let mut scan_position = i64x8::splat(0);

        for &symbol in text_cur {
            let mut gathered = [0u64; LANE_COUNT];
            for (lane, slot) in gathered.iter_mut().enumerate() {
                *slot = index.row_mask(base + lane, symbol);
            }

            let candidates = LaneVec::from_array(gathered) & window & !pattern_flags;

            pattern_flags |= candidates & (zero - candidates);
            text_flags |= candidates.simd_ne(zero).select(counter, zero);

            counter <<= one;
            let growing = scan_position.simd_lt(bound_vec);
            window = (window << one) | growing.select(one, zero);
            scan_position += i64x8::splat(1);
        }

        let common_counts = pattern_flags.count_ones().to_array();
        let pattern_flags = pattern_flags.to_array();
        let text_flags = text_flags.to_array();

        for (lane, (score, &pattern_len)) in
            izip!(score_chunk.iter_mut(), len_chunk.iter()).enumerate()
        {
            let common_chars = common_counts[lane] as usize;
            if !kernel::passes_common_char_filter(pattern_len, text.len(), common_chars, score_cutoff)
            {
                *score = 0.0;
                continue;
            }

            let masks = LaneMasks {
                index,
                row: base + lane,
            };
            let flagged = FlaggedChars {
                pattern: pattern_flags[lane],
                text: text_flags[lane],
            };
            let transpositions = kernel::count_transpositions_word(&masks, text_cur, &flagged);

            let similarity =
                kernel::assemble_similarity(pattern_len, text.len(), common_chars, transpositions);
            *score = if similarity >= score_cutoff {
                similarity
            } else {
                0.0
            };
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::similarity_seq;

    fn symbols(text: &str) -> Vec<u32> {
        text.chars().map(|c| c as u32).collect()
    }

    fn batch_against_scalar(patterns: &[&str], text: &str, score_cutoff: f64) {
        let index = MultiPatternIndex::from_texts(patterns).unwrap();
        let text_symbols = symbols(text);
        let mut scores = vec![f64::NAN; patterns.len()];
        similarity_batch(&mut scores, &index, &text_symbols, score_cutoff).unwrap();

        for (pattern, &score) in patterns.iter().zip(&scores) {
            let expected = similarity_seq(&symbols(pattern), &text_symbols, score_cutoff);
            assert_eq!(
                score, expected,
                "lane diverged from scalar on {pattern:?} vs {text:?} (cutoff {score_cutoff})"
            );
        }
    }

    #[test]
    fn lanes_match_the_scalar_path_for_mixed_lengths() {
        let patterns = [
            "",
            "A",
            "B",
            "MARTHA",
            "MARHTA",
            "DIXON",
            "DICKSONX",
            "applesauce",
        ];
        batch_against_scalar(&patterns, "MARTHA", 0.0);
        batch_against_scalar(&patterns, "DIXON", 0.0);
        batch_against_scalar(&patterns, "A", 0.0);
    }

    #[test]
    fn lanes_match_the_scalar_path_under_a_cutoff() {
        let patterns = ["MARTHA", "MARHTA", "AB", "BA", "exact", "exact"];
        batch_against_scalar(&patterns, "MARHTA", 0.9);
        batch_against_scalar(&patterns, "exact", 0.99);
    }

    #[test]
    fn tail_groups_pad_with_idle_lanes() {
        // 11 patterns: one full group plus a 3-lane tail.
        let patterns = [
            "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
            "eleven",
        ];
        batch_against_scalar(&patterns, "seven", 0.0);
    }

    #[test]
    fn full_capacity_lanes_stay_exact() {
        let long_a: String = std::iter::repeat('a').take(64).collect();
        let long_b: String = "ab".chars().cycle().take(64).collect();
        let patterns = [long_a.as_str(), long_b.as_str(), "a", ""];
        let text: String = "ba".chars().cycle().take(64).collect();
        batch_against_scalar(&patterns, &text, 0.0);
    }

    #[test]
    fn empty_text_scores_only_empty_patterns() {
        let index = MultiPatternIndex::from_texts(&["", "x", "xy"]).unwrap();
        let mut scores = vec![f64::NAN; 3];
        similarity_batch(&mut scores, &index, &[], 0.0).unwrap();
        assert_eq!(scores, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn cutoff_above_one_rejects_every_lane() {
        let index = MultiPatternIndex::from_texts(&["same", "same"]).unwrap();
        let mut scores = vec![f64::NAN; 2];
        similarity_batch(&mut scores, &index, &symbols("same"), 1.5).unwrap();
        assert_eq!(scores, vec![0.0, 0.0]);
    }

    #[test]
    fn mismatched_score_buffer_is_rejected() {
        let index = MultiPatternIndex::from_texts(&["a", "b"]).unwrap();
        let mut scores = vec![0.0; 3];
        let err = similarity_batch(&mut scores, &index, &symbols("a"), 0.0).unwrap_err();
        assert_eq!(
            err,
            BatchError::ScoreBufferMismatch {
                expected: 2,
                got: 3
            }
        );
    }

    #[test]
    fn overlong_text_is_rejected() {
        let index = MultiPatternIndex::from_texts(&["a"]).unwrap();
        let text = vec!['a' as u32; 65];
        let mut scores = vec![0.0; 1];
        let err = similarity_batch(&mut scores, &index, &text, 0.0).unwrap_err();
        assert_eq!(err, BatchError::TextTooLong { len: 65 });
    }
}
