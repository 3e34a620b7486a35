// ========================================================================================
//
//                  THE KERNEL: A PURE BIT-PARALLEL MATCHING ENGINE
//
// ========================================================================================
//
// This module contains the innermost loops of the similarity engine. Every function
// here is a pure computation over sequences, occurrence masks, and flag words: no
// decisions about dispatch, no cutoff policy, no allocation beyond the multiword flag
// arrays its callers hand in. The orchestration layer (`pipeline`) decides *which* of
// these functions run; this module only guarantees *what* they compute.
//
// The load-bearing invariant throughout is the tie-break rule: at every text
// position, candidate pattern positions are considered in strictly ascending order
// and the lowest unflagged one wins. Every scan below — single-word, multiword,
// first/interior/last word of the moving window — preserves that order exactly.

use crate::index::{BlockPatternIndex, OccurrenceMasks};
use crate::types::{FlaggedChars, FlaggedCharsBlock, WindowMask};

/// Mask of the `n` lowest bits, clamped into `[0, 64]` so that degenerate window
/// bounds (`n <= 0` for very short sequences) resolve to an empty mask instead of
/// a shift overflow.
#[inline(always)]
pub(crate) fn low_bits(n: i64) -> u64 {
    if n <= 0 {
        0
    } else if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// Lowest set bit of `x`, or zero when `x` is zero.
#[inline(always)]
fn lowest_bit(x: u64) -> u64 {
    x & x.wrapping_neg()
}

// ========================================================================================
//                           WINDOW BOUND AND EARLY-EXIT FILTERS
// ========================================================================================

/// Half-width of the sliding match window: `max(len) / 2 - 1`, signed so that
/// sequences shorter than two symbols legally produce a negative bound.
#[inline]
pub fn sliding_window_bound(pattern_len: usize, text_len: usize) -> i64 {
    if text_len > pattern_len {
        text_len as i64 / 2 - 1
    } else {
        pattern_len as i64 / 2 - 1
    }
}

/// Computes the window bound and drops the suffix of whichever sequence can never
/// fall inside any admissible window of the other. Trimming is purely a scan-length
/// optimization: the caller must keep scoring against the original lengths.
pub fn bound_and_trim<'p, 't>(
    pattern: &'p [u32],
    text: &'t [u32],
) -> (i64, &'p [u32], &'t [u32]) {
    let pattern_len = pattern.len() as i64;
    let text_len = text.len() as i64;

    if text_len > pattern_len {
        let bound = text_len / 2 - 1;
        if text_len > pattern_len + bound {
            return (bound, pattern, &text[..(pattern_len + bound) as usize]);
        }
        (bound, pattern, text)
    } else {
        let bound = pattern_len / 2 - 1;
        if pattern_len > text_len + bound {
            return (bound, &pattern[..(text_len + bound) as usize], text);
        }
        (bound, pattern, text)
    }
}

/// Upper-bounds the attainable score from the lengths alone: even if every symbol
/// of the shorter sequence matched with no transpositions, can the cutoff still be
/// met? False whenever either sequence is empty.
#[inline]
pub fn passes_length_filter(pattern_len: usize, text_len: usize, score_cutoff: f64) -> bool {
    if pattern_len == 0 || text_len == 0 {
        return false;
    }

    let min_len = pattern_len.min(text_len) as f64;
    let bound = (min_len / pattern_len as f64 + min_len / text_len as f64 + 1.0) / 3.0;
    bound >= score_cutoff
}

/// Upper-bounds the attainable score once the common-character count is known,
/// assuming zero transpositions. Rejecting here skips the transposition count
/// entirely. False whenever no common characters were found.
#[inline]
pub fn passes_common_char_filter(
    pattern_len: usize,
    text_len: usize,
    common_chars: usize,
    score_cutoff: f64,
) -> bool {
    if common_chars == 0 {
        return false;
    }

    let common = common_chars as f64;
    let bound = (common / pattern_len as f64 + common / text_len as f64 + 1.0) / 3.0;
    bound >= score_cutoff
}

// ========================================================================================
//                              SINGLE-WORD FLAGGING PATH
// ========================================================================================

/// Flags common characters when both sequences fit in one 64-bit position word.
///
/// The window mask starts as the low `bound + 1` bits, grows by one bit per text
/// position while the window's trailing edge is still expanding, then shifts bare
/// once the leading edge starts advancing. Candidates are the occurrences of the
/// text symbol inside the window that are not yet flagged; the lowest one wins.
pub fn flag_common_word<M: OccurrenceMasks>(
    index: &M,
    pattern_len: usize,
    text: &[u32],
    bound: i64,
) -> FlaggedChars {
    debug_assert!(pattern_len <= 64);
    debug_assert!(text.len() <= 64);
    debug_assert!(bound > pattern_len as i64 || pattern_len as i64 - bound <= text.len() as i64);

    let mut flagged = FlaggedChars::default();
    let mut window = low_bits(bound + 1);
    let grow_until = bound.clamp(0, text.len() as i64) as usize;

    for (j, &symbol) in text.iter().enumerate() {
        let candidates = index.mask(0, symbol) & window & !flagged.pattern;

        flagged.pattern |= lowest_bit(candidates);
        flagged.text |= ((candidates != 0) as u64) << j;

        window = if j < grow_until {
            (window << 1) | 1
        } else {
            window << 1
        };
    }

    flagged
}

/// Counts out-of-order matched pairs on the single-word path by replaying both
/// flag words in ascending position order. Each pair contributes one raw count
/// when the text symbol does not occur at the paired pattern position; the caller
/// halves the total (pairs are double counted by construction).
pub fn count_transpositions_word<M: OccurrenceMasks>(
    index: &M,
    text: &[u32],
    flagged: &FlaggedChars,
) -> usize {
    let mut pattern_flags = flagged.pattern;
    let mut text_flags = flagged.text;
    let mut transpositions = 0;

    while text_flags != 0 {
        let pattern_bit = lowest_bit(pattern_flags);
        let text_position = text_flags.trailing_zeros() as usize;

        transpositions += (index.mask(0, text[text_position]) & pattern_bit == 0) as usize;

        text_flags &= text_flags - 1;
        pattern_flags ^= pattern_bit;
    }

    transpositions
}

// ========================================================================================
//                               MULTIWORD FLAGGING PATH
// ========================================================================================

/// One flagging step of the multiword path: searches the window's pattern words for
/// the lowest unflagged occurrence of `symbol` and claims it.
///
/// Scan order is the tie-break invariant made explicit: the partial word at the
/// window's leading edge first (any hit there is the lowest by construction), then
/// the full interior words in ascending order, then the partial word at the
/// trailing edge.
fn flag_common_block_step(
    index: &BlockPatternIndex,
    symbol: u32,
    flagged: &mut FlaggedCharsBlock,
    j: usize,
    window: &WindowMask,
) {
    let j_word = j / 64;
    let j_bit = 1u64 << (j % 64);
    let mut word = window.empty_words;
    let last_word = word + window.words;

    if window.words == 1 {
        let candidates =
            index.mask(word, symbol) & window.last_mask & window.first_mask & !flagged.pattern[word];

        flagged.pattern[word] |= lowest_bit(candidates);
        flagged.text[j_word] |= ((candidates != 0) as u64) * j_bit;
        return;
    }

    if window.first_mask != 0 {
        let candidates = index.mask(word, symbol) & window.first_mask & !flagged.pattern[word];

        if candidates != 0 {
            flagged.pattern[word] |= lowest_bit(candidates);
            flagged.text[j_word] |= j_bit;
            return;
        }
        word += 1;
    }

    while word < last_word - 1 {
        let candidates = index.mask(word, symbol) & !flagged.pattern[word];

        if candidates != 0 {
            flagged.pattern[word] |= lowest_bit(candidates);
            flagged.text[j_word] |= j_bit;
            return;
        }
        word += 1;
    }

    if window.last_mask != 0 {
        let candidates = index.mask(word, symbol) & window.last_mask & !flagged.pattern[word];

        flagged.pattern[word] |= lowest_bit(candidates);
        flagged.text[j_word] |= ((candidates != 0) as u64) * j_bit;
    }
}

/// Flags common characters when either sequence exceeds 64 symbols, tracking the
/// sliding window at word granularity with a [`WindowMask`].
pub fn flag_common_block(
    index: &BlockPatternIndex,
    pattern_len: usize,
    text: &[u32],
    bound: i64,
) -> FlaggedCharsBlock {
    debug_assert!(pattern_len > 64 || text.len() > 64);
    debug_assert!(bound >= 31);
    debug_assert!(bound > pattern_len as i64 || pattern_len as i64 - bound <= text.len() as i64);

    let mut flagged = FlaggedCharsBlock::new(pattern_len, text.len());
    let mut window = WindowMask::new(bound, pattern_len);

    for (j, &symbol) in text.iter().enumerate() {
        flag_common_block_step(index, symbol, &mut flagged, j, &window);
        window = window.slide(j as i64, bound, pattern_len as i64);
    }

    flagged
}

/// Multiword transposition count: the same pairwise replay as the single-word
/// form, additionally walking both flag arrays to the next non-empty word whenever
/// the current word's bits are exhausted. `flagged_chars` is the total match count
/// and bounds the replay.
pub fn count_transpositions_block(
    index: &BlockPatternIndex,
    text: &[u32],
    flagged: &FlaggedCharsBlock,
    flagged_chars: usize,
) -> usize {
    let mut text_word = 0;
    let mut pattern_word = 0;
    let mut text_flags = flagged.text[0];
    let mut pattern_flags = flagged.pattern[0];

    let mut remaining = flagged_chars;
    let mut transpositions = 0;
    while remaining > 0 {
        while text_flags == 0 {
            text_word += 1;
            text_flags = flagged.text[text_word];
        }

        while text_flags != 0 {
            while pattern_flags == 0 {
                pattern_word += 1;
                pattern_flags = flagged.pattern[pattern_word];
            }

            let pattern_bit = lowest_bit(pattern_flags);
            let text_position = text_word * 64 + text_flags.trailing_zeros() as usize;

            transpositions +=
                (index.mask(pattern_word, text[text_position]) & pattern_bit == 0) as usize;

            text_flags &= text_flags - 1;
            pattern_flags ^= pattern_bit;
            remaining -= 1;
        }
    }

    transpositions
}

// ========================================================================================
//                                 SCORE ASSEMBLY
// ========================================================================================

/// Combines the common-character count, the raw transposition count, and the
/// original sequence lengths into the final score. Callers guarantee
/// `common_chars > 0` (the common-character filter rejects zero before this runs).
#[inline]
pub fn assemble_similarity(
    pattern_len: usize,
    text_len: usize,
    common_chars: usize,
    transpositions: usize,
) -> f64 {
    let transpositions = (transpositions / 2) as f64;
    let common = common_chars as f64;

    let mut similarity = 0.0;
    similarity += common / pattern_len as f64;
    similarity += common / text_len as f64;
    similarity += (common - transpositions) / common;
    similarity / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PatternIndex;
    use approx::assert_relative_eq;

    fn symbols(text: &str) -> Vec<u32> {
        text.chars().map(|c| c as u32).collect()
    }

    #[test]
    fn bound_uses_the_longer_sequence() {
        assert_eq!(sliding_window_bound(6, 6), 2);
        assert_eq!(sliding_window_bound(5, 8), 3);
        assert_eq!(sliding_window_bound(8, 5), 3);
        assert_eq!(sliding_window_bound(1, 1), -1);
        assert_eq!(sliding_window_bound(0, 1), -1);
        assert_eq!(sliding_window_bound(0, 3), 0);
    }

    #[test]
    fn trim_drops_suffixes_outside_every_window() {
        let pattern = symbols("AAAAA");
        let text = symbols("AAAAAAAAAAAAAAAAAAAA");
        let (bound, p, t) = bound_and_trim(&pattern, &text);
        assert_eq!(bound, 9);
        assert_eq!(p.len(), 5);
        // Text positions beyond pattern_len + bound can never match.
        assert_eq!(t.len(), 14);

        let (bound, p, t) = bound_and_trim(&text, &pattern);
        assert_eq!(bound, 9);
        assert_eq!(p.len(), 14);
        assert_eq!(t.len(), 5);
    }

    #[test]
    fn length_filter_rejects_empty_and_hopeless_pairs() {
        assert!(!passes_length_filter(0, 5, 0.0));
        assert!(!passes_length_filter(5, 0, 0.0));
        // Best case for (2, 20): (2/2 + 2/20 + 1) / 3 = 0.7
        assert!(passes_length_filter(2, 20, 0.7));
        assert!(!passes_length_filter(2, 20, 0.71));
    }

    #[test]
    fn common_char_filter_rejects_zero_matches() {
        assert!(!passes_common_char_filter(5, 5, 0, 0.0));
        // (3/5 + 3/5 + 1) / 3 = 0.7333...
        assert!(passes_common_char_filter(5, 5, 3, 0.73));
        assert!(!passes_common_char_filter(5, 5, 3, 0.74));
    }

    #[test]
    fn word_flagging_finds_all_matches_within_the_window() {
        // MARTHA/MARHTA after the common prefix MAR is stripped.
        let pattern = symbols("THA");
        let text = symbols("HTA");
        let index = PatternIndex::new(&pattern);
        let flagged = flag_common_word(&index, pattern.len(), &text, 2);

        assert_eq!(flagged.pattern, 0b111);
        assert_eq!(flagged.text, 0b111);
        assert_eq!(flagged.common_chars(), 3);

        let raw = count_transpositions_word(&index, &text, &flagged);
        assert_eq!(raw, 2);
        assert_relative_eq!(assemble_similarity(6, 6, 6, raw), 17.0 / 18.0);
    }

    #[test]
    fn word_flagging_takes_the_lowest_unflagged_candidate() {
        // Both text symbols must claim pattern occurrences in ascending order.
        let pattern = symbols("AXA");
        let text = symbols("AA");
        let index = PatternIndex::new(&pattern);
        let flagged = flag_common_word(&index, pattern.len(), &text, 2);

        assert_eq!(flagged.pattern, 0b101);
        assert_eq!(flagged.text, 0b11);
    }

    #[test]
    fn word_flagging_with_zero_bound_matches_on_the_diagonal_only() {
        let pattern = symbols("AB");
        let text = symbols("BA");
        let index = PatternIndex::new(&pattern);
        let flagged = flag_common_word(&index, pattern.len(), &text, 0);

        assert_eq!(flagged.common_chars(), 0);
    }

    #[test]
    fn word_flagging_with_negative_bound_flags_nothing() {
        // A negative bound produces an empty initial window; the mask arithmetic
        // must not wrap.
        let pattern = symbols("A");
        let text = symbols("AA");
        let index = PatternIndex::new(&pattern);
        let flagged = flag_common_word(&index, pattern.len(), &text, -1);

        assert_eq!(flagged, FlaggedChars::default());
    }

    #[test]
    fn block_flagging_agrees_with_word_flagging_on_the_64_boundary() {
        // 64 symbols on both sides: eligible for the word path; force the block
        // machinery through an artificial 65-symbol text and compare counts on
        // the shared prefix scan.
        let pattern: Vec<u32> = (0..64).map(|i| 'a' as u32 + (i % 7)).collect();
        let mut text: Vec<u32> = (0..64).map(|i| 'a' as u32 + ((i + 3) % 7)).collect();
        let bound = sliding_window_bound(pattern.len(), text.len());

        let word_index = PatternIndex::new(&pattern);
        let word_flagged = flag_common_word(&word_index, pattern.len(), &text, bound);

        text.push('a' as u32 + 5);
        let bound = sliding_window_bound(pattern.len(), text.len());
        let block_index = BlockPatternIndex::new(&pattern);
        let block_flagged = flag_common_block(&block_index, pattern.len(), &text, bound);

        // The extra trailing symbol can only add matches, never remove them.
        assert!(block_flagged.common_chars() >= word_flagged.common_chars());
        assert_eq!(block_flagged.pattern.len(), 1);
        assert_eq!(block_flagged.text.len(), 2);
    }

    #[test]
    fn block_transpositions_walk_across_word_boundaries() {
        // A 70-symbol pattern against its rotation: matches land in both words of
        // the pattern flag array and both words of the text flag array.
        let pattern: Vec<u32> = (0..70).map(|i| 'a' as u32 + (i % 5)).collect();
        let mut text = pattern.clone();
        text.swap(0, 1);
        text.swap(68, 69);

        let bound = sliding_window_bound(pattern.len(), text.len());
        let index = BlockPatternIndex::new(&pattern);
        let flagged = flag_common_block(&index, pattern.len(), &text, bound);
        let flagged_chars = flagged.common_chars();
        assert_eq!(flagged_chars, 70);

        let raw = count_transpositions_block(&index, &text, &flagged, flagged_chars);
        assert_eq!(raw, 4);
        assert_relative_eq!(
            assemble_similarity(70, 70, 70, raw),
            (1.0 + 1.0 + 68.0 / 70.0) / 3.0
        );
    }

    #[test]
    fn assembled_score_halves_the_raw_transposition_count() {
        assert_relative_eq!(assemble_similarity(6, 6, 6, 2), 17.0 / 18.0);
        assert_relative_eq!(assemble_similarity(5, 8, 4, 0), (0.8 + 0.5 + 1.0) / 3.0);
    }

    #[test]
    fn low_bits_clamps_at_both_ends() {
        assert_eq!(low_bits(-2), 0);
        assert_eq!(low_bits(0), 0);
        assert_eq!(low_bits(1), 1);
        assert_eq!(low_bits(63), (1u64 << 63) - 1);
        assert_eq!(low_bits(64), u64::MAX);
        assert_eq!(low_bits(70), u64::MAX);
    }
}
