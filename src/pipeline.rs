// ========================================================================================
//
//                     THE ORCHESTRATOR: FROM SEQUENCES TO A SCORE
//
// ========================================================================================
//
// This module owns the control flow of a single scalar comparison: degenerate-length
// handling, the length filter, suffix trimming, common-prefix stripping, dispatch to
// the single-word or multiword flagging path, the common-character filter, the
// transposition count, and final score assembly against the cutoff. It makes every
// decision and performs no bit arithmetic of its own; the `kernel` module does all
// the work.
//
// A returned 0.0 means "rejected by the cutoff" (the designed fast negative), not
// "the similarity is exactly zero" — callers that need unfiltered scores pass a
// cutoff of 0.0.

use crate::index::{BlockPatternIndex, PatternIndex};
use crate::kernel;

/// Strips the longest common prefix from both sequences and returns its length.
/// A shared prefix always matches position-for-position and can never contain a
/// transposition, so it is counted directly into the common-character tally and
/// excluded from flagging.
fn strip_common_prefix<'p, 't>(
    pattern: &'p [u32],
    text: &'t [u32],
) -> (usize, &'p [u32], &'t [u32]) {
    let prefix = pattern
        .iter()
        .zip(text.iter())
        .take_while(|(p, t)| p == t)
        .count();
    (prefix, &pattern[prefix..], &text[prefix..])
}

/// Jaro similarity between two code-point sequences, thresholded by `score_cutoff`.
///
/// Returns a score in `[0, 1]`, or 0.0 whenever any filter or the final comparison
/// falls below the cutoff.
pub fn similarity_seq(pattern: &[u32], text: &[u32], score_cutoff: f64) -> f64 {
    let pattern_len = pattern.len();
    let text_len = text.len();

    if score_cutoff > 1.0 {
        return 0.0;
    }

    if pattern_len == 0 && text_len == 0 {
        return 1.0;
    }

    if !kernel::passes_length_filter(pattern_len, text_len, score_cutoff) {
        return 0.0;
    }

    if pattern_len == 1 && text_len == 1 {
        return (pattern[0] == text[0]) as u64 as f64;
    }

    let (bound, pattern_cur, text_cur) = kernel::bound_and_trim(pattern, text);
    let (prefix, pattern_cur, text_cur) = strip_common_prefix(pattern_cur, text_cur);

    let mut common_chars = prefix;
    let mut transpositions = 0;

    if pattern_cur.is_empty() || text_cur.is_empty() {
        // The prefix already accounts for every common character, with no
        // transpositions possible.
    } else if pattern_cur.len() <= 64 && text_cur.len() <= 64 {
        let index = PatternIndex::new(pattern_cur);
        let flagged = kernel::flag_common_word(&index, pattern_cur.len(), text_cur, bound);
        common_chars += flagged.common_chars();

        if !kernel::passes_common_char_filter(pattern_len, text_len, common_chars, score_cutoff) {
            return 0.0;
        }

        transpositions = kernel::count_transpositions_word(&index, text_cur, &flagged);
    } else {
        let index = BlockPatternIndex::new(pattern_cur);
        let flagged = kernel::flag_common_block(&index, pattern_cur.len(), text_cur, bound);
        let flagged_chars = flagged.common_chars();
        common_chars += flagged_chars;

        if !kernel::passes_common_char_filter(pattern_len, text_len, common_chars, score_cutoff) {
            return 0.0;
        }

        transpositions =
            kernel::count_transpositions_block(&index, text_cur, &flagged, flagged_chars);
    }

    let similarity = kernel::assemble_similarity(pattern_len, text_len, common_chars, transpositions);
    if similarity >= score_cutoff { similarity } else { 0.0 }
}

/// [`similarity_seq`] against a precomputed occurrence index for the pattern.
///
/// The index may be reused across any number of texts sharing the same pattern.
/// Because its masks were built against the untrimmed pattern, the common prefix
/// is NOT stripped here (removal would shift every indexed position); suffix
/// trimming remains legal since it never shifts positions. The score is identical
/// to the plain entry point either way.
pub fn similarity_with_index_seq(
    index: &BlockPatternIndex,
    pattern: &[u32],
    text: &[u32],
    score_cutoff: f64,
) -> f64 {
    let pattern_len = pattern.len();
    let text_len = text.len();

    if score_cutoff > 1.0 {
        return 0.0;
    }

    if pattern_len == 0 && text_len == 0 {
        return 1.0;
    }

    if !kernel::passes_length_filter(pattern_len, text_len, score_cutoff) {
        return 0.0;
    }

    if pattern_len == 1 && text_len == 1 {
        return (pattern[0] == text[0]) as u64 as f64;
    }

    let (bound, pattern_cur, text_cur) = kernel::bound_and_trim(pattern, text);

    let common_chars;
    let transpositions;

    if pattern_cur.len() <= 64 && text_cur.len() <= 64 {
        let flagged = kernel::flag_common_word(index, pattern_cur.len(), text_cur, bound);
        common_chars = flagged.common_chars();

        if !kernel::passes_common_char_filter(pattern_len, text_len, common_chars, score_cutoff) {
            return 0.0;
        }

        transpositions = kernel::count_transpositions_word(index, text_cur, &flagged);
    } else {
        let flagged = kernel::flag_common_block(index, pattern_cur.len(), text_cur, bound);
        let flagged_chars = flagged.common_chars();
        common_chars = flagged_chars;

        if !kernel::passes_common_char_filter(pattern_len, text_len, common_chars, score_cutoff) {
            return 0.0;
        }

        transpositions =
            kernel::count_transpositions_block(index, text_cur, &flagged, flagged_chars);
    }

    let similarity = kernel::assemble_similarity(pattern_len, text_len, common_chars, transpositions);
    if similarity >= score_cutoff { similarity } else { 0.0 }
}

/// Jaro similarity between two strings, compared code point by code point.
pub fn similarity(pattern: &str, text: &str, score_cutoff: f64) -> f64 {
    let pattern: Vec<u32> = pattern.chars().map(|c| c as u32).collect();
    let text: Vec<u32> = text.chars().map(|c| c as u32).collect();
    similarity_seq(&pattern, &text, score_cutoff)
}

/// [`similarity`] against a precomputed occurrence index for the pattern. The
/// index must have been built over `pattern`'s code points.
pub fn similarity_with_index(
    index: &BlockPatternIndex,
    pattern: &str,
    text: &str,
    score_cutoff: f64,
) -> f64 {
    let pattern: Vec<u32> = pattern.chars().map(|c| c as u32).collect();
    let text: Vec<u32> = text.chars().map(|c| c as u32).collect();
    similarity_with_index_seq(index, &pattern, &text, score_cutoff)
}
