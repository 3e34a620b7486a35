// ========================================================================================
//
//                       CORE DATA TYPES FOR THE BITJARO ENGINE
//
// ========================================================================================
//
// This module serves as the canonical dictionary for the value types that are shared
// across the major architectural boundaries of the crate (`kernel`, `pipeline`,
// `batch`). Everything here is a plain value: created for one comparison, mutated
// through pure update functions, and discarded when the call returns.
//
// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are
// used in one file.

// ========================================================================================
//                                   MATCH FLAG SETS
// ========================================================================================

/// Matched-character flags for the single-word flagging path.
///
/// Bit `i` of `pattern` marks position `i` of the pattern as consumed by a match;
/// bit `j` of `text` marks position `j` of the text. The flagging loop maintains
/// `pattern.count_ones() == text.count_ones()` at every step: each claimed pattern
/// bit is paired with exactly one text bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlaggedChars {
    pub pattern: u64,
    pub text: u64,
}

impl FlaggedChars {
    /// Number of common characters found so far.
    #[inline]
    pub fn common_chars(&self) -> usize {
        self.pattern.count_ones() as usize
    }
}

/// Matched-character flags for the multiword flagging path: one 64-bit word per
/// chunk of 64 positions on each side. The popcount invariant of [`FlaggedChars`]
/// holds summed across words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlaggedCharsBlock {
    pub pattern: Vec<u64>,
    pub text: Vec<u64>,
}

impl FlaggedCharsBlock {
    /// Allocates zeroed flag arrays sized for the given sequence lengths. This is
    /// the only heap allocation a similarity computation performs.
    pub fn new(pattern_len: usize, text_len: usize) -> Self {
        Self {
            pattern: vec![0; pattern_len.div_ceil(64)],
            text: vec![0; text_len.div_ceil(64)],
        }
    }

    /// Number of common characters found so far. Sums popcounts over whichever
    /// flag array has fewer words; the matching invariant guarantees both sides
    /// sum to the same value.
    pub fn common_chars(&self) -> usize {
        let shorter = if self.pattern.len() < self.text.len() {
            &self.pattern
        } else {
            &self.text
        };
        shorter.iter().map(|flag| flag.count_ones() as usize).sum()
    }
}

// ========================================================================================
//                              THE SLIDING WINDOW MASK
// ========================================================================================

/// The moving window over the pattern's 64-bit words during multiword flagging.
///
/// At every text position `j`, the admissible pattern range is
/// `[max(0, j - bound), min(pattern_len - 1, j + bound)]`. This type encodes that
/// range as word-level state: `empty_words` words have been retired behind the
/// window, `words` words are inside it, `first_mask` masks the partial word at the
/// window's leading (low-position) edge, and `last_mask` masks the partial word at
/// its trailing (high-position) edge. A `last_mask` of zero means the final window
/// word contributes no positions yet.
///
/// Updates are pure: [`WindowMask::slide`] consumes the mask and returns the state
/// for the next text position, which keeps the bit bookkeeping testable in
/// isolation from the scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowMask {
    pub words: usize,
    pub empty_words: usize,
    pub first_mask: u64,
    pub last_mask: u64,
}

impl WindowMask {
    /// Window state for text position 0: the low `min(bound + 1, pattern_len)`
    /// positions of the pattern.
    pub fn new(bound: i64, pattern_len: usize) -> Self {
        let start_range = (bound + 1).clamp(0, pattern_len as i64) as usize;
        Self {
            words: 1 + start_range / 64,
            empty_words: 0,
            first_mask: u64::MAX,
            last_mask: (1u64 << (start_range % 64)) - 1,
        }
    }

    /// Advances both window edges after text position `j` has been processed.
    ///
    /// The trailing edge grows while pattern positions remain ahead of the window
    /// and steps into the next word once its partial mask saturates. The leading
    /// edge starts retiring positions once `j` has reached `bound`, and retires a
    /// whole word once its mask is exhausted.
    #[must_use]
    pub fn slide(mut self, j: i64, bound: i64, pattern_len: i64) -> Self {
        if j + bound + 1 < pattern_len {
            self.last_mask = (self.last_mask << 1) | 1;
            if j + bound + 2 < pattern_len && self.last_mask == u64::MAX {
                self.last_mask = 0;
                self.words += 1;
            }
        }

        if j >= bound {
            self.first_mask <<= 1;
            if self.first_mask == 0 {
                self.first_mask = u64::MAX;
                self.words -= 1;
                self.empty_words += 1;
            }
        }

        self
    }
}
