// ========================================================================================
//
//                      THE OCCURRENCE INDEX: PER-SYMBOL POSITION MASKS
//
// ========================================================================================
//
// This module answers one question in O(1): "at which positions does symbol `c` occur
// in the reference sequence?" — as a 64-bit mask per machine word of positions. The
// flagging kernels consume these masks millions of times per scan, so lookups must be
// branch-light and allocation-free.
//
// Symbols below 256 (the overwhelming majority of real inputs) hit a direct table;
// everything else falls back to a hash map keyed with `ahash`. An index is built once
// per reference sequence and is immutable afterwards, which makes it safe to share
// across any number of concurrent comparisons.

use ahash::AHashMap;
use log::debug;
use thiserror::Error;

/// Size of the direct-lookup table: one slot per extended-ASCII symbol.
const DIRECT_TABLE_SYMBOLS: usize = 256;

/// Errors raised when building an occurrence index from caller data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// A pattern handed to [`MultiPatternIndex::new`] exceeds the single-word
    /// position capacity required by the batched lane scorer.
    #[error("pattern {index} has {len} symbols, exceeding the 64-symbol lane capacity")]
    PatternTooLong { index: usize, len: usize },
}

/// Read access to per-symbol occurrence masks, one 64-bit word of positions at a
/// time. `word` selects the chunk of 64 positions; it is always 0 for single-word
/// indexes.
pub trait OccurrenceMasks {
    fn mask(&self, word: usize, symbol: u32) -> u64;
}

// ========================================================================================
//                               SINGLE-WORD INDEX
// ========================================================================================

/// Occurrence index for a reference sequence of at most 64 symbols: bit `i` of the
/// mask for symbol `c` is set iff `reference[i] == c`.
#[derive(Debug, Clone)]
pub struct PatternIndex {
    direct: [u64; DIRECT_TABLE_SYMBOLS],
    extended: AHashMap<u32, u64>,
}

impl PatternIndex {
    pub fn new(pattern: &[u32]) -> Self {
        debug_assert!(pattern.len() <= 64);

        let mut direct = [0u64; DIRECT_TABLE_SYMBOLS];
        let mut extended = AHashMap::new();
        for (position, &symbol) in pattern.iter().enumerate() {
            let bit = 1u64 << (position % 64);
            if (symbol as usize) < DIRECT_TABLE_SYMBOLS {
                direct[symbol as usize] |= bit;
            } else {
                *extended.entry(symbol).or_insert(0) |= bit;
            }
        }
        Self { direct, extended }
    }
}

impl OccurrenceMasks for PatternIndex {
    #[inline(always)]
    fn mask(&self, word: usize, symbol: u32) -> u64 {
        debug_assert_eq!(word, 0);
        if (symbol as usize) < DIRECT_TABLE_SYMBOLS {
            self.direct[symbol as usize]
        } else {
            self.extended.get(&symbol).copied().unwrap_or(0)
        }
    }
}

// ========================================================================================
//                                MULTIWORD INDEX
// ========================================================================================

/// Occurrence index for reference sequences of any length: bit `i` of word `w`
/// encodes position `64 * w + i`.
///
/// Building one costs `ceil(len / 64) * 2KiB` for the direct table, so callers
/// comparing one reference against many candidates should build it once and reuse
/// it through the precomputed-index entry point.
#[derive(Debug, Clone)]
pub struct BlockPatternIndex {
    words: usize,
    /// Direct table, word-major: `direct[word * 256 + symbol]`.
    direct: Vec<u64>,
    extended: AHashMap<u32, Vec<u64>>,
}

impl BlockPatternIndex {
    pub fn new(pattern: &[u32]) -> Self {
        let words = pattern.len().div_ceil(64).max(1);
        let mut direct = vec![0u64; words * DIRECT_TABLE_SYMBOLS];
        let mut extended: AHashMap<u32, Vec<u64>> = AHashMap::new();
        for (position, &symbol) in pattern.iter().enumerate() {
            let word = position / 64;
            let bit = 1u64 << (position % 64);
            if (symbol as usize) < DIRECT_TABLE_SYMBOLS {
                direct[word * DIRECT_TABLE_SYMBOLS + symbol as usize] |= bit;
            } else {
                extended.entry(symbol).or_insert_with(|| vec![0; words])[word] |= bit;
            }
        }
        debug!(
            "built {}-word occurrence index ({} non-latin symbols)",
            words,
            extended.len()
        );
        Self {
            words,
            direct,
            extended,
        }
    }

    /// Builds the index over a string's code points.
    pub fn from_text(pattern: &str) -> Self {
        let symbols: Vec<u32> = pattern.chars().map(|c| c as u32).collect();
        Self::new(&symbols)
    }

    /// Number of 64-position words this index covers.
    pub fn words(&self) -> usize {
        self.words
    }
}

impl OccurrenceMasks for BlockPatternIndex {
    #[inline(always)]
    fn mask(&self, word: usize, symbol: u32) -> u64 {
        if (symbol as usize) < DIRECT_TABLE_SYMBOLS {
            self.direct[word * DIRECT_TABLE_SYMBOLS + symbol as usize]
        } else {
            self.extended.get(&symbol).map_or(0, |masks| masks[word])
        }
    }
}

// ========================================================================================
//                          BATCHED INDEX: ONE ROW PER PATTERN
// ========================================================================================

/// Occurrence indexes for many patterns at once, consumed by the batched lane
/// scorer: row `r` holds the single-word index and length of pattern `r`.
///
/// Every pattern must fit in one 64-bit position word; longer patterns belong on
/// the scalar block path.
#[derive(Debug, Clone)]
pub struct MultiPatternIndex {
    rows: Vec<PatternIndex>,
    lens: Vec<usize>,
}

impl MultiPatternIndex {
    pub fn new(patterns: &[&[u32]]) -> Result<Self, IndexError> {
        for (index, pattern) in patterns.iter().enumerate() {
            if pattern.len() > 64 {
                return Err(IndexError::PatternTooLong {
                    index,
                    len: pattern.len(),
                });
            }
        }
        Ok(Self {
            rows: patterns.iter().map(|pattern| PatternIndex::new(pattern)).collect(),
            lens: patterns.iter().map(|pattern| pattern.len()).collect(),
        })
    }

    /// Builds the batched index over many strings' code points.
    pub fn from_texts(patterns: &[&str]) -> Result<Self, IndexError> {
        let sequences: Vec<Vec<u32>> = patterns
            .iter()
            .map(|pattern| pattern.chars().map(|c| c as u32).collect())
            .collect();
        let slices: Vec<&[u32]> = sequences.iter().map(Vec::as_slice).collect();
        Self::new(&slices)
    }

    /// Number of patterns indexed.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Per-pattern lengths, in construction order.
    pub fn pattern_lens(&self) -> &[usize] {
        &self.lens
    }

    /// Occurrence mask of `symbol` in pattern `row`. Rows past the end resolve to
    /// an empty mask, which lets the lane scorer run partial tail groups without
    /// special-casing.
    #[inline(always)]
    pub fn row_mask(&self, row: usize, symbol: u32) -> u64 {
        self.rows.get(row).map_or(0, |index| index.mask(0, symbol))
    }
}
