#![feature(portable_simd)] // Do not remove this
#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
pub mod batch;
pub mod index;
pub mod kernel;
pub mod pipeline;
pub mod types;

pub use batch::{BatchError, LANE_COUNT, similarity_batch};
pub use index::{BlockPatternIndex, IndexError, MultiPatternIndex, OccurrenceMasks, PatternIndex};
pub use pipeline::{similarity, similarity_seq, similarity_with_index, similarity_with_index_seq};
pub use types::{FlaggedChars, FlaggedCharsBlock, WindowMask};
