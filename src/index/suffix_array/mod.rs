//! Suffix array indexing module
//!
//! This module provides O(m log n) exact substring search using suffix arrays
//! built with prefix doubling over Unicode code points.
//!
//! ## Architecture
//!
//! - `builder`: Frames entries into a corpus and sorts its suffixes
//! - `reader`: Prefix-range search and offset-to-entry mapping
//! - `types`: Reserved code points, spans and statistics

pub mod builder;
pub mod reader;
pub mod types;

// Re-exports for convenience
pub use builder::SuffixArrayBuilder;
pub use reader::SuffixArrayIndex;
pub use types::{EntrySpan, SuffixArrayStats, TextPosition};
