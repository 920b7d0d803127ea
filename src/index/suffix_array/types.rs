//! Types for suffix array indexing
//!
//! The corpus is a sequence of Unicode scalar values framed like this:
//!
//! ```text
//! START  content_1 SEP  content_2 SEP  ...  content_k SEP  END END
//! ```
//!
//! `START` is the lowest code point and appears exactly once, so rank 0 of
//! every suffix array is the whole corpus and no other suffix can tie with
//! it. `END` is the highest code point. `SEP` sits just below `END`, which
//! keeps every occurrence of a query strictly below `query + END + END`.

use crate::index::types::EntryId;
use serde::Serialize;

/// Position in the corpus, counted in code points
pub type TextPosition = u32;

/// Lowest code point; opens the corpus
pub const START_SENTINEL: char = '\u{0}';

/// Terminates each entry's content
pub const ENTRY_SEPARATOR: char = '\u{10FFFE}';

/// Highest code point; the corpus ends with two of these
pub const END_SENTINEL: char = char::MAX;

/// Number of `END_SENTINEL`s closing the corpus
pub const END_SENTINEL_RUN: usize = 2;

/// Largest corpus the 32-bit position type can address
pub const MAX_CORPUS_LEN: usize = TextPosition::MAX as usize;

/// Corpora longer than this sort large runs in parallel
pub const PARALLEL_SORT_THRESHOLD: usize = 100_000;

/// Whether a code point is reserved for corpus framing
#[inline]
pub fn is_reserved(c: char) -> bool {
    c == START_SENTINEL || c == ENTRY_SEPARATOR || c == END_SENTINEL
}

/// Span of one entry in the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySpan {
    /// Entry id in the owner's stash
    pub id: EntryId,
    /// Start position in the corpus (inclusive)
    pub start: TextPosition,
    /// End position in the corpus (exclusive, before the separator)
    pub end: TextPosition,
}

/// Statistics about a suffix array
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SuffixArrayStats {
    /// Corpus length including framing code points
    pub corpus_len: usize,
    /// Number of entries with a span in the corpus
    pub entry_count: usize,
    /// Number of doubling passes the construction needed
    pub doubling_passes: u32,
}
