//! Suffix array builder
//!
//! Builds a suffix array from a collection of entries by:
//! 1. Concatenating all entry content with separators, framed by sentinels
//! 2. Bucketing suffixes by their leading code point (counting sort)
//! 3. Prefix doubling: refining each run of equal rank by the rank found
//!    `offset` code points further on, for `offset = 1, 2, 4, ...`
//!
//! Comparison is cyclic: the rank at `pos + offset` wraps to
//! `pos + offset - n` past the end of the corpus. Because the start
//! sentinel is the unique lowest code point, cyclic order and plain suffix
//! order agree, and every rank is distinct once `offset` reaches `n`.

use super::reader::SuffixArrayIndex;
use super::types::*;
use crate::error::{IndexError, Result};
use crate::index::types::EntryId;
use ahash::AHashMap;
use rayon::prelude::*;

/// Builder for constructing a suffix array over entries
pub struct SuffixArrayBuilder {
    /// Corpus text, starting with the start sentinel
    text: Vec<char>,
    /// Entry spans in insertion order
    spans: Vec<EntrySpan>,
}

impl SuffixArrayBuilder {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a builder expecting roughly `chars` code points of content
    pub fn with_capacity(chars: usize) -> Self {
        let mut text = Vec::with_capacity(chars + 1 + END_SENTINEL_RUN);
        text.push(START_SENTINEL);
        Self {
            text,
            spans: Vec::new(),
        }
    }

    /// Append an entry's content followed by the separator.
    ///
    /// Content must not contain reserved code points.
    pub fn add_entry(&mut self, id: EntryId, content: &str) {
        // Positions past the 32-bit limit are rejected in `build`
        let start = self.text.len() as TextPosition;
        self.text.extend(content.chars());
        let end = self.text.len() as TextPosition;
        self.text.push(ENTRY_SEPARATOR);

        self.spans.push(EntrySpan { id, start, end });
    }

    /// Number of entries added
    pub fn entry_count(&self) -> usize {
        self.spans.len()
    }

    /// Current corpus length, without the closing sentinels
    pub fn text_size(&self) -> usize {
        self.text.len()
    }

    /// Close the corpus and sort its suffixes
    pub fn build(mut self) -> Result<SuffixArrayIndex> {
        self.text
            .extend(std::iter::repeat_n(END_SENTINEL, END_SENTINEL_RUN));

        if self.text.len() > MAX_CORPUS_LEN {
            return Err(IndexError::CorpusTooLarge {
                len: self.text.len(),
                max: MAX_CORPUS_LEN,
            });
        }

        let (index, doubling_passes) = sort_suffixes(&self.text);

        Ok(SuffixArrayIndex::new(
            self.text,
            index,
            self.spans,
            doubling_passes,
        ))
    }
}

impl Default for SuffixArrayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort all cyclic suffixes of `text`.
///
/// Returns `index` where `index[r]` is the start of the suffix with rank
/// `r`, and the number of doubling passes performed.
fn sort_suffixes(text: &[char]) -> (Vec<TextPosition>, u32) {
    let n = text.len();
    let (mut index, mut rank) = bucket_by_leading_char(text);

    let mut passes = 0;
    let mut scratch: Vec<(TextPosition, TextPosition)> = Vec::new();
    let mut offset = 1;

    while offset < n {
        passes += 1;
        let mut unresolved = false;

        // Each run of equal rank occupies index[left..right]
        let mut left = 0;
        while left < n {
            let group = rank[index[left] as usize];
            let mut right = left + 1;
            while right < n && rank[index[right] as usize] == group {
                right += 1;
            }

            if right - left > 1 {
                unresolved |= refine_run(
                    &mut index[left..right],
                    &mut rank,
                    left,
                    offset,
                    &mut scratch,
                );
            }

            left = right;
        }

        if !unresolved {
            break;
        }
        offset += offset;
    }

    (index, passes)
}

/// Counting sort of all positions by leading code point.
///
/// The code point space is compacted to the alphabet actually present, so
/// the bucket table stays proportional to the corpus rather than to the
/// full Unicode range. Each position's initial rank is the start of its
/// bucket in `index`.
fn bucket_by_leading_char(text: &[char]) -> (Vec<TextPosition>, Vec<TextPosition>) {
    let mut alphabet: Vec<char> = text.to_vec();
    alphabet.sort_unstable();
    alphabet.dedup();

    let bucket_of: AHashMap<char, usize> = alphabet
        .iter()
        .enumerate()
        .map(|(bucket, &c)| (c, bucket))
        .collect();
    let buckets: Vec<usize> = text.iter().map(|c| bucket_of[c]).collect();

    // Frequencies, then cumulative bucket starts
    let mut next = vec![0 as TextPosition; alphabet.len()];
    for &bucket in &buckets {
        next[bucket] += 1;
    }
    let mut total = 0;
    for slot in next.iter_mut() {
        let freq = *slot;
        *slot = total;
        total += freq;
    }

    let rank: Vec<TextPosition> = buckets.iter().map(|&bucket| next[bucket]).collect();

    let mut index = vec![0 as TextPosition; text.len()];
    for (pos, &bucket) in buckets.iter().enumerate() {
        index[next[bucket] as usize] = pos as TextPosition;
        next[bucket] += 1;
    }

    (index, rank)
}

/// Sort one run of equal rank by the rank `offset` positions further on,
/// then split it into new runs.
///
/// `head` is the run's first slot in the full index. Equal neighbours keep
/// one rank; a strictly larger key starts a new rank equal to its slot.
/// Returns whether any ties remain inside the run.
fn refine_run(
    run: &mut [TextPosition],
    rank: &mut [TextPosition],
    head: usize,
    offset: usize,
    scratch: &mut Vec<(TextPosition, TextPosition)>,
) -> bool {
    let n = rank.len();

    // Keys are captured before any rank in the run changes
    scratch.clear();
    scratch.extend(
        run.iter()
            .map(|&pos| (rank[wrap(pos as usize + offset, n)], pos)),
    );

    if scratch.len() > PARALLEL_SORT_THRESHOLD {
        scratch.par_sort_unstable_by_key(|&(key, _)| key);
    } else {
        scratch.sort_unstable_by_key(|&(key, _)| key);
    }

    let mut unresolved = false;
    let mut current = head as TextPosition;
    for (slot, &(key, pos)) in scratch.iter().enumerate() {
        if slot > 0 {
            if key == scratch[slot - 1].0 {
                unresolved = true;
            } else {
                current = (head + slot) as TextPosition;
            }
        }
        run[slot] = pos;
        rank[pos as usize] = current;
    }

    unresolved
}

/// Reduce a position in `[0, 2n)` modulo `n`
#[inline]
pub(super) fn wrap(pos: usize, n: usize) -> usize {
    if pos >= n { pos - n } else { pos }
}
