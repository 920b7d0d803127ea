//! Suffix array search
//!
//! Provides O(m log n) prefix-range queries over a built suffix array and
//! maps corpus offsets back to the entries that own them.

use super::builder::wrap;
use super::types::*;
use crate::index::types::EntryId;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Suffix array over one immutable corpus
pub struct SuffixArrayIndex {
    /// Framed corpus text
    text: Vec<char>,
    /// `index[r]` is the start of the suffix with rank `r`
    index: Vec<TextPosition>,
    /// Entry spans ordered by start position
    spans: Vec<EntrySpan>,
    /// Doubling passes used by construction
    doubling_passes: u32,
}

impl SuffixArrayIndex {
    pub(super) fn new(
        text: Vec<char>,
        index: Vec<TextPosition>,
        spans: Vec<EntrySpan>,
        doubling_passes: u32,
    ) -> Self {
        Self {
            text,
            index,
            spans,
            doubling_passes,
        }
    }

    /// Suffix array over a corpus with no entries
    pub fn empty() -> Self {
        let text = vec![START_SENTINEL, END_SENTINEL, END_SENTINEL];
        // \0 END END < END \0 END < END END \0
        Self::new(text, vec![0, 2, 1], Vec::new(), 1)
    }

    /// The framed corpus
    #[inline]
    pub fn corpus(&self) -> &[char] {
        &self.text
    }

    /// Suffix start positions in rank order
    #[inline]
    pub fn suffixes(&self) -> &[TextPosition] {
        &self.index
    }

    /// Entry spans in corpus order
    #[inline]
    pub fn spans(&self) -> &[EntrySpan] {
        &self.spans
    }

    /// Compare the suffix starting at `pos` against `query`.
    ///
    /// Walks `min(n, |query|)` code points cyclically and returns on the
    /// first mismatch. When all of them agree the residual decides: a
    /// corpus shorter than the query orders first, otherwise the suffix is
    /// equal to (same length) or greater than the query.
    fn compare_at(&self, pos: TextPosition, query: &[char]) -> Ordering {
        let n = self.text.len();
        let size = n.min(query.len());

        for (i, &q) in query[..size].iter().enumerate() {
            let c = self.text[wrap(pos as usize + i, n)];
            match c.cmp(&q) {
                Ordering::Equal => continue,
                other => return other,
            }
        }

        n.cmp(&query.len())
    }

    /// Smallest rank whose suffix is not less than `query`, never rank 0
    fn floor(&self, query: &[char]) -> usize {
        let left = self
            .index
            .partition_point(|&pos| self.compare_at(pos, query) == Ordering::Less);
        left.max(1)
    }

    /// Largest rank whose suffix is less than `query + END + END`.
    ///
    /// Every suffix with `query` as a prefix continues with content or a
    /// separator, both below `END`, so all of them fall at or before this
    /// rank. Returns `None` when no suffix qualifies.
    fn ceiling(&self, query: &[char]) -> Option<usize> {
        let mut bound = Vec::with_capacity(query.len() + END_SENTINEL_RUN);
        bound.extend_from_slice(query);
        bound.extend(std::iter::repeat_n(END_SENTINEL, END_SENTINEL_RUN));

        let below = self
            .index
            .partition_point(|&pos| self.compare_at(pos, &bound) == Ordering::Less);
        below.checked_sub(1).map(|right| right.min(self.index.len() - 1))
    }

    /// Rank range of suffixes that start with `query`
    pub fn prefix_range(&self, query: &[char]) -> Option<RangeInclusive<usize>> {
        let left = self.floor(query);
        let right = self.ceiling(query)?;
        (left <= right).then_some(left..=right)
    }

    /// Corpus offsets at which `query` occurs
    pub fn find_prefix_match(&self, query: &str) -> Vec<TextPosition> {
        let query: Vec<char> = query.chars().collect();
        match self.prefix_range(&query) {
            Some(range) => self.index[range].to_vec(),
            None => Vec::new(),
        }
    }

    /// Number of occurrences of `query` in the corpus
    pub fn count_matches(&self, query: &str) -> usize {
        let query: Vec<char> = query.chars().collect();
        self.prefix_range(&query).map_or(0, |range| range.count())
    }

    /// Entry owning a corpus offset: the span with the greatest start at or
    /// before `pos`. Offsets before the first entry belong to none.
    pub fn position_to_entry(&self, pos: TextPosition) -> Option<EntryId> {
        let after = self.spans.partition_point(|span| span.start <= pos);
        after.checked_sub(1).map(|i| self.spans[i].id)
    }

    /// Distinct ids of entries whose content contains `query`
    pub fn search_entry_ids(&self, query: &str) -> BTreeSet<EntryId> {
        if query.chars().any(is_reserved) {
            return BTreeSet::new();
        }

        self.find_prefix_match(query)
            .into_iter()
            .filter_map(|pos| self.position_to_entry(pos))
            .collect()
    }

    /// Get statistics about this suffix array
    pub fn stats(&self) -> SuffixArrayStats {
        SuffixArrayStats {
            corpus_len: self.text.len(),
            entry_count: self.spans.len(),
            doubling_passes: self.doubling_passes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::suffix_array::builder::SuffixArrayBuilder;

    fn build(entries: &[(EntryId, &str)]) -> SuffixArrayIndex {
        let mut builder = SuffixArrayBuilder::new();
        for &(id, content) in entries {
            builder.add_entry(id, content);
        }
        builder.build().unwrap()
    }

    fn ids(sa: &SuffixArrayIndex, query: &str) -> Vec<EntryId> {
        sa.search_entry_ids(query).into_iter().collect()
    }

    #[test]
    fn test_search_basic() {
        let sa = build(&[(1, "apple"), (2, "maple")]);

        assert_eq!(ids(&sa, "ple"), vec![1, 2]);
        assert_eq!(ids(&sa, "xyz"), Vec::<EntryId>::new());
        assert_eq!(ids(&sa, "app"), vec![1]);
    }

    #[test]
    fn test_search_full_content() {
        let sa = build(&[(1, "apple"), (2, "maple")]);

        // Including the last entry, which sits right before the end run
        assert_eq!(ids(&sa, "apple"), vec![1]);
        assert_eq!(ids(&sa, "maple"), vec![2]);
    }

    #[test]
    fn test_search_single_entry() {
        let sa = build(&[(42, "apple")]);

        assert_eq!(ids(&sa, "apple"), vec![42]);
        assert_eq!(ids(&sa, "e"), vec![42]);
        assert_eq!(ids(&sa, "a"), vec![42]);
    }

    #[test]
    fn test_no_match_across_entries() {
        let sa = build(&[(1, "apple"), (2, "maple")]);

        // "apple" + "maple" would contain "em" if entries were not separated
        assert!(ids(&sa, "em").is_empty());
        assert!(ids(&sa, "lema").is_empty());
    }

    #[test]
    fn test_find_prefix_match_offsets() {
        let sa = build(&[(1, "banana")]);
        let corpus = sa.corpus();

        let mut offsets = sa.find_prefix_match("ana");
        offsets.sort_unstable();
        assert_eq!(offsets, vec![2, 4]);

        for pos in offsets {
            let at: String = corpus[pos as usize..pos as usize + 3].iter().collect();
            assert_eq!(at, "ana");
        }

        assert_eq!(sa.count_matches("a"), 3);
        assert_eq!(sa.count_matches("nab"), 0);
    }

    #[test]
    fn test_repeated_match_in_one_entry() {
        let sa = build(&[(1, "fox fox fox"), (2, "dog")]);

        assert_eq!(sa.count_matches("fox"), 3);
        assert_eq!(ids(&sa, "fox"), vec![1]);
    }

    #[test]
    fn test_empty_query_matches_every_entry() {
        let sa = build(&[(1, "a"), (2, ""), (3, "bc")]);

        assert_eq!(ids(&sa, ""), vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_matches_built() {
        let built = build(&[]);
        let empty = SuffixArrayIndex::empty();

        assert_eq!(empty.corpus(), built.corpus());
        assert_eq!(empty.suffixes(), built.suffixes());
    }

    #[test]
    fn test_empty_corpus() {
        let sa = build(&[]);

        assert!(ids(&sa, "a").is_empty());
        assert!(ids(&sa, "").is_empty());
        assert_eq!(sa.stats().corpus_len, 3);
    }

    #[test]
    fn test_query_longer_than_corpus() {
        let sa = build(&[(1, "ab")]);

        assert!(ids(&sa, "abcdefghijklmnop").is_empty());
        assert!(ids(&sa, "ab ab").is_empty());
    }

    #[test]
    fn test_reserved_query_matches_nothing() {
        let sa = build(&[(1, "apple"), (2, "maple")]);

        assert!(ids(&sa, "\u{10FFFF}").is_empty());
        assert!(ids(&sa, "e\u{10FFFE}").is_empty());
        assert!(ids(&sa, "\u{0}").is_empty());
    }

    #[test]
    fn test_multibyte_search() {
        let sa = build(&[(1, "北京地区投放"), (2, "上海地区"), (3, "广州")]);

        assert_eq!(ids(&sa, "地区"), vec![1, 2]);
        assert_eq!(ids(&sa, "广州"), vec![3]);
        assert!(ids(&sa, "不存在").is_empty());
    }

    #[test]
    fn test_position_to_entry() {
        let sa = build(&[(10, "hello"), (20, "world")]);

        // Offset 0 is the start sentinel
        assert_eq!(sa.position_to_entry(0), None);
        assert_eq!(sa.position_to_entry(1), Some(10));
        assert_eq!(sa.position_to_entry(5), Some(10));
        // "hello" + separator = 6 code points after the sentinel
        assert_eq!(sa.position_to_entry(7), Some(20));
        assert_eq!(sa.position_to_entry(11), Some(20));
    }

    #[test]
    fn test_matches_naive_containment() {
        let words = ["ab", "ba", "abab", "bb", "a", "", "bab", "aab"];
        let entries: Vec<(EntryId, &str)> = words
            .iter()
            .enumerate()
            .map(|(i, w)| (i as EntryId * 3, *w))
            .collect();
        let sa = build(&entries);

        for query in ["a", "b", "ab", "ba", "aba", "bab", "abab", "aab", "bbb", ""] {
            let expected: Vec<EntryId> = entries
                .iter()
                .filter(|(_, content)| content.contains(query))
                .map(|&(id, _)| id)
                .collect();
            assert_eq!(ids(&sa, query), expected, "query {:?}", query);
        }
    }
}
