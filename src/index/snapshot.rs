//! Immutable, searchable view of one owner's entries at a point in time.

use crate::error::Result;
use crate::index::suffix_array::{SuffixArrayBuilder, SuffixArrayIndex, SuffixArrayStats};
use crate::index::types::{Entry, Matches, Stash};

/// Stash plus the suffix array built over it.
///
/// Never mutated after construction; readers share it through an `Arc`.
pub struct Snapshot {
    stash: Stash,
    index: SuffixArrayIndex,
}

impl Snapshot {
    /// Snapshot with no entries
    pub fn empty() -> Self {
        Self {
            stash: Stash::new(),
            index: SuffixArrayIndex::empty(),
        }
    }

    /// Build a snapshot over every entry in `stash`, in id order
    pub fn build(stash: Stash) -> Result<Self> {
        let capacity = stash.values().map(|entry| entry.char_len() + 1).sum();
        let mut builder = SuffixArrayBuilder::with_capacity(capacity);

        for entry in stash.values() {
            builder.add_entry(entry.id, &entry.content);
        }

        let index = builder.build()?;
        Ok(Self { stash, index })
    }

    /// Build a snapshot from a previous stash with `new_entries` upserted.
    ///
    /// Later entries win on id collision. The cost follows the number of
    /// distinct ids, not the number of writes that produced them.
    pub fn build_from<I>(previous: &Stash, new_entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut stash = previous.clone();
        for entry in new_entries {
            stash.insert(entry.id, entry);
        }
        Self::build(stash)
    }

    /// Entries whose content contains `query`
    pub fn find(&self, query: &str) -> Matches {
        self.index
            .search_entry_ids(query)
            .into_iter()
            .filter_map(|id| self.stash.get(&id).map(|entry| (id, entry.clone())))
            .collect()
    }

    /// The entries this snapshot was built from
    #[inline]
    pub fn stash(&self) -> &Stash {
        &self.stash
    }

    /// Number of entries in the snapshot
    #[inline]
    pub fn len(&self) -> usize {
        self.stash.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stash.is_empty()
    }

    pub fn stats(&self) -> SuffixArrayStats {
        self.index.stats()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}
