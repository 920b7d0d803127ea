use crate::error::{IndexError, Result};
use crate::index::suffix_array::types::is_reserved;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Isolation key partitioning the index space (e.g. a user id)
pub type OwnerId = i64;

/// Identifier of an entry, unique within its owner
pub type EntryId = i64;

/// Id-ordered map of entries; the full data set behind a snapshot
pub type Stash = BTreeMap<EntryId, Entry>;

/// Id-ordered map of writes accepted since a snapshot's cut
pub type Overlay = BTreeMap<EntryId, Entry>;

/// Entries matching a query, keyed by id
pub type Matches = BTreeMap<EntryId, Entry>;

/// One unit of indexed text.
///
/// Content is reference counted so that copying a stash or an overlay
/// never copies text.
#[derive(Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub content: Arc<str>,
}

impl Entry {
    pub fn new(id: EntryId, content: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }

    /// Exact substring containment on the entry's content
    #[inline]
    pub fn contains(&self, query: &str) -> bool {
        memchr::memmem::find(self.content.as_bytes(), query.as_bytes()).is_some()
    }

    /// Length of the content in code points
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entry({}, {:?})", self.id, self.content)
    }
}

/// Reject text containing a code point reserved for corpus framing
pub fn validate_text(what: &str, text: &str) -> Result<()> {
    match text.chars().position(is_reserved) {
        Some(pos) => Err(IndexError::InvalidArgument(format!(
            "{} contains a reserved code point at position {}",
            what, pos
        ))),
        None => Ok(()),
    }
}
