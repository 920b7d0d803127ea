//! Hot-swap buffer
//!
//! Rebuilding a suffix array is slow, so one owner's index is kept in two
//! generations and queries never wait for a rebuild:
//!
//! 1. Writes land in two overlays at once: the active one, which corrects
//!    reads against the published snapshot, and the standby one, which
//!    feeds the next rebuild.
//! 2. Once the active overlay reaches the soft threshold, a rebuild drains
//!    the standby overlay and builds a new snapshot from the published
//!    stash plus those writes, with no lock held that readers need.
//! 3. The new snapshot is published together with the standby overlay,
//!    which by then holds exactly the writes the new snapshot has not seen,
//!    and the standby overlay is resynchronized from it.
//!
//! ```text
//! writers ──► active overlay ─┐          readers ──► snapshot + active overlay
//!         └─► standby overlay ┴─ rebuild ─► new snapshot ─► swap
//! ```

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::index::snapshot::Snapshot;
use crate::index::stats::BufferStats;
use crate::index::types::{Entry, EntryId, Matches, Overlay, OwnerId, Stash};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// A published snapshot and the writes it has not absorbed
struct Generation {
    snapshot: Arc<Snapshot>,
    overlay: Overlay,
}

struct SwapState {
    /// Generation serving reads
    active: Generation,
    /// Writes not yet claimed by a rebuild. Equal to the active overlay
    /// except while a rebuild is in flight.
    standby: Overlay,
    /// Number of swaps performed
    generation: u64,
}

/// Double-buffered index for one owner
pub struct HotSwapBuffer {
    owner: OwnerId,
    soft_threshold: usize,
    hard_limit: usize,
    state: RwLock<SwapState>,
    /// Held for the whole of a rebuild; contenders skip instead of queueing
    rebuild_lock: Mutex<()>,
}

impl HotSwapBuffer {
    pub fn new(owner: OwnerId, config: &IndexConfig) -> Self {
        Self {
            owner,
            soft_threshold: config.soft_rebuild_threshold,
            hard_limit: config.hard_limit(),
            state: RwLock::new(SwapState {
                active: Generation {
                    snapshot: Arc::new(Snapshot::empty()),
                    overlay: Overlay::new(),
                },
                standby: Overlay::new(),
                generation: 0,
            }),
            rebuild_lock: Mutex::new(()),
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Upsert one entry into both overlays. Never rebuilds.
    pub fn insert_or_update(&self, entry: Entry) {
        let mut state = self.state.write();
        state.standby.insert(entry.id, entry.clone());
        state.active.overlay.insert(entry.id, entry);
    }

    /// Upsert a batch into both overlays, then attempt a rebuild inline.
    ///
    /// Returns whether a rebuild ran.
    pub fn batch_load<I>(&self, entries: I) -> Result<bool>
    where
        I: IntoIterator<Item = Entry>,
    {
        {
            let mut state = self.state.write();
            for entry in entries {
                state.standby.insert(entry.id, entry.clone());
                state.active.overlay.insert(entry.id, entry);
            }
        }

        self.try_reindex()
    }

    /// Entries whose content contains `query`.
    ///
    /// The published snapshot answers first; every overlay entry then
    /// either overwrites its id (still matches) or removes it (no longer
    /// matches). Fails with [`IndexError::Overloaded`] once the overlay has
    /// reached the hard limit.
    pub fn find(&self, query: &str) -> Result<Matches> {
        let (snapshot, corrections) = {
            let state = self.state.read();
            let overlay = &state.active.overlay;

            if overlay.len() >= self.hard_limit {
                error!(
                    owner = self.owner,
                    overlay_len = overlay.len(),
                    hard_limit = self.hard_limit,
                    "Overlay reached the hard limit; rebuilds are not keeping up. \
                     Raise soft_rebuild_threshold or hard_failure_factor, \
                     add scheduler threads, or shorten scheduler_period_ms"
                );
                return Err(IndexError::Overloaded {
                    overlay_len: overlay.len(),
                    hard_limit: self.hard_limit,
                });
            }

            let corrections: Vec<(EntryId, Option<Entry>)> = overlay
                .values()
                .map(|entry| (entry.id, entry.contains(query).then(|| entry.clone())))
                .collect();

            (Arc::clone(&state.active.snapshot), corrections)
        };

        let mut matches = snapshot.find(query);
        for (id, entry) in corrections {
            match entry {
                Some(entry) => {
                    matches.insert(id, entry);
                }
                None => {
                    matches.remove(&id);
                }
            }
        }

        Ok(matches)
    }

    /// Rebuild if the active overlay has reached the soft threshold.
    ///
    /// Only one rebuild runs per buffer; a caller that loses the race
    /// returns immediately. Returns whether this call rebuilt.
    pub fn try_reindex(&self) -> Result<bool> {
        if self.active_overlay_len() < self.soft_threshold {
            return Ok(false);
        }

        let Some(_guard) = self.rebuild_lock.try_lock() else {
            debug!(owner = self.owner, "Rebuild already in flight, skipping");
            return Ok(false);
        };

        // Another holder may have swapped between the check and the lock
        if self.active_overlay_len() < self.soft_threshold {
            return Ok(false);
        }

        self.rebuild_and_swap()?;
        Ok(true)
    }

    /// Rebuild regardless of the threshold, waiting for any in-flight
    /// rebuild to finish first
    pub fn force_reindex(&self) -> Result<()> {
        let _guard = self.rebuild_lock.lock();
        self.rebuild_and_swap()
    }

    /// Fold the standby overlay into a new snapshot and publish it.
    ///
    /// Caller must hold `rebuild_lock`.
    fn rebuild_and_swap(&self) -> Result<()> {
        self.rebuild_and_swap_with(|stash, taken| {
            Snapshot::build_from(stash, taken.into_values())
        })
    }

    /// Swap protocol around an arbitrary snapshot build. If `build` fails
    /// or panics, the standby overlay is restored before returning.
    fn rebuild_and_swap_with<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(&Stash, Overlay) -> Result<Snapshot>,
    {
        let start = Instant::now();

        let (base, taken) = {
            let mut state = self.state.write();
            let taken = std::mem::take(&mut state.standby);
            (Arc::clone(&state.active.snapshot), taken)
        };
        let delta = taken.len();

        debug!(
            owner = self.owner,
            base_entries = base.len(),
            delta,
            "Rebuild started"
        );

        // Readers keep using the published generation throughout
        let built = panic::catch_unwind(AssertUnwindSafe(|| build(base.stash(), taken)));

        let snapshot = match built {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                self.resync_standby();
                return Err(e);
            }
            Err(payload) => {
                self.resync_standby();
                panic::resume_unwind(payload);
            }
        };

        let entries = snapshot.len();
        let generation = {
            let mut state = self.state.write();
            let overlay = std::mem::take(&mut state.standby);
            state.standby = overlay.clone();
            state.active = Generation {
                snapshot: Arc::new(snapshot),
                overlay,
            };
            state.generation += 1;
            state.generation
        };

        info!(
            owner = self.owner,
            generation,
            entries,
            delta,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Rebuild finished, snapshot swapped"
        );

        Ok(())
    }

    /// Restore the standby overlay after a failed rebuild. The active
    /// overlay still holds every write since the published snapshot.
    fn resync_standby(&self) {
        let mut state = self.state.write();
        state.standby = state.active.overlay.clone();
    }

    /// Number of writes the published snapshot has not absorbed
    pub fn active_overlay_len(&self) -> usize {
        self.state.read().active.overlay.len()
    }

    /// Number of swaps performed so far
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn stats(&self) -> BufferStats {
        let rebuilding = self.rebuild_lock.is_locked();
        let state = self.state.read();
        let sa = state.active.snapshot.stats();

        BufferStats {
            owner: self.owner,
            generation: state.generation,
            snapshot_entries: state.active.snapshot.len(),
            corpus_len: sa.corpus_len,
            doubling_passes: sa.doubling_passes,
            active_overlay_len: state.active.overlay.len(),
            standby_overlay_len: state.standby.len(),
            soft_threshold: self.soft_threshold,
            hard_limit: self.hard_limit,
            rebuilding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(soft_threshold: usize) -> HotSwapBuffer {
        HotSwapBuffer::new(1, &IndexConfig::with_soft_threshold(soft_threshold))
    }

    fn ids(buffer: &HotSwapBuffer, query: &str) -> Vec<EntryId> {
        buffer.find(query).unwrap().into_keys().collect()
    }

    #[test]
    fn test_insert_visible_before_rebuild() {
        let buffer = buffer(100);
        buffer.insert_or_update(Entry::new(1, "red fox"));
        buffer.insert_or_update(Entry::new(2, "blue fox"));

        assert_eq!(buffer.generation(), 0);
        assert_eq!(ids(&buffer, "fox"), vec![1, 2]);
        assert_eq!(ids(&buffer, "red"), vec![1]);
    }

    #[test]
    fn test_insert_writes_both_overlays() {
        let buffer = buffer(100);
        buffer.insert_or_update(Entry::new(1, "a"));
        buffer.insert_or_update(Entry::new(1, "b"));
        buffer.insert_or_update(Entry::new(2, "c"));

        let stats = buffer.stats();
        assert_eq!(stats.active_overlay_len, 2);
        assert_eq!(stats.standby_overlay_len, 2);
    }

    #[test]
    fn test_batch_load_rebuilds_at_threshold() {
        let buffer = buffer(3);

        let rebuilt = buffer
            .batch_load(vec![Entry::new(1, "red fox"), Entry::new(2, "blue fox")])
            .unwrap();
        assert!(!rebuilt);
        assert_eq!(buffer.generation(), 0);

        let rebuilt = buffer.batch_load(vec![Entry::new(3, "red car")]).unwrap();
        assert!(rebuilt);

        let stats = buffer.stats();
        assert_eq!(stats.generation, 1);
        assert_eq!(stats.snapshot_entries, 3);
        assert_eq!(stats.active_overlay_len, 0);
        assert_eq!(stats.standby_overlay_len, 0);

        assert_eq!(ids(&buffer, "fox"), vec![1, 2]);
        assert_eq!(ids(&buffer, "red"), vec![1, 3]);
        assert_eq!(ids(&buffer, "car"), vec![3]);
        assert!(ids(&buffer, "zzz").is_empty());
    }

    #[test]
    fn test_try_reindex_below_threshold_is_noop() {
        let buffer = buffer(5);
        buffer.insert_or_update(Entry::new(1, "x"));

        assert!(!buffer.try_reindex().unwrap());
        assert!(!buffer.try_reindex().unwrap());
        assert_eq!(buffer.generation(), 0);
    }

    #[test]
    fn test_overlay_overrides_stale_snapshot() {
        let buffer = buffer(1);
        buffer.batch_load(vec![Entry::new(1, "apple")]).unwrap();
        assert_eq!(buffer.generation(), 1);

        // Changed away from matching: the snapshot still says "apple"
        buffer.insert_or_update(Entry::new(1, "pear"));
        assert!(ids(&buffer, "apple").is_empty());
        assert_eq!(ids(&buffer, "pear"), vec![1]);

        let found = buffer.find("pe").unwrap();
        assert_eq!(found[&1].content.as_ref(), "pear");
    }

    #[test]
    fn test_writes_survive_swap() {
        let buffer = buffer(2);
        buffer.insert_or_update(Entry::new(1, "alpha"));
        buffer.insert_or_update(Entry::new(2, "beta"));
        assert!(buffer.try_reindex().unwrap());

        buffer.insert_or_update(Entry::new(3, "gamma"));
        buffer.insert_or_update(Entry::new(4, "delta"));
        assert!(buffer.try_reindex().unwrap());

        assert_eq!(buffer.generation(), 2);
        assert_eq!(buffer.stats().snapshot_entries, 4);
        assert_eq!(ids(&buffer, "a"), vec![1, 2, 3, 4]);
        assert_eq!(ids(&buffer, "mm"), vec![3]);
    }

    #[test]
    fn test_hard_limit_fails_reads() {
        let buffer = buffer(2);
        for id in 0..4 {
            buffer.insert_or_update(Entry::new(id, "text"));
        }

        let err = buffer.find("text").unwrap_err();
        assert!(matches!(
            err,
            IndexError::Overloaded {
                overlay_len: 4,
                hard_limit: 4
            }
        ));

        // A rebuild drains the overlay and reads recover
        assert!(buffer.try_reindex().unwrap());
        assert_eq!(ids(&buffer, "text"), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_just_below_hard_limit_still_answers() {
        let buffer = buffer(2);
        for id in 0..3 {
            buffer.insert_or_update(Entry::new(id, "text"));
        }
        assert_eq!(ids(&buffer, "text"), vec![0, 1, 2]);
    }

    #[test]
    fn test_failed_rebuild_keeps_writes() {
        let buffer = buffer(2);
        buffer.insert_or_update(Entry::new(1, "first"));
        buffer.insert_or_update(Entry::new(2, "second"));

        let err = buffer
            .rebuild_and_swap_with(|_, _| {
                Err(IndexError::CorpusTooLarge {
                    len: usize::MAX,
                    max: 0,
                })
            })
            .unwrap_err();
        assert!(matches!(err, IndexError::CorpusTooLarge { .. }));

        let stats = buffer.stats();
        assert_eq!(stats.generation, 0);
        assert_eq!(stats.standby_overlay_len, stats.active_overlay_len);
        assert_eq!(stats.active_overlay_len, 2);
        assert!(!stats.rebuilding);
        assert_eq!(ids(&buffer, "s"), vec![1, 2]);

        buffer.insert_or_update(Entry::new(3, "third"));
        buffer.force_reindex().unwrap();

        let stats = buffer.stats();
        assert_eq!(stats.generation, 1);
        assert_eq!(stats.snapshot_entries, 3);
        assert_eq!(stats.active_overlay_len, 0);
        assert_eq!(ids(&buffer, "ir"), vec![1, 3]);
    }

    #[test]
    fn test_panicking_rebuild_keeps_writes() {
        let buffer = buffer(2);
        buffer.batch_load(vec![Entry::new(1, "base")]).unwrap();
        buffer.force_reindex().unwrap();
        buffer.insert_or_update(Entry::new(2, "pending"));
        buffer.insert_or_update(Entry::new(1, "based"));

        let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
            buffer.rebuild_and_swap_with(|_, _| panic!("build blew up"))
        }));
        assert!(unwound.is_err());

        let stats = buffer.stats();
        assert_eq!(stats.generation, 1);
        assert_eq!(stats.active_overlay_len, 2);
        assert_eq!(stats.standby_overlay_len, 2);
        assert_eq!(ids(&buffer, "based"), vec![1]);

        assert!(buffer.try_reindex().unwrap());
        let stats = buffer.stats();
        assert_eq!(stats.generation, 2);
        assert_eq!(stats.snapshot_entries, 2);
        assert_eq!(ids(&buffer, "base"), vec![1]);
        assert_eq!(ids(&buffer, "pending"), vec![2]);
    }

    #[test]
    fn test_force_reindex() {
        let buffer = buffer(1000);
        buffer.insert_or_update(Entry::new(5, "five"));

        buffer.force_reindex().unwrap();

        let stats = buffer.stats();
        assert_eq!(stats.generation, 1);
        assert_eq!(stats.snapshot_entries, 1);
        assert_eq!(stats.active_overlay_len, 0);
        assert!(!stats.rebuilding);
        assert_eq!(ids(&buffer, "five"), vec![5]);
    }

    #[test]
    fn test_rebuild_transparency() {
        let buffer = buffer(1000);
        let entries: Vec<Entry> = (0..200)
            .map(|i| Entry::new(i, format!("entry {} {}", i, if i % 3 == 0 { "fizz" } else { "" })))
            .collect();
        buffer.batch_load(entries).unwrap();

        let before = ids(&buffer, "fizz");
        buffer.force_reindex().unwrap();
        let after = ids(&buffer, "fizz");

        assert_eq!(before.len(), 67);
        assert_eq!(before, after);
    }

    #[test]
    fn test_concurrent_readers_during_rebuild() {
        let buffer = buffer(10_000);
        let entries: Vec<Entry> = (0..2000)
            .map(|i| Entry::new(i, format!("row {} {}", i, if i % 7 == 0 { "needle" } else { "hay" })))
            .collect();
        buffer.batch_load(entries).unwrap();
        let expected = ids(&buffer, "needle");

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        assert_eq!(ids(&buffer, "needle"), expected);
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..3 {
                    buffer.force_reindex().unwrap();
                }
            });
        });

        assert_eq!(buffer.generation(), 3);
        assert_eq!(ids(&buffer, "needle"), expected);
    }

    #[test]
    fn test_concurrent_writers_not_lost_across_rebuilds() {
        let buffer = buffer(50);

        std::thread::scope(|scope| {
            for writer in 0..4i64 {
                let buffer = &buffer;
                scope.spawn(move || {
                    for i in 0..100i64 {
                        buffer.insert_or_update(Entry::new(writer * 1000 + i, "token"));
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..20 {
                    let _ = buffer.try_reindex().unwrap();
                }
            });
        });

        buffer.force_reindex().unwrap();
        assert_eq!(buffer.find("token").unwrap().len(), 400);
        assert_eq!(buffer.stats().snapshot_entries, 400);
    }
}
