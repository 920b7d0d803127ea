//! Per-owner index registry
//!
//! Owns one [`HotSwapBuffer`] per owner, created lazily on first write, and
//! the scheduler that sweeps them. All operations are safe to call from many
//! threads at once.

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::index::hot_swap::HotSwapBuffer;
use crate::index::scheduler::{RebuildScheduler, SchedulerHandle, SharedBuffers, SweepReport};
use crate::index::stats::RegistryStats;
use crate::index::types::{validate_text, Entry, EntryId, OwnerId};
use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct IndexRegistry {
    config: IndexConfig,
    /// Buffers by owner
    buffers: SharedBuffers,
    scheduler: RebuildScheduler,
    /// Running ticker, if started
    handle: Mutex<Option<SchedulerHandle>>,
    /// Set by shutdown; scheduled and manual sweeps are refused afterwards
    closed: AtomicBool,
}

impl IndexRegistry {
    /// Create an empty registry. The scheduler is not started.
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;

        let buffers: SharedBuffers = Arc::new(RwLock::new(AHashMap::new()));
        let scheduler = RebuildScheduler::new(Arc::clone(&buffers), &config)?;

        Ok(Self {
            config,
            buffers,
            scheduler,
            handle: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn buffer(&self, owner: OwnerId) -> Option<Arc<HotSwapBuffer>> {
        self.buffers.read().get(&owner).cloned()
    }

    fn get_or_create(&self, owner: OwnerId) -> Arc<HotSwapBuffer> {
        // Check with read lock first
        if let Some(buffer) = self.buffer(owner) {
            return buffer;
        }

        let mut buffers = self.buffers.write();

        // Double-check after acquiring write lock
        if let Some(buffer) = buffers.get(&owner) {
            return Arc::clone(buffer);
        }

        debug!(owner, "Creating buffer");
        let buffer = Arc::new(HotSwapBuffer::new(owner, &self.config));
        buffers.insert(owner, Arc::clone(&buffer));
        buffer
    }

    /// Bulk load entries for any number of owners.
    ///
    /// Validation is all-or-nothing: every entry is checked before any
    /// buffer is touched. Each owner's batch is then upserted and rebuilt
    /// inline if it reached the soft threshold, with owners loaded in
    /// parallel. A rebuild that fails there (`CorpusTooLarge`) returns the
    /// error, but other owners may already be loaded, and the failing
    /// owner keeps its entries in its overlays.
    pub fn load<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (OwnerId, Entry)>,
    {
        let start = Instant::now();

        let mut grouped: BTreeMap<OwnerId, Vec<Entry>> = BTreeMap::new();
        for (owner, entry) in entries {
            validate_text("content", &entry.content).map_err(|e| match e {
                IndexError::InvalidArgument(msg) => IndexError::InvalidArgument(format!(
                    "owner {} entry {}: {}",
                    owner, entry.id, msg
                )),
                other => other,
            })?;
            grouped.entry(owner).or_default().push(entry);
        }

        let owners = grouped.len();
        let total: usize = grouped.values().map(Vec::len).sum();

        let rebuilt = grouped
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(owner, entries)| self.get_or_create(owner).batch_load(entries))
            .collect::<Result<Vec<bool>>>()?
            .into_iter()
            .filter(|&rebuilt| rebuilt)
            .count();

        info!(
            owners,
            entries = total,
            rebuilt,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Load finished"
        );

        Ok(())
    }

    /// Insert or replace one entry. Never rebuilds.
    pub fn push(&self, owner: OwnerId, id: EntryId, content: impl Into<Arc<str>>) -> Result<()> {
        let content: Arc<str> = content.into();
        validate_text("content", &content)?;

        self.get_or_create(owner)
            .insert_or_update(Entry { id, content });
        Ok(())
    }

    /// Ids of `owner`'s entries containing `keyword`, ascending.
    ///
    /// An owner with no writes yields an empty result, not an error.
    pub fn query(&self, owner: OwnerId, keyword: &str) -> Result<Vec<EntryId>> {
        let entries = self.query_entries(owner, keyword)?;
        Ok(entries.into_iter().map(|entry| entry.id).collect())
    }

    /// Entries of `owner` containing `keyword`, in id order
    pub fn query_entries(&self, owner: OwnerId, keyword: &str) -> Result<Vec<Entry>> {
        validate_text("keyword", keyword)?;

        let Some(buffer) = self.buffer(owner) else {
            debug!(owner, "Query for unknown owner");
            return Ok(Vec::new());
        };

        Ok(buffer.find(keyword)?.into_values().collect())
    }

    /// Owners with a buffer, ascending
    pub fn owners(&self) -> Vec<OwnerId> {
        let mut owners: Vec<OwnerId> = self.buffers.read().keys().copied().collect();
        owners.sort_unstable();
        owners
    }

    pub fn owner_count(&self) -> usize {
        self.buffers.read().len()
    }

    /// Run one rebuild sweep on the calling thread
    pub fn reindex_all(&self) -> Result<SweepReport> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IndexError::Scheduler("registry is shut down".to_string()));
        }
        Ok(self.scheduler.tick())
    }

    /// Start the periodic sweep. Starting twice is a no-op.
    pub fn start_scheduler(&self) -> Result<()> {
        let mut handle = self.handle.lock();

        if self.closed.load(Ordering::SeqCst) {
            return Err(IndexError::Scheduler("registry is shut down".to_string()));
        }
        if handle.as_ref().is_some_and(SchedulerHandle::is_running) {
            return Ok(());
        }

        *handle = Some(self.scheduler.spawn()?);
        Ok(())
    }

    pub fn is_scheduler_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(SchedulerHandle::is_running)
    }

    /// Stop the scheduler, waiting for an in-flight sweep, and refuse
    /// further sweeps. Reads and writes keep working.
    pub fn shutdown(&self) {
        let mut handle = self.handle.lock();
        self.closed.store(true, Ordering::SeqCst);

        if let Some(mut running) = handle.take() {
            running.stop();
            info!("Scheduler shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> RegistryStats {
        let buffers: Vec<Arc<HotSwapBuffer>> = self.buffers.read().values().cloned().collect();
        let mut owners: Vec<_> = buffers.iter().map(|b| b.stats()).collect();
        owners.sort_unstable_by_key(|s| s.owner);
        RegistryStats { owners }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::scheduler::wait_until;
    use std::time::Duration;

    fn registry(soft_threshold: usize) -> IndexRegistry {
        IndexRegistry::new(IndexConfig::with_soft_threshold(soft_threshold)).unwrap()
    }

    fn fox_entries(owner: OwnerId) -> Vec<(OwnerId, Entry)> {
        vec![
            (owner, Entry::new(1, "red fox")),
            (owner, Entry::new(2, "blue fox")),
            (owner, Entry::new(3, "red car")),
        ]
    }

    #[test]
    fn test_load_and_query() {
        let registry = registry(1000);
        registry.load(fox_entries(42)).unwrap();

        assert_eq!(registry.query(42, "fox").unwrap(), vec![1, 2]);
        assert_eq!(registry.query(42, "red").unwrap(), vec![1, 3]);
        assert_eq!(registry.query(42, "car").unwrap(), vec![3]);
        assert!(registry.query(42, "zzz").unwrap().is_empty());
    }

    #[test]
    fn test_load_rebuilds_at_threshold() {
        let registry = registry(3);
        registry.load(fox_entries(42)).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.owners[0].generation, 1);
        assert_eq!(stats.owners[0].snapshot_entries, 3);
        assert_eq!(registry.query(42, "fox").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_unknown_owner_is_empty() {
        let registry = registry(10);
        assert!(registry.query(404, "anything").unwrap().is_empty());
        assert!(registry.query(404, "").unwrap().is_empty());
        assert_eq!(registry.owner_count(), 0);
    }

    #[test]
    fn test_owners_are_isolated() {
        let registry = registry(1000);
        registry.push(1, 10, "shared word").unwrap();
        registry.push(2, 20, "shared word").unwrap();

        assert_eq!(registry.query(1, "shared").unwrap(), vec![10]);
        assert_eq!(registry.query(2, "shared").unwrap(), vec![20]);
        assert_eq!(registry.owners(), vec![1, 2]);
    }

    #[test]
    fn test_query_entries_returns_content() {
        let registry = registry(1000);
        registry.load(fox_entries(1)).unwrap();

        let entries = registry.query_entries(1, "fox").unwrap();
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_ref()).collect();
        assert_eq!(contents, vec!["red fox", "blue fox"]);
    }

    #[test]
    fn test_invalid_load_touches_nothing() {
        let registry = registry(1000);
        let entries = vec![
            (1, Entry::new(1, "fine")),
            (2, Entry::new(1, "bad\u{0}")),
        ];

        let err = registry.load(entries).unwrap_err();
        assert!(matches!(err, IndexError::InvalidArgument(_)));
        assert_eq!(registry.owner_count(), 0);
    }

    #[test]
    fn test_invalid_push_and_keyword() {
        let registry = registry(1000);

        assert!(matches!(
            registry.push(1, 1, "x\u{10FFFF}"),
            Err(IndexError::InvalidArgument(_))
        ));
        assert_eq!(registry.owner_count(), 0);

        assert!(matches!(
            registry.query(1, "\u{10FFFE}"),
            Err(IndexError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            IndexRegistry::new(IndexConfig::with_soft_threshold(0)),
            Err(IndexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_reindex_all_manual_tick() {
        let registry = registry(2);
        registry.push(1, 1, "one").unwrap();
        registry.push(1, 2, "two").unwrap();
        registry.push(2, 1, "alone").unwrap();

        let report = registry.reindex_all().unwrap();
        assert_eq!(report.rebuilt, 1);
        assert_eq!(report.skipped, 1);

        let stats = registry.stats();
        assert_eq!(stats.owners[0].owner, 1);
        assert_eq!(stats.owners[0].generation, 1);
        assert_eq!(stats.owners[1].generation, 0);
        assert_eq!(registry.query(1, "o").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_scheduler_lifecycle() {
        let config = IndexConfig {
            scheduler_initial_delay_ms: 10,
            scheduler_period_ms: 10,
            ..IndexConfig::with_soft_threshold(1)
        };
        let registry = IndexRegistry::new(config).unwrap();

        registry.start_scheduler().unwrap();
        registry.start_scheduler().unwrap();
        assert!(registry.is_scheduler_running());

        registry.push(5, 1, "background").unwrap();
        assert!(wait_until(Duration::from_secs(5), || {
            registry.stats().owners[0].generation >= 1
        }));

        registry.shutdown();
        assert!(!registry.is_scheduler_running());
        assert!(registry.is_shut_down());
        assert!(registry.reindex_all().is_err());
        assert!(registry.start_scheduler().is_err());

        // Reads and writes still work
        registry.push(5, 2, "after").unwrap();
        assert_eq!(registry.query(5, "a").unwrap(), vec![1, 2]);
    }
}
