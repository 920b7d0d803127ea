use crate::index::types::OwnerId;
use serde::Serialize;

/// Point-in-time view of one owner's buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub owner: OwnerId,
    /// Swaps performed so far
    pub generation: u64,
    pub snapshot_entries: usize,
    /// Framed corpus length in code points
    pub corpus_len: usize,
    pub doubling_passes: u32,
    pub active_overlay_len: usize,
    pub standby_overlay_len: usize,
    pub soft_threshold: usize,
    pub hard_limit: usize,
    pub rebuilding: bool,
}

impl BufferStats {
    /// Reads fail while this holds
    pub fn is_overloaded(&self) -> bool {
        self.active_overlay_len >= self.hard_limit
    }
}

/// Every owner's buffer, ordered by owner id
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub owners: Vec<BufferStats>,
}

impl RegistryStats {
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    pub fn total_entries(&self) -> usize {
        self.owners.iter().map(|s| s.snapshot_entries).sum()
    }

    pub fn total_pending(&self) -> usize {
        self.owners.iter().map(|s| s.active_overlay_len).sum()
    }
}

/// Display registry statistics
pub fn show_stats(stats: &RegistryStats) {
    println!("Index Statistics");
    println!("================");
    println!();
    println!("Owners:           {}", stats.owner_count());
    println!("Indexed entries:  {}", stats.total_entries());
    println!("Pending writes:   {}", stats.total_pending());

    if stats.owners.is_empty() {
        return;
    }

    println!();
    println!(
        "  {:>10} {:>6} {:>10} {:>12} {:>8} {:>8}  status",
        "owner", "gen", "entries", "corpus", "active", "standby"
    );

    for s in &stats.owners {
        let status = if s.is_overloaded() {
            "overloaded"
        } else if s.rebuilding {
            "rebuilding"
        } else {
            ""
        };
        println!(
            "  {:>10} {:>6} {:>10} {:>12} {:>8} {:>8}  {}",
            s.owner,
            s.generation,
            s.snapshot_entries,
            format_count(s.corpus_len),
            s.active_overlay_len,
            s.standby_overlay_len,
            status
        );
    }
}

/// Format a code point count to human readable
fn format_count(n: usize) -> String {
    const K: usize = 1000;
    const M: usize = K * 1000;
    const G: usize = M * 1000;

    if n >= G {
        format!("{:.2}G", n as f64 / G as f64)
    } else if n >= M {
        format!("{:.2}M", n as f64 / M as f64)
    } else if n >= K {
        format!("{:.2}K", n as f64 / K as f64)
    } else {
        n.to_string()
    }
}
