pub mod hot_swap;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
pub mod stats;
pub mod suffix_array;
pub mod types;

pub use hot_swap::HotSwapBuffer;
pub use registry::IndexRegistry;
pub use scheduler::{RebuildScheduler, SchedulerHandle, SweepReport};
pub use snapshot::Snapshot;
pub use types::*;
