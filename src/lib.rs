//! # kwix - hot-swappable substring index
//!
//! kwix answers "which of this owner's entries contain this substring?"
//! from an in-memory suffix array, while writes keep arriving and the
//! array is rebuilt in the background.
//!
//! ## Architecture
//!
//! - [`index`] - Suffix array, snapshots, hot-swap buffers and the registry
//! - [`config`] - Thresholds and scheduler tuning
//! - [`error`] - Typed errors
//! - [`output`] - Result formatting
//! - [`utils`] - Config location, entry files, progress bars
//!
//! ## Quick Start
//!
//! ```no_run
//! use kwix::config::IndexConfig;
//! use kwix::index::{Entry, IndexRegistry};
//!
//! let registry = IndexRegistry::new(IndexConfig::default()).unwrap();
//! registry
//!     .load(vec![
//!         (7, Entry::new(1, "red fox")),
//!         (7, Entry::new(2, "blue fox")),
//!     ])
//!     .unwrap();
//! registry.push(7, 3, "red car").unwrap();
//!
//! assert_eq!(registry.query(7, "red").unwrap(), vec![1, 3]);
//! ```
//!
//! ## How reads stay fast
//!
//! Each owner has an immutable [`index::Snapshot`] plus an overlay of the
//! writes it has not absorbed yet. Queries search the snapshot and patch
//! the result with the overlay. When the overlay grows past the soft
//! threshold, a rebuild folds it into a new snapshot off to the side and
//! swaps it in; readers never wait for the build.

pub mod config;
pub mod error;
pub mod index;
pub mod output;
pub mod utils;

pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use index::{Entry, IndexRegistry};
