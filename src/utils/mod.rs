//! Utilities for the command-line front end.
//!
//! - [`app_data`] - Application data directory (config file location)
//! - [`loader`] - Tab-separated entry files
//! - [`progress`] - Progress bar, no-op without the `progress` feature

pub mod app_data;
pub mod loader;
pub mod progress;

pub use app_data::*;
pub use loader::*;
