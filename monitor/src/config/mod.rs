//! Configuration management for the monitor: data types and loading of the TOML config file.
//!
//! Watching the file for changes lives in [`crate::app`], since applying changes needs the
//! running host caches.

mod loader;
mod types;

pub use loader::*;
pub use types::*;
