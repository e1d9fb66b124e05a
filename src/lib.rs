//! Redis Lite - An embeddable in-memory LRU cache
//!
//! Bounded key-value cache with strict LRU eviction, an append-only log of
//! every mutation, and optionally encrypted point-in-time snapshots.

pub mod cache;
pub mod config;
pub mod error;
pub mod persistence;
pub mod shell;
pub mod tasks;

pub use cache::{ApplyContext, LruCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_snapshot_task, SharedCache};
