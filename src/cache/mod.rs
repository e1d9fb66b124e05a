//! Cache Module
//!
//! Provides the bounded in-memory LRU engine and its startup recovery.

mod entry;
mod lru;
mod recovery;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use lru::{Handle, LruTracker};
pub use recovery::{RecoveryOrchestrator, RecoveryPhase, RecoveryReport};
pub use stats::CacheStats;
pub use store::{ApplyContext, LruCache};
