//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the cache is shared.
//!
//! # Tasks
//! - Snapshot: writes a snapshot and compacts the log at a fixed interval

mod snapshot;

pub use snapshot::{spawn_snapshot_task, SharedCache};
