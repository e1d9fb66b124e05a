//! Periodic Snapshot Task
//!
//! Background task that snapshots a shared cache on a timer, bounding how
//! much log has to be replayed after a restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::LruCache;

/// Cache shared with background tasks.
///
/// One lock covers a whole logical operation, so a mutation and its log
/// append are never observed apart.
pub type SharedCache = Arc<Mutex<LruCache>>;

/// Spawns a background task that snapshots the cache every `interval_secs`.
///
/// Snapshots are skipped while nothing has been logged since the last one.
/// A failed snapshot is logged and retried on the next tick.
///
/// # Example
/// ```ignore
/// let cache: SharedCache = Arc::new(Mutex::new(LruCache::open(&config)?));
/// let snapshot_handle = spawn_snapshot_task(cache.clone(), 60);
/// // Later, during shutdown:
/// snapshot_handle.abort();
/// ```
pub fn spawn_snapshot_task(cache: SharedCache, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting snapshot task with interval of {} seconds",
            interval.as_secs()
        );

        let mut last_logged = None;
        loop {
            tokio::time::sleep(interval).await;

            let mut guard = cache.lock().await;
            let stats = guard.stats();
            let logged = stats.log_appends + stats.log_failures;
            if last_logged == Some(logged) {
                debug!("Snapshot task: no mutations since last snapshot");
                continue;
            }

            match guard.save_snapshot() {
                Ok(()) => {
                    last_logged = Some(logged);
                    info!("Snapshot task: saved {} entries", guard.size());
                }
                Err(e) => warn!(error = %e, "Snapshot task: snapshot failed"),
            }
        }
    })
}
