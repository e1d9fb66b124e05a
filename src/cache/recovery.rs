//! Recovery Module
//!
//! Rebuilds the cache at startup: snapshot first, then every log record on
//! top of it, all without writing anything back to the log. Recovery is
//! best-effort; unreadable pairs and records are skipped, never fatal.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{ApplyContext, LruCache};
use crate::persistence::{LogRecord, Persistence};

// == Recovery Phase ==
/// Linear startup state machine. Phases only ever advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecoveryPhase {
    Start,
    LoadSnapshot,
    ReplayLog,
    Ready,
}

// == Recovery Report ==
/// What recovery managed to restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Pairs applied from the snapshot
    pub snapshot_pairs: usize,
    /// Snapshot pairs that failed to decode
    pub snapshot_skipped: usize,
    /// Log records applied
    pub log_records: usize,
    /// Log records that failed to decode or read
    pub log_skipped: usize,
    /// Offset of an incomplete trailing log record
    pub truncated_at: Option<u64>,
}

// == Recovery Orchestrator ==
#[derive(Debug)]
pub struct RecoveryOrchestrator {
    phase: RecoveryPhase,
    report: RecoveryReport,
}

impl Default for RecoveryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryOrchestrator {
    pub fn new() -> Self {
        Self {
            phase: RecoveryPhase::Start,
            report: RecoveryReport::default(),
        }
    }

    pub fn phase(&self) -> RecoveryPhase {
        self.phase
    }

    fn advance(&mut self, next: RecoveryPhase) {
        debug_assert!(next > self.phase, "recovery cannot move backwards");
        debug!(from = ?self.phase, to = ?next, "recovery phase");
        self.phase = next;
    }

    /// Runs every phase against `cache` and returns the report.
    pub fn run(mut self, cache: &mut LruCache) -> RecoveryReport {
        self.advance(RecoveryPhase::LoadSnapshot);
        self.load_snapshot(cache);

        self.advance(RecoveryPhase::ReplayLog);
        self.replay_log(cache);

        self.advance(RecoveryPhase::Ready);
        info!(
            snapshot_pairs = self.report.snapshot_pairs,
            log_records = self.report.log_records,
            skipped = self.report.snapshot_skipped + self.report.log_skipped,
            entries = cache.size(),
            "recovery complete"
        );
        self.report
    }

    fn load_snapshot(&mut self, cache: &mut LruCache) {
        let load = match cache.persistence().map(Persistence::load_snapshot) {
            None => return,
            Some(Ok(load)) => load,
            Some(Err(e)) => {
                warn!(error = %e, "snapshot unreadable; recovering from log only");
                return;
            }
        };

        self.report.snapshot_skipped = load.skipped;
        for (key, value) in load.pairs {
            cache.apply(LogRecord::Set { key, value }, ApplyContext::Replaying);
            self.report.snapshot_pairs += 1;
        }
    }

    fn replay_log(&mut self, cache: &mut LruCache) {
        let mut reader = match cache.persistence().map(Persistence::replay) {
            None | Some(Ok(None)) => return,
            Some(Ok(Some(reader))) => reader,
            Some(Err(e)) => {
                warn!(error = %e, "log unreadable; skipping replay");
                return;
            }
        };

        for item in reader.by_ref() {
            match item {
                Ok(record) => {
                    cache.apply(record, ApplyContext::Replaying);
                    self.report.log_records += 1;
                }
                Err(e) => {
                    warn!(error = %e, "skipping unreadable log record");
                    self.report.log_skipped += 1;
                }
            }
        }
        self.report.truncated_at = reader.truncated_at();
        drop(reader);

        // Live appends must start on a record boundary
        if let (Some(offset), Some(persistence)) =
            (self.report.truncated_at, cache.persistence_mut())
        {
            match persistence.truncate_log_to(offset) {
                Ok(()) => info!(offset, "incomplete log tail removed"),
                Err(e) => warn!(offset, error = %e, "cannot remove incomplete log tail"),
            }
        }
    }
}
