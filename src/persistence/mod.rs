//! Persistence Module
//!
//! Durability for the cache: an append-only log of every mutation plus
//! periodic snapshots, with optional encryption of every stored field.
//!
//! Run-time I/O failures never reach `get`/`set`/`del`: a failed append is
//! logged, the writer is dropped, and the next append tries to reopen it.

mod aof;
mod crypto;
mod snapshot;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

pub use aof::{encode_del, encode_set, AofReader, AofWriter, LogRecord};
pub use crypto::{AesCodec, PayloadCodec, IV_LEN, KEY_LEN};
pub use snapshot::{SnapshotLoad, SnapshotStore};

use crate::error::Result;

// == Persistence ==
/// Owns the log writer, the snapshot store and the payload codec.
#[derive(Debug)]
pub struct Persistence {
    codec: PayloadCodec,
    aof_path: PathBuf,
    aof: Option<AofWriter>,
    snapshot: SnapshotStore,
}

impl Persistence {
    // == Constructor ==
    /// Opens the log for appending. Failure to open is not fatal.
    pub fn open(
        aof_path: impl Into<PathBuf>,
        snapshot_path: impl Into<PathBuf>,
        codec: PayloadCodec,
    ) -> Self {
        let aof_path = aof_path.into();
        let aof = match AofWriter::open(&aof_path) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(path = %aof_path.display(), error = %e, "cannot open log; running without durability");
                None
            }
        };
        Self {
            codec,
            aof_path,
            aof,
            snapshot: SnapshotStore::new(snapshot_path),
        }
    }

    pub fn codec(&self) -> &PayloadCodec {
        &self.codec
    }

    pub fn aof_path(&self) -> &Path {
        &self.aof_path
    }

    pub fn snapshot_path(&self) -> &Path {
        self.snapshot.path()
    }

    /// Whether the log writer is currently open.
    pub fn is_durable(&self) -> bool {
        self.aof.is_some()
    }

    // == Log Append ==
    /// Appends a SET record. Returns false if the record was not persisted.
    pub fn append_set(&mut self, key: &[u8], value: &[u8]) -> bool {
        let record = encode_set(&self.codec, key, value);
        self.append(&record)
    }

    /// Appends a DEL record. Returns false if the record was not persisted.
    pub fn append_del(&mut self, key: &[u8]) -> bool {
        let record = encode_del(&self.codec, key);
        self.append(&record)
    }

    fn writer(&mut self) -> Option<&mut AofWriter> {
        if self.aof.is_none() {
            match AofWriter::open(&self.aof_path) {
                Ok(w) => {
                    info!(path = %self.aof_path.display(), "log reopened; durability restored");
                    self.aof = Some(w);
                }
                Err(e) => {
                    debug!(error = %e, "log still unavailable");
                    return None;
                }
            }
        }
        self.aof.as_mut()
    }

    fn append(&mut self, record: &[u8]) -> bool {
        let Some(writer) = self.writer() else {
            warn!("log unavailable; mutation applied in memory only");
            return false;
        };
        match writer.append(record) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "log append failed; mutation applied in memory only");
                self.aof = None;
                false
            }
        }
    }

    // == Flush ==
    /// Forces the log to stable storage.
    pub fn flush(&mut self) -> Result<()> {
        match self.aof.as_mut() {
            Some(writer) => writer.sync().map_err(Into::into),
            None => Ok(()),
        }
    }

    /// Drops an incomplete trailing record found during replay.
    pub fn truncate_log_to(&mut self, len: u64) -> Result<()> {
        match self.writer() {
            Some(writer) => writer.truncate_to(len).map_err(Into::into),
            None => Ok(()),
        }
    }

    // == Snapshot ==
    /// Writes a snapshot, then truncates the log it supersedes.
    ///
    /// The log is left untouched if the snapshot could not be written.
    pub fn snapshot<'a, I>(&mut self, pairs: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        let written = self.snapshot.save(pairs, &self.codec)?;
        match self.writer() {
            Some(writer) => writer.truncate()?,
            None => warn!("snapshot saved but log unavailable for truncation"),
        }
        info!(pairs = written, path = %self.snapshot.path().display(), "snapshot saved");
        Ok(written)
    }

    // == Load ==
    /// Reads the current snapshot.
    pub fn load_snapshot(&self) -> Result<SnapshotLoad> {
        self.snapshot.load(&self.codec)
    }

    /// Opens the log for replay; `None` when there is no log yet.
    pub fn replay(&self) -> Result<Option<AofReader<std::io::BufReader<std::fs::File>>>> {
        AofReader::open(&self.aof_path, self.codec.clone())
    }
}
