//! Append-Only Log Module
//!
//! Record format (lengths are byte counts of the stored, possibly encrypted, fields):
//!
//! ```text
//! S <klen> <vlen>\n<key bytes><value bytes>\n
//! D <klen>\n<key bytes>\n
//! ```
//!
//! Payloads are always read by length, never by scanning for a delimiter, so
//! keys and values may contain spaces, newlines or arbitrary binary data.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::persistence::PayloadCodec;

const SET_TAG: &str = "S";
const DEL_TAG: &str = "D";

// == Log Record ==
/// A single decoded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Set { key: Vec<u8>, value: Vec<u8> },
    Del { key: Vec<u8> },
}

impl LogRecord {
    /// Key the record applies to.
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Set { key, .. } | Self::Del { key } => key,
        }
    }
}

// == Encoding ==
/// Encodes a SET record.
pub fn encode_set(codec: &PayloadCodec, key: &[u8], value: &[u8]) -> Vec<u8> {
    let key = codec.encode(key);
    let value = codec.encode(value);
    let mut buf = format!("{} {} {}\n", SET_TAG, key.len(), value.len()).into_bytes();
    buf.reserve(key.len() + value.len() + 1);
    buf.extend_from_slice(&key);
    buf.extend_from_slice(&value);
    buf.push(b'\n');
    buf
}

/// Encodes a DEL record.
pub fn encode_del(codec: &PayloadCodec, key: &[u8]) -> Vec<u8> {
    let key = codec.encode(key);
    let mut buf = format!("{} {}\n", DEL_TAG, key.len()).into_bytes();
    buf.reserve(key.len() + 1);
    buf.extend_from_slice(&key);
    buf.push(b'\n');
    buf
}

// == Aof Writer ==
/// Long-lived handle on the log file, opened once in append mode.
#[derive(Debug)]
pub struct AofWriter {
    path: PathBuf,
    file: BufWriter<File>,
}

impl AofWriter {
    /// Opens (or creates) the log for appending.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: BufWriter::new(file),
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one encoded record and flushes it to the OS before returning.
    pub fn append(&mut self, record: &[u8]) -> io::Result<()> {
        self.file.write_all(record)?;
        self.file.flush()
    }

    /// Flushes and fsyncs the log.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()
    }

    /// Discards every record. Only valid right after a successful snapshot.
    pub fn truncate(&mut self) -> io::Result<()> {
        self.truncate_to(0)
    }

    /// Cuts the log back to `len` bytes, dropping an incomplete tail so the
    /// next append starts on a record boundary.
    pub fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.file.flush()?;
        let file = self.file.get_ref();
        file.set_len(len)?;
        file.sync_all()
    }
}

// == Aof Reader ==
/// Lazy, forward-only replay of a log.
///
/// Yields `Err(Decryption)` for a record whose payload fails to decode; the
/// record is consumed and iteration continues. A truncated tail ends the
/// iteration silently, see [`AofReader::truncated_at`].
pub struct AofReader<R> {
    reader: R,
    codec: PayloadCodec,
    header: Vec<u8>,
    offset: u64,
    truncated_at: Option<u64>,
    done: bool,
}

impl AofReader<BufReader<File>> {
    /// Opens a log file for replay. A missing file yields `Ok(None)`.
    pub fn open(path: impl AsRef<Path>, codec: PayloadCodec) -> Result<Option<Self>> {
        match File::open(path.as_ref()) {
            Ok(file) => Ok(Some(Self::new(BufReader::new(file), codec))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl<R: BufRead> AofReader<R> {
    /// Creates a reader over any buffered source.
    pub fn new(reader: R, codec: PayloadCodec) -> Self {
        Self {
            reader,
            codec,
            header: Vec::new(),
            offset: 0,
            truncated_at: None,
            done: false,
        }
    }

    /// Byte offset of the incomplete trailing record, if replay hit one.
    pub fn truncated_at(&self) -> Option<u64> {
        self.truncated_at
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn read_field(&mut self, len: usize, record_start: u64) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let read = (&mut self.reader).take(len as u64).read_to_end(&mut buf)?;
        self.offset += read as u64;
        if read < len {
            return Err(CacheError::TruncatedRecord(record_start));
        }
        Ok(buf)
    }

    fn skip_record_newline(&mut self) -> io::Result<()> {
        let next = self.reader.fill_buf()?;
        if next.first() == Some(&b'\n') {
            self.reader.consume(1);
            self.offset += 1;
        }
        Ok(())
    }

    fn read_record(&mut self) -> Option<Result<LogRecord>> {
        loop {
            let record_start = self.offset;
            self.header.clear();
            let read = match self.reader.read_until(b'\n', &mut self.header) {
                Ok(n) => n,
                Err(e) => return Some(Err(e.into())),
            };
            if read == 0 {
                return None;
            }
            self.offset += read as u64;
            if self.header.last() != Some(&b'\n') {
                return Some(Err(CacheError::TruncatedRecord(record_start)));
            }

            let header = match std::str::from_utf8(&self.header[..read - 1]) {
                Ok(h) => h.trim_end_matches('\r').to_string(),
                Err(_) => {
                    warn!(offset = record_start, "skipping non-text log header");
                    continue;
                }
            };
            if header.is_empty() || header.starts_with('#') {
                continue;
            }

            let mut parts = header.split_ascii_whitespace();
            let tag = parts.next().unwrap_or_default();
            let lengths: Option<Vec<usize>> = parts.map(|p| p.parse().ok()).collect();

            let record = match (tag, lengths.as_deref()) {
                (SET_TAG, Some(&[klen, vlen])) => {
                    let key = match self.read_field(klen, record_start) {
                        Ok(k) => k,
                        Err(e) => return Some(Err(e)),
                    };
                    let value = match self.read_field(vlen, record_start) {
                        Ok(v) => v,
                        Err(e) => return Some(Err(e)),
                    };
                    if let Err(e) = self.skip_record_newline() {
                        return Some(Err(e.into()));
                    }
                    self.codec.decode(key).and_then(|key| {
                        self.codec
                            .decode(value)
                            .map(|value| LogRecord::Set { key, value })
                    })
                }
                (DEL_TAG, Some(&[klen])) => {
                    let key = match self.read_field(klen, record_start) {
                        Ok(k) => k,
                        Err(e) => return Some(Err(e)),
                    };
                    if let Err(e) = self.skip_record_newline() {
                        return Some(Err(e.into()));
                    }
                    self.codec.decode(key).map(|key| LogRecord::Del { key })
                }
                _ => {
                    debug!(offset = record_start, header = %header, "skipping unknown log record");
                    continue;
                }
            };
            return Some(record);
        }
    }
}

impl<R: BufRead> Iterator for AofReader<R> {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            None => {
                self.done = true;
                None
            }
            Some(Err(CacheError::TruncatedRecord(offset))) => {
                warn!(offset, "log ends with an incomplete record; replay stops here");
                self.truncated_at = Some(offset);
                self.done = true;
                None
            }
            Some(Err(CacheError::Io(e))) => {
                warn!(error = %e, "log read failed; replay stops here");
                self.done = true;
                Some(Err(CacheError::Io(e)))
            }
            Some(item) => Some(item),
        }
    }
}
