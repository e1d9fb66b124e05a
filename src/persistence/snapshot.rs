//! Snapshot Module
//!
//! Point-in-time image of every key/value pair. Each pair is stored as two
//! length-prefixed fields, each encoded on its own:
//!
//! ```text
//! ┌──────────────┬─────────────┬──────────────┬───────────────┐
//! │ key len (u32)│ key bytes   │ val len (u32)│ value bytes   │  ... repeated
//! └──────────────┴─────────────┴──────────────┴───────────────┘
//! ```

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::persistence::PayloadCodec;

const LEN_PREFIX: usize = 4;

// == Snapshot Load ==
/// Result of reading a snapshot file.
#[derive(Debug, Default)]
pub struct SnapshotLoad {
    /// Pairs in file order
    pub pairs: Vec<(Vec<u8>, Vec<u8>)>,
    /// Pairs dropped because a field failed to decode
    pub skipped: usize,
    /// Whether the file ended inside a frame
    pub truncated: bool,
}

// == Snapshot Store ==
/// Reads and atomically rewrites one snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    // == Save ==
    /// Writes every pair to a fresh file that replaces the previous snapshot.
    ///
    /// Returns the number of pairs written.
    pub fn save<'a, I>(&self, pairs: I, codec: &PayloadCodec) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        let tmp = self.temp_path();
        let written = write_temp(&tmp, pairs, codec).and_then(|count| {
            fs::rename(&tmp, &self.path)?;
            Ok(count)
        });
        if written.is_err() {
            if let Err(e) = fs::remove_file(&tmp) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %e, "cannot remove partial snapshot");
                }
            }
        }
        written.map_err(Into::into)
    }

    // == Load ==
    /// Reads every pair back. A missing or empty file is an empty snapshot.
    pub fn load(&self, codec: &PayloadCodec) -> Result<SnapshotLoad> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SnapshotLoad::default()),
            Err(e) => return Err(e.into()),
        };
        Ok(decode_frames(&bytes, codec))
    }
}

fn write_temp<'a, I>(tmp: &Path, pairs: I, codec: &PayloadCodec) -> io::Result<usize>
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let mut out = BufWriter::new(File::create(tmp)?);
    let mut count = 0;

    for (key, value) in pairs {
        write_field(&mut out, &codec.encode(key))?;
        write_field(&mut out, &codec.encode(value))?;
        count += 1;
    }

    out.flush()?;
    out.get_ref().sync_all()?;
    Ok(count)
}

fn write_field<W: Write>(out: &mut W, field: &[u8]) -> io::Result<()> {
    let len = u32::try_from(field.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("snapshot field of {} bytes exceeds frame limit", field.len()),
        )
    })?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(field)
}

fn read_field<'a>(bytes: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let prefix = bytes.get(*pos..*pos + LEN_PREFIX)?;
    let len = u32::from_le_bytes(prefix.try_into().ok()?) as usize;
    let start = *pos + LEN_PREFIX;
    let field = bytes.get(start..start.checked_add(len)?)?;
    *pos = start + len;
    Some(field)
}

fn decode_frames(bytes: &[u8], codec: &PayloadCodec) -> SnapshotLoad {
    let mut load = SnapshotLoad::default();
    let mut pos = 0;

    while pos < bytes.len() {
        let frame_start = pos;
        let (Some(key), Some(value)) = (read_field(bytes, &mut pos), read_field(bytes, &mut pos))
        else {
            warn!(offset = frame_start, "snapshot ends inside a frame; keeping pairs read so far");
            load.truncated = true;
            break;
        };

        match (codec.decode(key.to_vec()), codec.decode(value.to_vec())) {
            (Ok(key), Ok(value)) => load.pairs.push((key, value)),
            (Err(e), _) | (_, Err(e)) => {
                warn!(offset = frame_start, error = %e, "skipping undecodable snapshot pair");
                load.skipped += 1;
            }
        }
    }
    load
}
