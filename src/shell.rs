//! Command Shell Module
//!
//! Parses the line-oriented text commands of the interactive shell and runs
//! them against a cache.
//!
//! # Commands
//! - `SET key value...` - Store a value (the rest of the line, spaces included)
//! - `GET key` - Retrieve a value
//! - `DEL key` - Delete a key
//! - `INFO` - Entry count, capacity and statistics
//! - `SAVE` - Force a snapshot
//! - `FLUSH` - Force the log to disk
//! - `EXIT` / `QUIT` - Snapshot and leave

use std::fmt;

use crate::cache::LruCache;

// == Command ==
/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: String, value: String },
    Get { key: String },
    Del { key: String },
    Info,
    Save,
    Flush,
    Exit,
}

impl Command {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map(|(v, r)| (v, r.trim_start()))
            .unwrap_or((line, ""));

        let command = match verb.to_ascii_uppercase().as_str() {
            "SET" => {
                let (key, value) = rest
                    .split_once(char::is_whitespace)
                    .map(|(k, v)| (k, v.trim_start()))
                    .filter(|(_, v)| !v.is_empty())
                    .ok_or("wrong number of args for 'SET'")?;
                Self::Set {
                    key: key.to_string(),
                    value: value.to_string(),
                }
            }
            "GET" => Self::Get {
                key: single_arg(rest, "GET")?,
            },
            "DEL" => Self::Del {
                key: single_arg(rest, "DEL")?,
            },
            "INFO" => Self::Info,
            "SAVE" => Self::Save,
            "FLUSH" => Self::Flush,
            "EXIT" | "QUIT" => Self::Exit,
            _ => return Err("unknown command".to_string()),
        };
        Ok(Some(command))
    }
}

/// Decodes one raw input line. Invalid UTF-8 is replaced rather than
/// rejected so a stray byte never ends the session.
pub fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn single_arg(rest: &str, verb: &str) -> Result<String, String> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(key), None) => Ok(key.to_string()),
        _ => Err(format!("wrong number of args for '{}'", verb)),
    }
}

// == Reply ==
/// What the shell prints back for a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Value(String),
    Nil,
    Integer(i64),
    Info { entries: usize, capacity: usize, stats: String },
    Saved,
    Flushed,
    Bye,
    Error(String),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Value(v) => write!(f, "{}", v),
            Self::Nil => write!(f, "(nil)"),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Info {
                entries,
                capacity,
                stats,
            } => write!(f, "entries: {} capacity: {}\n{}", entries, capacity, stats),
            Self::Saved => write!(f, "Snapshot saved."),
            Self::Flushed => write!(f, "Log flushed."),
            Self::Bye => write!(f, "bye"),
            Self::Error(msg) => write!(f, "ERR {}", msg),
        }
    }
}

// == Execute ==
/// Runs a command against the cache.
pub fn execute(cache: &mut LruCache, command: Command) -> Reply {
    match command {
        Command::Set { key, value } => {
            cache.set(key, value);
            Reply::Ok
        }
        Command::Get { key } => match cache.get(key.as_bytes()) {
            Some(value) => Reply::Value(String::from_utf8_lossy(&value).into_owned()),
            None => Reply::Nil,
        },
        Command::Del { key } => Reply::Integer(i64::from(cache.del(key.as_bytes()))),
        Command::Info => Reply::Info {
            entries: cache.size(),
            capacity: cache.capacity(),
            stats: serde_json::to_string(&cache.stats()).unwrap_or_default(),
        },
        Command::Save => match cache.save_snapshot() {
            Ok(()) => Reply::Saved,
            Err(e) => Reply::Error(e.to_string()),
        },
        Command::Flush => match cache.flush_log() {
            Ok(()) => Reply::Flushed,
            Err(e) => Reply::Error(e.to_string()),
        },
        Command::Exit => match cache.save_snapshot() {
            Ok(()) => Reply::Bye,
            Err(e) => Reply::Error(format!("{} (exiting anyway)", e)),
        },
    }
}
