//! Configuration Module
//!
//! Handles loading and validating cache configuration from environment variables.

use std::env;
use std::path::PathBuf;

use crate::error::{CacheError, Result};
use crate::persistence::{PayloadCodec, KEY_LEN};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Clone)]
pub struct Config {
    /// Maximum number of entries the cache can hold
    pub capacity: usize,
    /// Append-only log file
    pub aof_path: PathBuf,
    /// Snapshot file, fully rewritten on each save
    pub snapshot_path: PathBuf,
    /// 32-byte AES-256 key; `None` stores payloads as raw bytes
    pub encryption_key: Option<Vec<u8>>,
    /// Snapshot after this many logged mutations (0 = never)
    pub snapshot_every: usize,
    /// Background snapshot interval in seconds (0 = disabled)
    pub snapshot_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Maximum cache entries (default: 1000)
    /// - `AOF_PATH` - Append-only log path (default: data/aof.log)
    /// - `SNAPSHOT_PATH` - Snapshot path (default: data/snapshot.rdb)
    /// - `ENCRYPTION_KEY` - 32-byte key; unset runs unencrypted
    /// - `SNAPSHOT_EVERY` - Logged mutations between snapshots (default: 100)
    /// - `SNAPSHOT_INTERVAL` - Background snapshot period in seconds (default: 0)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            capacity: lookup("CACHE_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.capacity),
            aof_path: lookup("AOF_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.aof_path),
            snapshot_path: lookup("SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_path),
            encryption_key: lookup("ENCRYPTION_KEY")
                .filter(|v| !v.is_empty())
                .map(String::into_bytes),
            snapshot_every: lookup("SNAPSHOT_EVERY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.snapshot_every),
            snapshot_interval: lookup("SNAPSHOT_INTERVAL")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.snapshot_interval),
        }
    }

    /// Rejects settings the cache cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CacheError::InvalidCapacity(self.capacity));
        }
        if let Some(key) = &self.encryption_key {
            if key.len() != KEY_LEN {
                return Err(CacheError::InvalidConfig(format!(
                    "encryption key must be exactly {} bytes, got {}",
                    KEY_LEN,
                    key.len()
                )));
            }
        }
        if self.aof_path == self.snapshot_path {
            return Err(CacheError::InvalidConfig(
                "log and snapshot must be different files".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the payload codec selected by this configuration.
    pub fn codec(&self) -> Result<PayloadCodec> {
        match &self.encryption_key {
            Some(key) => PayloadCodec::aes256(key),
            None => Ok(PayloadCodec::Plain),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("capacity", &self.capacity)
            .field("aof_path", &self.aof_path)
            .field("snapshot_path", &self.snapshot_path)
            .field("encrypted", &self.encryption_key.is_some())
            .field("snapshot_every", &self.snapshot_every)
            .field("snapshot_interval", &self.snapshot_interval)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 1000,
            aof_path: PathBuf::from("data/aof.log"),
            snapshot_path: PathBuf::from("data/snapshot.rdb"),
            encryption_key: None,
            snapshot_every: 100,
            snapshot_interval: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.aof_path, PathBuf::from("data/aof.log"));
        assert_eq!(config.snapshot_path, PathBuf::from("data/snapshot.rdb"));
        assert!(config.encryption_key.is_none());
        assert_eq!(config.snapshot_every, 100);
        assert_eq!(config.snapshot_interval, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_empty_lookup_uses_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.snapshot_every, 100);
        assert!(config.encryption_key.is_none());
    }

    #[test]
    fn test_config_from_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("CACHE_CAPACITY", "2"),
            ("AOF_PATH", "/tmp/x.log"),
            ("SNAPSHOT_PATH", "/tmp/x.rdb"),
            ("ENCRYPTION_KEY", "12345678901234567890123456789012"),
            ("SNAPSHOT_EVERY", "0"),
            ("SNAPSHOT_INTERVAL", "30"),
        ]));
        assert_eq!(config.capacity, 2);
        assert_eq!(config.aof_path, PathBuf::from("/tmp/x.log"));
        assert_eq!(config.snapshot_path, PathBuf::from("/tmp/x.rdb"));
        assert_eq!(config.encryption_key.as_deref().map(<[u8]>::len), Some(32));
        assert_eq!(config.snapshot_every, 0);
        assert_eq!(config.snapshot_interval, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_unparsable_capacity_falls_back() {
        let config = Config::from_lookup(lookup_from(&[("CACHE_CAPACITY", "lots")]));
        assert_eq!(config.capacity, 1000);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = Config {
            capacity: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidCapacity(0))
        ));
    }

    #[test]
    fn test_validate_rejects_short_key() {
        let config = Config {
            encryption_key: Some(b"1234567890123456".to_vec()),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_shared_file() {
        let config = Config {
            snapshot_path: PathBuf::from("data/aof.log"),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let config = Config {
            encryption_key: Some(b"supersecretsupersecretsupersecre".to_vec()),
            ..Config::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("encrypted: true"));
    }
}
