//! Cache Entry Module
//!
//! Defines the structure for individual cache entries.

use crate::cache::lru::Handle;

// == Cache Entry ==
/// A stored value plus the handle of its node in the recency list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The stored value
    pub value: Vec<u8>,
    /// Position in the LRU tracker
    pub handle: Handle,
}

impl CacheEntry {
    // == Constructor ==
    pub fn new(value: Vec<u8>, handle: Handle) -> Self {
        Self { value, handle }
    }

    /// Replaces the value in place, returning the old one.
    pub fn replace(&mut self, value: Vec<u8>) -> Vec<u8> {
        std::mem::replace(&mut self.value, value)
    }

    /// Size of the stored value in bytes.
    pub fn size(&self) -> usize {
        self.value.len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new(b"test_value".to_vec(), 3);
        assert_eq!(entry.value, b"test_value");
        assert_eq!(entry.handle, 3);
        assert_eq!(entry.size(), 10);
    }

    #[test]
    fn test_entry_replace_keeps_handle() {
        let mut entry = CacheEntry::new(b"old".to_vec(), 7);
        let old = entry.replace(b"new".to_vec());
        assert_eq!(old, b"old");
        assert_eq!(entry.value, b"new");
        assert_eq!(entry.handle, 7);
    }
}
