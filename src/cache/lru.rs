//! LRU Tracker Module
//!
//! Recency order kept as a doubly-linked list threaded through an arena of
//! nodes. Nodes are addressed by a stable integer [`Handle`], so the cache map
//! can point at its node without self-referential pointers.

// == Handle ==
/// Stable index of a node in the tracker's arena.
pub type Handle = usize;

#[derive(Debug)]
struct Node {
    key: Vec<u8>,
    prev: Option<Handle>,
    next: Option<Handle>,
}

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// - Head = Most recently used
/// - Tail = Least recently used
///
/// Every operation is O(1). Freed slots are recycled.
#[derive(Debug, Default)]
pub struct LruTracker {
    nodes: Vec<Option<Node>>,
    free: Vec<Handle>,
    head: Option<Handle>,
    tail: Option<Handle>,
    len: usize,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, handle: Handle) -> Option<&Node> {
        self.nodes.get(handle).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, handle: Handle) -> Option<&mut Node> {
        self.nodes.get_mut(handle).and_then(Option::as_mut)
    }

    fn unlink(&mut self, handle: Handle) {
        let Some(node) = self.node(handle) else {
            return;
        };
        let (prev, next) = (node.prev, node.next);

        match prev {
            Some(p) => {
                if let Some(n) = self.node_mut(p) {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(n) = self.node_mut(n) {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn link_front(&mut self, handle: Handle) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(handle) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(n) = self.node_mut(h) {
                    n.prev = Some(handle);
                }
            }
            None => self.tail = Some(handle),
        }
        self.head = Some(handle);
    }

    // == Insert ==
    /// Adds a key as most recently used and returns its handle.
    pub fn push_front(&mut self, key: Vec<u8>) -> Handle {
        let node = Node {
            key,
            prev: None,
            next: None,
        };
        let handle = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.link_front(handle);
        self.len += 1;
        handle
    }

    // == Touch ==
    /// Marks a handle as most recently used.
    pub fn touch(&mut self, handle: Handle) {
        if self.head == Some(handle) || self.node(handle).is_none() {
            return;
        }
        self.unlink(handle);
        self.link_front(handle);
    }

    // == Remove ==
    /// Removes a handle from the tracker, returning its key.
    pub fn remove(&mut self, handle: Handle) -> Option<Vec<u8>> {
        self.node(handle)?;
        self.unlink(handle);
        let node = self.nodes[handle].take()?;
        self.free.push(handle);
        self.len -= 1;
        Some(node.key)
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    ///
    /// Returns None if tracker is empty.
    pub fn pop_oldest(&mut self) -> Option<Vec<u8>> {
        let tail = self.tail?;
        self.remove(tail)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&[u8]> {
        self.tail
            .and_then(|t| self.node(t))
            .map(|n| n.key.as_slice())
    }

    /// Key stored under a handle.
    pub fn key(&self, handle: Handle) -> Option<&[u8]> {
        self.node(handle).map(|n| n.key.as_slice())
    }

    // == Iteration ==
    /// Keys from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = self.node(cursor?)?;
            cursor = node.next;
            Some(node.key.as_slice())
        })
    }

    /// Keys from least to most recently used.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let mut cursor = self.tail;
        std::iter::from_fn(move || {
            let node = self.node(cursor?)?;
            cursor = node.prev;
            Some(node.key.as_slice())
        })
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.len
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
