//! Sequence-ordered segment store shared by both directions of a session.
//!
//! [`OrderedBuffer`] maps a sequence number to an item plus a timestamp.
//! The send side stores encoded segments stamped with their last
//! transmission time; the receive side stores decoded segments stamped with
//! their arrival time.

use std::collections::btree_map::{self, BTreeMap};
use std::time::Instant;

/// One buffered item and the time it was last touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferEntry<T> {
    pub item: T,
    pub stamp: Instant,
}

/// Items keyed by sequence number, iterated in increasing order.
#[derive(Debug, Clone)]
pub struct OrderedBuffer<T> {
    entries: BTreeMap<u32, BufferEntry<T>>,
}

impl<T> Default for OrderedBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedBuffer<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Store `item` under `seq`, replacing any previous entry.
    pub fn insert(&mut self, seq: u32, item: T, stamp: Instant) {
        self.entries.insert(seq, BufferEntry { item, stamp });
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.entries.contains_key(&seq)
    }

    pub fn get(&self, seq: u32) -> Option<&BufferEntry<T>> {
        self.entries.get(&seq)
    }

    /// Lowest-numbered entry, if any.
    pub fn first(&self) -> Option<(u32, &BufferEntry<T>)> {
        self.entries.first_key_value().map(|(seq, e)| (*seq, e))
    }

    /// Remove and return the lowest-numbered entry.
    pub fn remove_first(&mut self) -> Option<(u32, BufferEntry<T>)> {
        self.entries.pop_first()
    }

    /// Cumulative purge: drop every entry with a sequence number below `seq`.
    ///
    /// Returns how many entries were removed.
    pub fn remove_below(&mut self, seq: u32) -> usize {
        let kept = self.entries.split_off(&seq);
        let removed = self.entries.len();
        self.entries = kept;
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence numbers currently held, in increasing order.
    pub fn keys(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            inner: self.entries.iter_mut(),
        }
    }
}

/// Mutable in-order traversal returned by [`OrderedBuffer::iter_mut`].
pub struct IterMut<'a, T> {
    inner: btree_map::IterMut<'a, u32, BufferEntry<T>>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = (u32, &'a mut BufferEntry<T>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(seq, e)| (*seq, e))
    }
}
