//! Bounded ring buffer for per-asset history
//!
//! ## Overview
//!
//! Several pipeline stages keep a sliding view of the recent past: the
//! temporal detector needs the last K feature vectors, the drift monitor keeps
//! recent normalized vectors, and the RUL estimator keeps a health series.
//! All of them want the same behavior: constant-time append, automatic
//! eviction of the oldest entry, and iteration in chronological order.
//!
//! Capacities come from runtime configuration, so unlike a const-generic
//! array the storage is a `Vec` that grows until it reaches capacity and is
//! then overwritten in place.
//!
//! ```text
//! HistoryBuffer with capacity 5 after 7 pushes:
//! ┌─────┬─────┬─────┬─────┬─────┐
//! │  5  │  6  │  2  │  3  │  4  │  ← physical slots
//! └─────┴─────┴─────┴─────┴─────┘
//!             ↑
//!             └── write_pos = 2 (oldest entry, next overwrite)
//!
//! Logical view (iter): 2, 3, 4, 5, 6
//! ```
//!
//! ## Usage Example
//!
//! ```rust
//! use rotorguard_core::buffer::HistoryBuffer;
//!
//! let mut history = HistoryBuffer::new(3);
//! for value in [0.9, 0.8, 0.7, 0.6] {
//!     history.push(value);
//! }
//!
//! let values: Vec<f64> = history.iter().copied().collect();
//! assert_eq!(values, vec![0.8, 0.7, 0.6]);
//! assert_eq!(history.last(), Some(&0.6));
//! ```

use std::iter::Chain;
use std::slice;

/// Fixed-capacity ring buffer that overwrites its oldest entry when full
///
/// ## Internal Invariants
///
/// - `data.len() <= capacity`
/// - once `data.len() == capacity`, `write_pos` points at the oldest entry
/// - before that, entries are stored in insertion order starting at 0
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    /// Backing storage, grows up to `capacity`
    data: Vec<T>,

    /// Maximum number of entries retained
    capacity: usize,

    /// Index where the next overwrite will occur once full
    write_pos: usize,
}

impl<T> HistoryBuffer<T> {
    /// Create an empty buffer holding at most `capacity` entries
    ///
    /// A zero capacity is bumped to one so `push` always retains the latest entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
        }
    }

    /// Rebuild a buffer from entries ordered oldest to newest
    ///
    /// Only the newest `capacity` entries are kept.
    pub fn from_ordered(capacity: usize, entries: impl IntoIterator<Item = T>) -> Self {
        let mut buffer = Self::new(capacity);
        for entry in entries {
            buffer.push(entry);
        }
        buffer
    }

    /// Append an entry, evicting the oldest one when full
    pub fn push(&mut self, entry: T) {
        if self.data.len() < self.capacity {
            self.data.push(entry);
        } else {
            self.data[self.write_pos] = entry;
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }

    /// Maximum number of entries retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.get(self.len() - 1)
    }

    /// Entry by logical index (0 = oldest, len-1 = newest)
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.data.len() {
            return None;
        }
        let physical = if self.is_full() {
            (self.write_pos + index) % self.capacity
        } else {
            index
        };
        self.data.get(physical)
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> Chain<slice::Iter<'_, T>, slice::Iter<'_, T>> {
        let (older, newer) = if self.is_full() {
            let (head, tail) = self.data.split_at(self.write_pos);
            (tail, head)
        } else {
            (self.data.as_slice(), &[][..])
        };
        older.iter().chain(newer.iter())
    }

    /// Iterate over the newest `n` entries, oldest of them first
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &T> + '_ {
        let skip = self.len().saturating_sub(n);
        self.iter().skip(skip)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.data.clear();
        self.write_pos = 0;
    }
}

impl<T: Clone> HistoryBuffer<T> {
    /// Copy entries out, oldest to newest
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}
