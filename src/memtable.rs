//! In-memory sorted write buffer.
//!
//! Every write lands here first (after the write-ahead log) and stays
//! until the accumulated payload crosses the flush threshold, at which
//! point the whole table is written out as a sorted segment and replaced
//! with an empty one. The running byte total is what the threshold check
//! in the tree compares against.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_skiplist::SkipMap;

/// Sorted `key -> value` map with a running payload-size accumulator.
///
/// The size of an entry is `len(key) + len(value)` in bytes. Replacing an
/// existing key subtracts the prior entry's contribution before adding
/// the new one, so the total always equals the sum over live entries.
#[derive(Debug, Default)]
pub struct Memtable {
    entries: SkipMap<String, String>,
    total_size: AtomicUsize,
}

impl Memtable {
    /// Create an empty memtable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key-value pair.
    pub fn set(&self, key: &str, value: &str) {
        if let Some(prior) = self.entries.get(key) {
            self.total_size
                .fetch_sub(key.len() + prior.value().len(), Ordering::SeqCst);
        }
        self.total_size
            .fetch_add(key.len() + value.len(), Ordering::SeqCst);
        self.entries.insert(key.to_string(), value.to_string());
    }

    /// The value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Sum of `len(key) + len(value)` over live entries, in bytes.
    pub fn total_size(&self) -> usize {
        self.total_size.load(Ordering::SeqCst)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
    }
}
