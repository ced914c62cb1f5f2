//! siltdb is a log-structured merge-tree key-value store over a local
//! filesystem.
//!
//! Writes are buffered in a sorted in-memory memtable backed by a
//! write-ahead log, then flushed as sorted `key,value` text segments once
//! a size threshold is crossed. A sparse index samples flushed keys for
//! near-direct reads, and a bloom filter short-circuits lookups for keys
//! that were never written. A JSON metadata checkpoint restores the
//! on-disk state on reopen; the write-ahead log replay restores the
//! memtable.

pub mod bitarray;
pub mod bloom;
pub mod config;
pub mod error;
pub mod hasher;
pub mod memtable;
pub mod metadata;
pub mod segment;
pub mod tree;
pub mod wal;

pub use config::Config;
pub use error::{Error, Result};
pub use tree::LsmTree;
