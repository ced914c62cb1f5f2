//! The LSM tree engine.
//!
//! Writes go through the write-ahead log into the sorted in-memory
//! memtable. When the accumulated payload would cross the configured
//! threshold, the engine first compacts existing segments (removing keys
//! the memtable is about to supersede), then flushes the memtable as a
//! new sorted segment — sampling every `sparsity` records into the sparse
//! index and recording every key in the bloom filter — clears the log,
//! and rotates to the next segment name.
//!
//! Reads consult the memtable, then the bloom filter, then floor-seek
//! through the sparse index into the most likely segment, falling back to
//! a binary scan of every segment in list order.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::bloom::BloomFilter;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::memtable::Memtable;
use crate::metadata::{IndexItem, Metadata};
use crate::segment::{self, LineReader};
use crate::wal::AppendLog;

const METADATA_FILE: &str = "database_metadata";
const MERGE_TEMP_FILE: &str = "temp";

/// A log-structured merge tree over a directory of sorted segment files.
///
/// Single-writer, single-reader: all operations run on the caller's
/// thread, and concurrent use of one instance requires external
/// synchronization.
pub struct LsmTree {
    config: Config,
    dir: PathBuf,
    wal: AppendLog,
    bloom: BloomFilter,
    memtable: Memtable,
    /// Flushed segment names, oldest first.
    segments: Vec<String>,
    /// Sparse index over sampled keys across all segments.
    index: BTreeMap<String, IndexItem>,
    /// Name the next flush will be written under.
    current_segment: String,
}

impl LsmTree {
    /// Open a tree with default configuration.
    ///
    /// Creates `dir` if missing, removes temp files left behind by an
    /// interrupted compaction or merge, opens or creates the write-ahead
    /// log, loads the metadata checkpoint if one exists, and replays the
    /// log into a fresh memtable.
    pub fn open(
        segment_basename: &str,
        dir: impl Into<PathBuf>,
        wal_basename: &str,
    ) -> Result<Self> {
        Self::open_with_config(segment_basename, dir, wal_basename, Config::default())
    }

    /// Open a tree with custom configuration.
    pub fn open_with_config(
        segment_basename: &str,
        dir: impl Into<PathBuf>,
        wal_basename: &str,
        config: Config,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        remove_stale_temp_files(&dir)?;

        let wal = AppendLog::open(dir.join(wal_basename), config.wal_sync)?;
        let mut tree = Self {
            bloom: BloomFilter::new(config.bloom_num_items, config.bloom_false_positive),
            memtable: Memtable::new(),
            segments: Vec::new(),
            index: BTreeMap::new(),
            current_segment: segment_basename.to_string(),
            dir,
            wal,
            config,
        };
        tree.load_metadata()?;
        tree.restore_memtable()?;

        tracing::debug!(
            dir = %tree.dir.display(),
            segments = tree.segments.len(),
            restored = tree.memtable.len(),
            "opened tree"
        );
        Ok(tree)
    }

    /// Insert or update a key-value pair.
    ///
    /// The record is appended to the write-ahead log before it reaches
    /// the memtable. Updating a key already present never triggers a
    /// flush; a new key whose projected size crosses the threshold runs
    /// compaction, flushes the memtable to the current segment, and
    /// rotates to the next segment name before the record is accepted.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_field(key, "key")?;
        validate_field(value, "value")?;

        let entry = log_entry(key, value);
        if self.memtable.contains(key) {
            self.wal.append_str(&entry)?;
            self.memtable.set(key, value);
            return Ok(());
        }

        let projected = self.memtable.total_size() + key.len() + value.len();
        if projected > self.config.threshold {
            let next = self.next_segment_name()?;
            self.compact()?;
            let path = self.segment_path(&self.current_segment);
            self.flush_memtable(&path)?;
            self.memtable = Memtable::new();
            self.wal.clear()?;
            self.segments
                .push(std::mem::replace(&mut self.current_segment, next));
            self.save_metadata()?;
        }

        self.wal.append_str(&entry)?;
        self.memtable.set(key, value);
        Ok(())
    }

    /// Look up the value for `key`, returning an empty string when the
    /// key is unknown.
    ///
    /// Keys and values are non-empty by contract, so the empty string is
    /// an unambiguous miss sentinel.
    pub fn get(&self, key: &str) -> Result<String> {
        if let Some(value) = self.memtable.get(key) {
            return Ok(value);
        }
        if !self.bloom.check(key) {
            return Ok(String::new());
        }

        // Floor-seek: the largest sampled key <= the query tells us where
        // in which segment a forward scan should start.
        let item = match self
            .index
            .range::<str, _>((std::ops::Bound::Unbounded, std::ops::Bound::Included(key)))
            .next_back()
        {
            Some((_, item)) => item.clone(),
            None => return self.search_all_segments(key),
        };

        let mut reader = LineReader::open(&self.segment_path(&item.segment), item.offset)?;
        while let Some((candidate, value)) = reader.read_record()? {
            if candidate == key {
                return Ok(value);
            }
        }
        self.search_all_segments(key)
    }

    /// Flush kernel buffers for the write-ahead log.
    pub fn sync(&mut self) -> Result<()> {
        self.wal.sync()
    }

    /// Merge segment `newer` into segment `older`.
    ///
    /// Two-way external sort-merge: the output stays sorted, holds one
    /// record per key, and on key collision carries the newer segment's
    /// record. The merged file replaces `older`; `newer` is deleted and
    /// dropped from the segment list, and index entries pointing into
    /// either input are discarded (their offsets no longer hold).
    pub fn merge(&mut self, older: &str, newer: &str) -> Result<()> {
        let older_path = self.segment_path(older);
        let newer_path = self.segment_path(newer);
        let temp_path = self.dir.join(MERGE_TEMP_FILE);

        let mut output = File::create(&temp_path)?;
        let mut older_reader = LineReader::open(&older_path, 0)?;
        let mut newer_reader = LineReader::open(&newer_path, 0)?;
        let mut older_line = older_reader.read_line()?;
        let mut newer_line = newer_reader.read_line()?;

        loop {
            match (older_line.as_deref(), newer_line.as_deref()) {
                (None, None) => break,
                (None, Some(line)) => {
                    writeln!(output, "{line}")?;
                    newer_line = newer_reader.read_line()?;
                }
                (Some(line), None) => {
                    writeln!(output, "{line}")?;
                    older_line = older_reader.read_line()?;
                }
                (Some(older_rec), Some(newer_rec)) => {
                    let older_key = record_key(older_rec);
                    let newer_key = record_key(newer_rec);
                    if older_key == newer_key {
                        // The newer record wins on duplicate keys.
                        writeln!(output, "{newer_rec}")?;
                        older_line = older_reader.read_line()?;
                        newer_line = newer_reader.read_line()?;
                    } else if older_key < newer_key {
                        writeln!(output, "{older_rec}")?;
                        older_line = older_reader.read_line()?;
                    } else {
                        writeln!(output, "{newer_rec}")?;
                        newer_line = newer_reader.read_line()?;
                    }
                }
            }
        }

        output.sync_all()?;
        drop(output);
        drop(older_reader);
        drop(newer_reader);

        fs::remove_file(&older_path)?;
        fs::remove_file(&newer_path)?;
        fs::rename(&temp_path, &older_path)?;

        self.segments.retain(|segment| segment != newer);
        self.index
            .retain(|_, item| item.segment != older && item.segment != newer);
        Ok(())
    }

    /// Rebuild the sparse index from the segment files alone.
    ///
    /// Walks each segment in list order with the same countdown sampler
    /// the flush uses, so a lost metadata file can be reconstructed from
    /// the data that survived.
    pub fn repopulate_index(&mut self) -> Result<()> {
        self.index = BTreeMap::new();
        let sparsity = self.config.sparsity() as i64;

        for segment in self.segments.clone() {
            let mut counter = sparsity;
            let mut bytes: u64 = 0;
            for record in segment::records(&self.segment_path(&segment))? {
                let (key, value) = record?;
                let entry_len = log_entry(&key, &value).len() as u64;
                if counter == 1 {
                    self.index.insert(
                        key,
                        IndexItem {
                            segment: segment.clone(),
                            offset: bytes,
                            value: Some(value),
                        },
                    );
                    counter = sparsity + 1;
                }
                bytes += entry_len;
                counter -= 1;
            }
        }
        Ok(())
    }

    /// Write the metadata checkpoint to `<dir>/database_metadata`.
    ///
    /// Also called automatically at the end of every flush; callers can
    /// invoke it for an explicit durable checkpoint.
    pub fn save_metadata(&self) -> Result<()> {
        let meta = Metadata {
            segments: self.segments.clone(),
            current_segment: self.current_segment.clone(),
            index: self.index.clone(),
            bloom_filter: self.bloom.pack()?,
        };
        fs::write(self.metadata_path(), meta.encode()?)?;
        Ok(())
    }

    /// The tree's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn load_metadata(&mut self) -> Result<()> {
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(());
        }
        let meta = Metadata::decode(&fs::read(&path)?)?;
        self.bloom = BloomFilter::unpack(&meta.bloom_filter)?;
        self.index = meta.index;
        self.segments = meta.segments;
        self.current_segment = meta.current_segment;
        Ok(())
    }

    fn restore_memtable(&mut self) -> Result<()> {
        let path = self.wal.path().to_path_buf();
        if !path.exists() {
            return Ok(());
        }
        for record in segment::records(&path)? {
            let (key, value) = record?;
            self.memtable.set(&key, &value);
        }
        Ok(())
    }

    /// Remove, from every listed segment, the keys the memtable is about
    /// to supersede.
    ///
    /// The deletion set is the memtable's keys filtered through the bloom
    /// filter: keys the filter rejects cannot be on disk, and false
    /// positives only cause harmless extra scanning.
    fn compact(&self) -> Result<()> {
        let deletion: HashSet<String> = self
            .memtable
            .iter()
            .map(|(key, _)| key)
            .filter(|key| self.bloom.check(key))
            .collect();
        if deletion.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            keys = deletion.len(),
            segments = self.segments.len(),
            "compacting segments"
        );
        for segment in &self.segments {
            delete_keys_from_segment(&deletion, &self.segment_path(segment))?;
        }
        Ok(())
    }

    /// Write the memtable to `path` in key-ascending order, sampling
    /// every `sparsity` records into the index and recording every key in
    /// the bloom filter.
    ///
    /// Index offsets are the byte positions at which the sampled record's
    /// line begins. A sampled key already present in the index keeps its
    /// prior locator; only the observed value is refreshed.
    fn flush_memtable(&mut self, path: &Path) -> Result<()> {
        tracing::debug!(
            segment = %self.current_segment,
            entries = self.memtable.len(),
            "flushing memtable"
        );

        // Signed so a sparsity of zero simply never samples.
        let sparsity = self.config.sparsity() as i64;
        let mut counter = sparsity;
        let mut offset: u64 = 0;
        let mut file = File::create(path)?;

        for (key, value) in self.memtable.iter() {
            let entry = log_entry(&key, &value);
            if counter == 1 {
                match self.index.get_mut(&key) {
                    Some(item) => item.value = Some(value.clone()),
                    None => {
                        self.index.insert(
                            key.clone(),
                            IndexItem {
                                segment: self.current_segment.clone(),
                                offset,
                                value: Some(value.clone()),
                            },
                        );
                    }
                }
                counter = sparsity + 1;
            }
            self.bloom.add(&key);
            file.write_all(entry.as_bytes())?;
            offset += entry.len() as u64;
            counter -= 1;
        }

        file.sync_all()?;
        Ok(())
    }

    fn search_all_segments(&self, key: &str) -> Result<String> {
        for segment in &self.segments {
            if let Some(value) = segment::binary_scan(&self.segment_path(segment), key)? {
                return Ok(value);
            }
        }
        Ok(String::new())
    }

    /// `base-N` becomes `base-N+1`; anything else cannot be advanced.
    fn next_segment_name(&self) -> Result<String> {
        let malformed = || Error::MalformedSegmentName(self.current_segment.clone());
        let parts: Vec<&str> = self.current_segment.split('-').collect();
        let [base, number] = parts.as_slice() else {
            return Err(malformed());
        };
        let number: u64 = number.parse().map_err(|_| malformed())?;
        Ok(format!("{base}-{}", number + 1))
    }

    fn segment_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }
}

fn log_entry(key: &str, value: &str) -> String {
    format!("{key},{value}\n")
}

fn record_key(line: &str) -> &str {
    line.split_once(',').map_or(line, |(key, _)| key)
}

fn validate_field(field: &str, what: &str) -> Result<()> {
    if field.is_empty() {
        return Err(Error::InvalidRecord(format!("{what} must not be empty")));
    }
    if field.contains(',') || field.contains('\n') {
        return Err(Error::InvalidRecord(format!(
            "{what} {field:?} contains a delimiter character"
        )));
    }
    Ok(())
}

/// Stream `path` into a sibling temp file keeping only records whose key
/// is outside the deletion set, then rename the temp file over the
/// original.
fn delete_keys_from_segment(deletion: &HashSet<String>, path: &Path) -> Result<()> {
    let temp = temp_sibling(path);
    let mut output = File::create(&temp)?;
    for record in segment::records(path)? {
        let (key, value) = record?;
        if !deletion.contains(&key) {
            output.write_all(log_entry(&key, &value).as_bytes())?;
        }
    }
    output.sync_all()?;
    drop(output);

    fs::remove_file(path)?;
    fs::rename(&temp, path)?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push("_temp");
    path.with_file_name(name)
}

/// A crash between a temp-file write and its rename can leave partial
/// files behind; sweep them before touching any state.
fn remove_stale_temp_files(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.ends_with("_temp") || name == MERGE_TEMP_FILE {
            tracing::warn!(file = %path.display(), "removing stale temp file");
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
