//! Write-ahead log for unflushed memtable contents.
//!
//! The log mirrors, in write order, every record accepted since the last
//! flush, using the same `key,value\n` encoding as the segments. On open
//! the tree replays it line by line to rebuild the memtable, so a crash
//! between flushes loses nothing that reached the log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Append-only file handle.
///
/// The file descriptor is long-lived; [`clear`](Self::clear) swaps it for
/// a freshly truncated one after a flush. Filesystem errors are surfaced
/// verbatim, no retry.
#[derive(Debug)]
pub struct AppendLog {
    path: PathBuf,
    file: File,
    sync_on_write: bool,
}

impl AppendLog {
    /// Open the log at `path` in append-write-create mode.
    ///
    /// With `sync_on_write`, every append is followed by an fsync;
    /// otherwise durability is deferred to [`sync`](Self::sync) and the
    /// kernel.
    pub fn open(path: impl Into<PathBuf>, sync_on_write: bool) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            sync_on_write,
        })
    }

    /// Append exactly the bytes of `entry`.
    pub fn append_str(&mut self, entry: &str) -> Result<()> {
        self.append(entry.as_bytes())
    }

    /// Append raw bytes.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        if self.sync_on_write {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Flush kernel buffers to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Close and reopen the file truncated, then resume appending.
    pub fn clear(&mut self) -> Result<()> {
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(())
    }

    /// The log's path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_temp_log(dir: &TempDir) -> AppendLog {
        AppendLog::open(dir.path().join("test.log"), false).expect("failed to open log")
    }

    #[test]
    fn test_append_accumulates() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let mut log = create_temp_log(&dir);

        for _ in 0..5 {
            log.append_str("hello\n").expect("append failed");
        }

        let contents = fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents, "hello\n".repeat(5));
    }

    #[test]
    fn test_clear_truncates_and_resumes() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let mut log = create_temp_log(&dir);

        for _ in 0..5 {
            log.append_str("hello\n").expect("append failed");
        }
        log.clear().expect("clear failed");
        assert_eq!(fs::read_to_string(log.path()).unwrap(), "");

        for _ in 0..2 {
            log.append_str("pedro\n").expect("append failed");
        }
        assert_eq!(fs::read_to_string(log.path()).unwrap(), "pedro\npedro\n");
    }

    #[test]
    fn test_reopen_appends_after_existing_content() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("test.log");

        let mut log = AppendLog::open(&path, false).unwrap();
        log.append_str("one\n").unwrap();
        drop(log);

        let mut log = AppendLog::open(&path, false).unwrap();
        log.append_str("two\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_sync_on_write() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let mut log = AppendLog::open(dir.path().join("synced.log"), true).unwrap();
        log.append_str("durable\n").unwrap();
        log.sync().unwrap();
        assert_eq!(
            fs::read_to_string(log.path()).unwrap(),
            "durable\n"
        );
    }
}
