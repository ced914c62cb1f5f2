//! Line-oriented I/O over on-disk segments.
//!
//! A segment is a UTF-8 text file of `key,value\n` records, strictly
//! ascending by key with no duplicates. Neither field may contain `,` or
//! `\n`, so splitting a line at the comma recovers the record; anything
//! else is a malformed segment.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Error, Result};

/// Buffered reader over a segment file, positioned at a byte offset.
pub struct LineReader {
    inner: BufReader<File>,
}

impl LineReader {
    /// Open `path` for reading, seeking to `offset` first.
    pub fn open(path: &Path, offset: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }
        Ok(Self {
            inner: BufReader::new(file),
        })
    }

    /// The next line with its trailing newline stripped, or `None` at end
    /// of input.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.inner.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// The next `(key, value)` record, or `None` at end of input.
    pub fn read_record(&mut self) -> Result<Option<(String, String)>> {
        match self.read_line()? {
            Some(line) => split_record(&line).map(Some),
            None => Ok(None),
        }
    }
}

/// Split a line at the field delimiter into exactly two fields.
pub fn split_record(line: &str) -> Result<(String, String)> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 2 {
        return Err(Error::MalformedSegment(line.to_string()));
    }
    Ok((fields[0].to_string(), fields[1].to_string()))
}

/// Iterator over every record of a segment file, in file order.
pub struct RecordIter {
    reader: LineReader,
}

impl Iterator for RecordIter {
    type Item = Result<(String, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}

/// Iterate the records of the file at `path` from the beginning.
pub fn records(path: &Path) -> Result<RecordIter> {
    Ok(RecordIter {
        reader: LineReader::open(path, 0)?,
    })
}

/// Binary search a sorted segment for `key`.
///
/// Reads the whole file at once and bisects its lines; valid because
/// segments are sorted and duplicate-free.
pub fn binary_scan(path: &Path, key: &str) -> Result<Option<String>> {
    let contents = fs::read_to_string(path)?;
    let mut lines: Vec<&str> = contents.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }

    let mut low = 0;
    let mut high = lines.len();
    while low < high {
        let mid = low + (high - low) / 2;
        let (mid_key, mid_value) = split_record(lines[mid])?;
        match key.cmp(mid_key.as_str()) {
            std::cmp::Ordering::Equal => return Ok(Some(mid_value)),
            std::cmp::Ordering::Less => high = mid,
            std::cmp::Ordering::Greater => low = mid + 1,
        }
    }
    Ok(None)
}
