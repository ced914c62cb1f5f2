//! Persisted snapshot of engine state.
//!
//! The checkpoint is a JSON document at `<dir>/database_metadata` holding
//! the segment list, the not-yet-flushed segment name, the sparse index,
//! and the packed bloom filter. Loading it on open restores everything
//! except the memtable, which the write-ahead log replay refills.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Locator for a sampled key: the segment that held it at flush time and
/// the byte offset at which its line begins, plus the value observed
/// then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexItem {
    #[serde(rename = "Segment")]
    pub segment: String,
    #[serde(rename = "Offset")]
    pub offset: u64,
    #[serde(rename = "Val")]
    pub value: Option<String>,
}

/// The on-disk metadata document. Field names are part of the file
/// format and must not change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "Segments")]
    pub segments: Vec<String>,
    #[serde(rename = "CurrentSegment")]
    pub current_segment: String,
    #[serde(rename = "Index")]
    pub index: BTreeMap<String, IndexItem>,
    #[serde(rename = "BloomFilter")]
    pub bloom_filter: String,
}

impl Metadata {
    /// Serialize to JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a metadata document from JSON bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample() -> Metadata {
        let mut index = BTreeMap::new();
        index.insert(
            "jkl".to_string(),
            IndexItem {
                segment: "test_file-1".to_string(),
                offset: 24,
                value: Some("012".to_string()),
            },
        );
        Metadata {
            segments: vec!["test_file-1".to_string(), "test_file-2".to_string()],
            current_segment: "test_file-3".to_string(),
            index,
            bloom_filter: "{}".to_string(),
        }
    }

    #[test]
    fn test_wire_field_names() {
        let bytes = sample().encode().unwrap();
        let json = String::from_utf8(bytes).unwrap();
        for field in ["Segments", "CurrentSegment", "Index", "BloomFilter", "Segment", "Offset", "Val"] {
            assert!(json.contains(field), "document missing field {field}: {json}");
        }
    }

    #[test]
    fn test_decode_restores_fields() {
        let meta = sample();
        let restored = Metadata::decode(&meta.encode().unwrap()).unwrap();
        assert_eq!(restored.segments, meta.segments);
        assert_eq!(restored.current_segment, meta.current_segment);
        assert_eq!(restored.index, meta.index);
        assert_eq!(restored.bloom_filter, meta.bloom_filter);
    }

    #[test]
    fn test_null_index_value_is_accepted() {
        let json = r#"{
            "Segments": ["segment-1"],
            "CurrentSegment": "segment-2",
            "Index": {"john": {"Segment": "segment-1", "Offset": 5, "Val": null}},
            "BloomFilter": "{}"
        }"#;
        let meta = Metadata::decode(json.as_bytes()).unwrap();
        assert_eq!(meta.index["john"].offset, 5);
        assert_eq!(meta.index["john"].value, None);
    }

    #[test]
    fn test_garbage_fails_with_decode_error() {
        assert!(matches!(
            Metadata::decode(b"not json"),
            Err(Error::Decode(_))
        ));
    }
}
