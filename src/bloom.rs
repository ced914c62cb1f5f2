//! Probabilistic set membership over string keys.
//!
//! The filter sits in front of the on-disk read path: a negative answer
//! means the key was never flushed to any segment, so lookups can return
//! early without touching a file. A positive answer may be a false
//! positive, bounded by the configured probability.
//!
//! Sizing, for `n` expected items at false positive probability `p`:
//!
//! ```text
//! m = ceil(-n * ln(p) / ln(2)^2)    bits
//! k = floor((m / n) * ln(2))        hash functions
//! ```

use serde::{Deserialize, Serialize};

use crate::bitarray::BitArray;
use crate::error::Result;
use crate::hasher::murmur3_32;

/// Bloom filter keyed by UTF-8 strings, hashed with `hash_count`
/// independently seeded digests into a shared bit array.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    false_positive_prob: f64,
    bit_array_size: usize,
    hash_count: usize,
    num_items: usize,
    bits: BitArray,
}

/// On-disk form of the filter. Field names are part of the metadata file
/// format and must not change.
#[derive(Serialize, Deserialize)]
struct BloomBlob {
    #[serde(rename = "FalsePositivePob")]
    false_positive_prob: f64,
    #[serde(rename = "BitArraySize")]
    bit_array_size: usize,
    #[serde(rename = "HashCount")]
    hash_count: usize,
    #[serde(rename = "NumItems")]
    num_items: usize,
    #[serde(rename = "Bit")]
    words: Vec<u64>,
}

impl BloomFilter {
    /// Create a filter sized for `num_items` keys at the given false
    /// positive probability.
    ///
    /// # Panics
    ///
    /// Panics if `num_items` is zero or the probability is outside (0, 1).
    pub fn new(num_items: usize, false_positive_prob: f64) -> Self {
        assert!(num_items > 0, "num_items must be > 0");
        assert!(
            false_positive_prob > 0.0 && false_positive_prob < 1.0,
            "false positive probability must be in (0, 1)"
        );

        let bit_array_size = Self::bit_array_size_for(num_items, false_positive_prob);
        let hash_count = Self::hash_count_for(bit_array_size, num_items);

        Self {
            false_positive_prob,
            bit_array_size,
            hash_count,
            num_items,
            bits: BitArray::with_capacity(num_items),
        }
    }

    // m = -(n * ln(p)) / ln(2)^2
    fn bit_array_size_for(num_items: usize, probability: f64) -> usize {
        let ln2 = std::f64::consts::LN_2;
        (-(num_items as f64) * probability.ln() / (ln2 * ln2)).ceil() as usize
    }

    // k = (m / n) * ln(2)
    fn hash_count_for(bit_array_size: usize, num_items: usize) -> usize {
        (bit_array_size as f64 / num_items as f64 * std::f64::consts::LN_2) as usize
    }

    /// Record `key` as a member.
    pub fn add(&mut self, key: &str) {
        let data = key.as_bytes();
        for seed in 0..self.hash_count {
            let digest = murmur3_32(data, seed as u32) as usize % self.bit_array_size;
            self.bits.add(digest);
        }
    }

    /// Whether `key` may be a member. `false` is definitive.
    pub fn check(&self, key: &str) -> bool {
        let data = key.as_bytes();
        for seed in 0..self.hash_count {
            let digest = murmur3_32(data, seed as u32) as usize % self.bit_array_size;
            if !self.bits.has(digest) {
                return false;
            }
        }
        true
    }

    /// Serialize the filter parameters and bit words to a JSON blob.
    pub fn pack(&self) -> Result<String> {
        let blob = BloomBlob {
            false_positive_prob: self.false_positive_prob,
            bit_array_size: self.bit_array_size,
            hash_count: self.hash_count,
            num_items: self.num_items,
            words: self.bits.words().to_vec(),
        };
        Ok(serde_json::to_string(&blob)?)
    }

    /// Rebuild a filter from a blob produced by [`pack`](Self::pack).
    pub fn unpack(blob: &str) -> Result<Self> {
        let blob: BloomBlob = serde_json::from_str(blob)?;
        Ok(Self {
            false_positive_prob: blob.false_positive_prob,
            bit_array_size: blob.bit_array_size,
            hash_count: blob.hash_count,
            num_items: blob.num_items,
            bits: BitArray::from_words(blob.words),
        })
    }

    pub fn false_positive_prob(&self) -> f64 {
        self.false_positive_prob
    }

    pub fn bit_array_size(&self) -> usize {
        self.bit_array_size
    }

    pub fn hash_count(&self) -> usize {
        self.hash_count
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let mut filter = BloomFilter::new(1, 0.05);
        filter.add("pedro");
        assert!(filter.check("pedro"));

        let mut filter = BloomFilter::new(100, 0.01);
        for name in ["pedro", "sara", "mike", "leo"] {
            filter.add(name);
        }
        for name in ["pedro", "sara", "mike", "leo"] {
            assert!(filter.check(name));
        }
        // A filter this sparse makes a false positive astronomically
        // unlikely for a fixed hash.
        assert!(!filter.check("berry"));
        assert!(!filter.check("lucy"));
    }

    #[test]
    fn test_membership_across_probabilities() {
        for probability in [0.15, 0.5, 0.9] {
            let mut filter = BloomFilter::new(1, probability);
            filter.add("pedro");
            assert!(filter.check("pedro"));
        }
    }

    #[test]
    fn test_hash_count() {
        assert_eq!(BloomFilter::new(20, 0.05).hash_count(), 4);
        assert_eq!(BloomFilter::new(1000, 0.25).hash_count(), 2);
        assert_eq!(BloomFilter::new(10000, 0.02).hash_count(), 5);
    }

    #[test]
    fn test_bit_array_size() {
        assert_eq!(BloomFilter::new(20, 0.05).bit_array_size(), 125);
        assert_eq!(BloomFilter::new(1000, 0.25).bit_array_size(), 2886);
        assert_eq!(BloomFilter::new(10000, 0.02).bit_array_size(), 81424);
    }

    #[test]
    fn test_false_positive_rate_is_bounded() {
        let mut filter = BloomFilter::new(100, 0.2);
        for i in 0..100 {
            filter.add(&format!("member-{i}"));
        }

        let false_positives = (0..1000)
            .filter(|i| filter.check(&format!("outsider-{i}")))
            .count();
        // Expected rate is ~0.2; allow generous measurement slack.
        assert!(
            false_positives < 350,
            "false positive rate too high: {false_positives}/1000"
        );
    }

    #[test]
    fn test_pack_unpack() {
        let mut filter = BloomFilter::new(50, 0.1);
        for name in ["one", "two", "three"] {
            filter.add(name);
        }

        let blob = filter.pack().unwrap();
        let restored = BloomFilter::unpack(&blob).unwrap();

        assert_eq!(restored.false_positive_prob(), filter.false_positive_prob());
        assert_eq!(restored.bit_array_size(), filter.bit_array_size());
        assert_eq!(restored.hash_count(), filter.hash_count());
        assert_eq!(restored.num_items(), filter.num_items());
        for name in ["one", "two", "three"] {
            assert!(restored.check(name));
        }
    }

    #[test]
    fn test_blob_field_names() {
        let filter = BloomFilter::new(10, 0.1);
        let blob = filter.pack().unwrap();
        for field in ["FalsePositivePob", "BitArraySize", "HashCount", "NumItems", "Bit"] {
            assert!(blob.contains(field), "blob missing field {field}: {blob}");
        }
    }
}
