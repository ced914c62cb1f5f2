/// Configuration for the LSM tree.
#[derive(Debug, Clone)]
pub struct Config {
    /// Memtable payload size that triggers a flush, in bytes (default: 1MB).
    pub threshold: usize,

    /// Divisor of `threshold` that yields the sparse index sampling
    /// distance (default: 100, i.e. one index entry per 10_000 bytes of
    /// flushed records at the default threshold).
    pub sparsity_factor: usize,

    /// Expected item count used to size the bloom filter (default: 100).
    pub bloom_num_items: usize,

    /// Target bloom filter false positive probability (default: 0.2).
    pub bloom_false_positive: f64,

    /// Fsync the write-ahead log after every append (default: false).
    pub wal_sync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 1_000_000,
            sparsity_factor: 100,
            bloom_num_items: 100,
            bloom_false_positive: 0.2,
            wal_sync: false,
        }
    }
}

impl Config {
    /// Create a config with the default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flush threshold in bytes.
    pub fn threshold(mut self, bytes: usize) -> Self {
        self.threshold = bytes;
        self
    }

    /// Set the sparse index sampling factor.
    pub fn sparsity_factor(mut self, factor: usize) -> Self {
        self.sparsity_factor = factor;
        self
    }

    /// Set the expected item count for the bloom filter.
    pub fn bloom_num_items(mut self, items: usize) -> Self {
        self.bloom_num_items = items;
        self
    }

    /// Set the bloom filter false positive probability.
    pub fn bloom_false_positive(mut self, probability: f64) -> Self {
        self.bloom_false_positive = probability;
        self
    }

    /// Enable or disable fsync-per-append on the write-ahead log.
    pub fn wal_sync(mut self, enabled: bool) -> Self {
        self.wal_sync = enabled;
        self
    }

    /// Distance in records between sparse index samples.
    pub fn sparsity(&self) -> usize {
        self.threshold / self.sparsity_factor
    }
}
