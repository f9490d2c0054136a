//! Bloom filter for primary-key membership testing
//!
//! Keys are hashed as raw bytes with two seeded `xxh3_64` passes and probed with
//! double hashing, so the bit layout is stable across processes and can be
//! persisted in stats logs.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use seglake_core::{CoreError, CoreResult};

const SEED_PRIMARY: u64 = 0x5EED_1A4E_0000_0001;
const SEED_SECONDARY: u64 = 0x5EED_1A4E_0000_0002;

/// Upper bound on probes per key.
pub const MAX_HASHES: usize = 30;

/// Bloom filter for approximate membership testing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilter {
    /// Bit array
    bits: Vec<u64>,
    /// Number of bits, always a multiple of 64
    num_bits: usize,
    /// Number of hash functions
    num_hashes: usize,
    /// Number of items inserted
    count: usize,
}

impl BloomFilter {
    /// Create a new bloom filter optimized for expected items and false positive rate
    ///
    /// # Arguments
    /// * `expected_items` - Expected number of items to insert (clamped to >= 1)
    /// * `false_positive_rate` - Desired false positive probability (e.g., 0.005)
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let expected_items = expected_items.max(1);
        let false_positive_rate = if false_positive_rate.is_finite() {
            false_positive_rate.clamp(1e-9, 0.5)
        } else {
            crate::DEFAULT_FALSE_POSITIVE_RATE
        };

        // m = -n * ln(p) / (ln(2)^2)
        let ln2_squared = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        let num_bits =
            (-(expected_items as f64) * false_positive_rate.ln() / ln2_squared).ceil() as usize;
        let num_bits = num_bits.max(64);

        // k = (m/n) * ln(2)
        let num_hashes =
            ((num_bits as f64 / expected_items as f64) * std::f64::consts::LN_2).ceil() as usize;

        Self::with_params(num_bits, num_hashes)
    }

    /// Create with specific parameters
    pub fn with_params(num_bits: usize, num_hashes: usize) -> Self {
        let num_words = num_bits.max(64).div_ceil(64);

        Self {
            bits: vec![0u64; num_words],
            num_bits: num_words * 64,
            num_hashes: num_hashes.clamp(1, MAX_HASHES),
            count: 0,
        }
    }

    /// Insert a key given as raw bytes
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = self.index(h1, h2, i);
            self.bits[idx / 64] |= 1 << (idx % 64);
        }
        self.count += 1;
    }

    /// Returns `false` if the key is definitely absent, `true` if possibly present
    pub fn might_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        (0..self.num_hashes).all(|i| {
            let idx = self.index(h1, h2, i);
            self.bits[idx / 64] & (1 << (idx % 64)) != 0
        })
    }

    /// Get the number of items inserted
    pub fn count(&self) -> usize {
        self.count
    }

    /// Estimated false positive rate given the current item count
    pub fn estimated_fpr(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }

        // (1 - e^(-k*n/m))^k
        let exponent = (self.num_hashes as f64 * self.count as f64) / self.num_bits as f64;
        let p = 1.0 - (-exponent).exp();
        p.powi(self.num_hashes as i32)
    }

    /// Fraction of bits set
    pub fn fill_ratio(&self) -> f64 {
        let set_bits: usize = self.bits.iter().map(|w| w.count_ones() as usize).sum();
        set_bits as f64 / self.num_bits as f64
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    /// Whether `other` can be unioned into this filter.
    pub fn is_compatible(&self, other: &BloomFilter) -> bool {
        self.num_bits == other.num_bits && self.num_hashes == other.num_hashes
    }

    /// Union with another bloom filter (OR operation)
    pub fn union(&mut self, other: &BloomFilter) -> CoreResult<()> {
        if !self.is_compatible(other) {
            return Err(CoreError::IncompatibleIndex(format!(
                "bloom filter shapes differ: {}x{} vs {}x{}",
                self.num_bits, self.num_hashes, other.num_bits, other.num_hashes
            )));
        }

        for (a, b) in self.bits.iter_mut().zip(other.bits.iter()) {
            *a |= *b;
        }
        self.count += other.count;
        Ok(())
    }

    /// Checks the invariants of a filter decoded from storage.
    pub fn validate(&self) -> CoreResult<()> {
        if self.num_bits == 0 || self.num_bits % 64 != 0 || self.bits.len() * 64 != self.num_bits {
            return Err(CoreError::Deserialization(format!(
                "bloom filter declares {} bits but carries {} words",
                self.num_bits,
                self.bits.len()
            )));
        }
        if !(1..=MAX_HASHES).contains(&self.num_hashes) {
            return Err(CoreError::Deserialization(format!(
                "bloom filter hash count {} out of range",
                self.num_hashes
            )));
        }
        Ok(())
    }

    fn index(&self, h1: u64, h2: u64, i: usize) -> usize {
        // h(i) = h1 + i * h2
        let hash = h1.wrapping_add((i as u64).wrapping_mul(h2));
        (hash % self.num_bits as u64) as usize
    }
}

fn hash_pair(key: &[u8]) -> (u64, u64) {
    let h1 = xxh3_64_with_seed(key, SEED_PRIMARY);
    // Odd step so every probe sequence visits distinct bits.
    let h2 = xxh3_64_with_seed(key, SEED_SECONDARY) | 1;
    (h1, h2)
}
