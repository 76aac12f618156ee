use std::fmt;

use log::warn;
use sha2::{Digest, Sha256};

use crate::config::FingerprintConfig;
use crate::error::ConfigError;

/// A fixed-width counting bloom filter over router identifiers.
///
/// The whole structure packs into a single integer of the configured
/// width: the low `counter_bits` carry how many identifiers have been
/// inserted, the remaining bits form the hashed membership region. The
/// wire form therefore stays one word no matter how many routers a path
/// has crossed, which is the point of using this instead of an explicit
/// router list.
///
/// Standard bloom semantics apply: `contains` can report false
/// positives, never false negatives. There is no per-identifier record,
/// so removing an identifier that was never inserted clears bits that
/// belong to other members; callers must only remove identifiers they
/// know to be present.
#[derive(Clone, PartialEq, Eq)]
pub struct Fingerprint {
    bits: u64,
    width_bits: u8,
    counter_bits: u8,
    hash_count: u8,
}

impl Fingerprint {
    /// Create an empty fingerprint with the default shape.
    pub fn new() -> Self {
        Self::with_config(&FingerprintConfig::default())
            .expect("default fingerprint config is valid")
    }

    /// Create an empty fingerprint with an explicit shape.
    pub fn with_config(config: &FingerprintConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            bits: 0,
            width_bits: config.width_bits,
            counter_bits: config.counter_bits,
            hash_count: config.hash_count,
        })
    }

    /// Reconstruct a fingerprint from its wire word. Bits above the
    /// configured width are discarded.
    pub fn from_raw(raw: u64, config: &FingerprintConfig) -> Result<Self, ConfigError> {
        let mut fp = Self::with_config(config)?;
        fp.bits = raw & fp.word_mask();
        Ok(fp)
    }

    /// Insert a router identifier and bump the occupancy counter.
    ///
    /// The counter saturates at its maximum instead of wrapping; a
    /// saturated counter means the fingerprint can no longer report an
    /// accurate cost and the event is logged.
    pub fn insert(&mut self, id: &str) {
        for k in 0..self.hash_count {
            let bit = self.bit_index(id, k);
            self.bits |= 1 << bit;
        }
        let count = self.count();
        if count == self.counter_max() {
            warn!(
                "fingerprint counter saturated at {} inserting {}",
                count, id
            );
            return;
        }
        self.set_count(count + 1);
    }

    /// Remove a router identifier and decrement the occupancy counter.
    ///
    /// Only call this for identifiers known to be present: the structure
    /// keeps no per-identifier record, so an unmatched remove clears
    /// bits still in use by other members. The counter saturates at zero
    /// instead of wrapping.
    pub fn remove(&mut self, id: &str) {
        for k in 0..self.hash_count {
            let bit = self.bit_index(id, k);
            self.bits &= !(1 << bit);
        }
        let count = self.count();
        if count == 0 {
            warn!("fingerprint counter underflow removing {}", id);
            return;
        }
        self.set_count(count - 1);
    }

    /// Probabilistic membership test: true iff every derived bit is set.
    pub fn contains(&self, id: &str) -> bool {
        (0..self.hash_count).all(|k| self.bits & (1 << self.bit_index(id, k)) != 0)
    }

    /// Number of identifiers currently inserted, from the embedded
    /// counter region.
    pub fn count(&self) -> u32 {
        (self.bits & self.counter_mask()) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// The single-word wire form, counter region included.
    pub fn raw(&self) -> u64 {
        self.bits
    }

    pub fn width_bits(&self) -> u8 {
        self.width_bits
    }

    pub fn hash_count(&self) -> u8 {
        self.hash_count
    }

    /// Bit position for hash function `k`, always above the counter
    /// region. Double hashing: h(x, k) = h1(x) + k*h2(x), with h1/h2
    /// taken from one SHA-256 of the identifier.
    fn bit_index(&self, id: &str, k: u8) -> u64 {
        let digest = Sha256::digest(id.as_bytes());
        let h1 = u64::from_le_bytes(digest[0..8].try_into().expect("digest is 32 bytes"));
        let h2 = u64::from_le_bytes(digest[8..16].try_into().expect("digest is 32 bytes"));
        let region = (self.width_bits - self.counter_bits) as u64;
        let combined = h1.wrapping_add((k as u64).wrapping_mul(h2));
        self.counter_bits as u64 + combined % region
    }

    fn counter_mask(&self) -> u64 {
        (1u64 << self.counter_bits) - 1
    }

    fn counter_max(&self) -> u32 {
        self.counter_mask() as u32
    }

    fn set_count(&mut self, count: u32) {
        self.bits = (self.bits & !self.counter_mask()) | (count as u64 & self.counter_mask());
    }

    fn word_mask(&self) -> u64 {
        if self.width_bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.width_bits) - 1
        }
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("raw", &format_args!("{:#018x}", self.bits))
            .field("count", &self.count())
            .field("width", &self.width_bits)
            .field("hashes", &self.hash_count)
            .finish()
    }
}
