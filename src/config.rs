use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::error::ConfigError;

/// Shape of a path fingerprint: total width, counter sub-range and the
/// number of hash functions. Fixed for the lifetime of a routing table;
/// all routers in one network must agree on these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Total width of the fingerprint word in bits (at most 64).
    pub width_bits: u8,
    /// Low bits reserved for the occupancy counter.
    pub counter_bits: u8,
    /// Number of hash functions per identifier.
    pub hash_count: u8,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            width_bits: 64,
            counter_bits: 8,
            hash_count: 3,
        }
    }
}

impl FingerprintConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width_bits == 0 || self.width_bits > 64 {
            return Err(ConfigError::InvalidWidth(self.width_bits));
        }
        if self.counter_bits == 0 {
            return Err(ConfigError::ZeroCounterWidth);
        }
        if self.counter_bits >= self.width_bits {
            return Err(ConfigError::CounterTooWide {
                counter: self.counter_bits,
                width: self.width_bits,
            });
        }
        if self.hash_count == 0 {
            return Err(ConfigError::ZeroHashCount);
        }
        Ok(())
    }

    /// Width of the hashed membership region in bits.
    pub fn region_bits(&self) -> u8 {
        self.width_bits - self.counter_bits
    }
}

/// What to do with a routing entry once every face reports infinity cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RetentionPolicy {
    /// Keep the entry so its sequence number survives a withdrawal.
    #[default]
    RetainTombstone,
    /// Drop the entry as soon as no valid face remains.
    PurgeUnreachable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub fingerprint: FingerprintConfig,
    pub retention: RetentionPolicy,
    /// Initial hello interval in seconds.
    pub hello_interval: u32,
    /// Upper bound the hello interval backs off to when the neighborhood
    /// is quiet.
    pub hello_interval_max: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            fingerprint: FingerprintConfig::default(),
            retention: RetentionPolicy::default(),
            hello_interval: 10,
            hello_interval_max: 60,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fingerprint.validate()
    }

    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ProtocolConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
