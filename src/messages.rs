use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One advertised route: prefix, freshness markers, cost and the path
/// fingerprint in its single-word wire form. The transport layer wraps
/// these in its own framing and signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteAdvert {
    pub prefix: String,
    pub originator: String,
    pub seq_num: u64,
    pub cost: u32,
    pub fingerprint: u64,
}

/// A neighbor's distance-vector payload: its full (or delta) view of
/// reachable prefixes at a given table version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DvInfo {
    pub router: String,
    pub version: u32,
    pub routes: Vec<RouteAdvert>,
}

/// Periodic liveness announcement. The advertised version lets a
/// neighbor compare digests and skip a full table exchange when nothing
/// changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub router: String,
    pub version: u32,
    pub prefix_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl Hello {
    pub fn new(router: String, version: u32, prefix_count: usize) -> Self {
        Self {
            router,
            version,
            prefix_count,
            timestamp: Utc::now(),
        }
    }
}

impl DvInfo {
    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
