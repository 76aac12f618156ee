use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::{FaceId, RouterId};

/// Liveness bookkeeping for one adjacent router. Hello scheduling is the
/// transport layer's job; this only holds the state its timers act on.
#[derive(Debug, Clone)]
pub struct NeighborEntry {
    name: RouterId,
    face_id: FaceId,
    /// Table version the neighbor last announced.
    version: u32,
    last_seen: Instant,
    hello_timeout: Duration,
}

impl NeighborEntry {
    pub fn new(name: impl Into<RouterId>, face_id: FaceId, version: u32) -> Self {
        Self {
            name: name.into(),
            face_id,
            version,
            last_seen: Instant::now(),
            hello_timeout: Duration::from_secs(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn face_id(&self) -> FaceId {
        self.face_id
    }

    pub fn set_face_id(&mut self, face_id: FaceId) {
        self.face_id = face_id;
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn update_last_seen(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Time since the neighbor last gave a sign of life.
    pub fn last_seen_delta(&self) -> Duration {
        self.last_seen.elapsed()
    }

    pub fn hello_timeout(&self) -> Duration {
        self.hello_timeout
    }

    pub fn set_hello_timeout(&mut self, timeout: Duration) {
        self.hello_timeout = timeout;
    }

    /// Whether the neighbor missed its hello window.
    pub fn is_expired(&self) -> bool {
        !self.hello_timeout.is_zero() && self.last_seen_delta() > self.hello_timeout
    }
}

/// The set of currently known adjacencies, keyed by router name.
#[derive(Debug, Default)]
pub struct NeighborTable {
    neighbors: HashMap<RouterId, NeighborEntry>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: NeighborEntry) {
        info!("neighbor {} up on face {}", entry.name(), entry.face_id());
        self.neighbors.insert(entry.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&NeighborEntry> {
        self.neighbors.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut NeighborEntry> {
        self.neighbors.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<NeighborEntry> {
        let removed = self.neighbors.remove(name);
        if removed.is_some() {
            info!("neighbor {} removed", name);
        }
        removed
    }

    pub fn face_of(&self, name: &str) -> Option<FaceId> {
        self.neighbors.get(name).map(NeighborEntry::face_id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.neighbors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.neighbors.values()
    }

    /// Names of neighbors whose hello window has lapsed.
    pub fn expired(&self) -> Vec<RouterId> {
        let expired: Vec<RouterId> = self
            .neighbors
            .values()
            .filter(|n| n.is_expired())
            .map(|n| n.name.clone())
            .collect();
        for name in &expired {
            debug!("neighbor {} missed its hello window", name);
        }
        expired
    }
}
