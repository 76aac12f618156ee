use std::collections::BTreeMap;

use log::debug;

use crate::fingerprint::Fingerprint;
use crate::{FaceId, RouterId, INFINITY_COST};

/// One candidate forwarding path on a single outgoing face: the set of
/// routers the route has passed through, compressed into a fingerprint.
///
/// The fingerprint's occupancy counter doubles as the route's hop-count
/// metric. Cloning is the deep copy used when a path is re-advertised on
/// a different face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHop {
    fingerprint: Fingerprint,
}

impl NextHop {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self { fingerprint }
    }

    /// Record that the route passed through `router_id`, unless the
    /// fingerprint already reports it. A false positive on that check
    /// silently skips a legitimate insert, a known approximation of the
    /// structure.
    pub fn add_router_id(&mut self, router_id: &str) {
        if !self.fingerprint.contains(router_id) {
            self.fingerprint.insert(router_id);
        }
    }

    pub fn contains(&self, router_id: &str) -> bool {
        self.fingerprint.contains(router_id)
    }

    /// Hop-count metric: the fingerprint's occupancy counter.
    pub fn cost(&self) -> u32 {
        self.fingerprint.count()
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Single-word wire form of the underlying fingerprint.
    pub fn raw(&self) -> u64 {
        self.fingerprint.raw()
    }
}

/// Per-prefix container of candidate paths, keyed by outgoing face.
///
/// Admission control lives here: a path is rejected when a
/// fingerprint-equal path already exists on the same face, or when the
/// path has already crossed this router (the probabilistic analogue of
/// path-vector loop detection). Admitted hops are held by value and only
/// handed out by shared reference, so a fingerprint cannot change under
/// an earlier admission decision.
#[derive(Debug, Clone)]
pub struct PathVectorSet {
    paths: BTreeMap<FaceId, Vec<NextHop>>,
    local_router: RouterId,
}

impl PathVectorSet {
    pub fn new(local_router: impl Into<RouterId>) -> Self {
        Self {
            paths: BTreeMap::new(),
            local_router: local_router.into(),
        }
    }

    pub fn local_router(&self) -> &str {
        &self.local_router
    }

    /// Admit `hop` on `face` unless it duplicates an existing path or
    /// loops back through this router. Returns whether it was admitted.
    pub fn add_path(&mut self, face: FaceId, hop: NextHop) -> bool {
        if self.contains(face, &hop) {
            debug!("path on face {} rejected: duplicate fingerprint", face);
            return false;
        }
        if hop.contains(&self.local_router) {
            debug!(
                "path on face {} rejected: already crossed {}",
                face, self.local_router
            );
            return false;
        }
        self.paths.entry(face).or_default().push(hop);
        true
    }

    /// Admit a batch of candidates on one face; returns how many were
    /// admitted.
    pub fn add_paths(&mut self, face: FaceId, hops: Vec<NextHop>) -> usize {
        hops.into_iter()
            .filter(|hop| self.add_path(face, hop.clone()))
            .count()
    }

    /// Drop every path for a face.
    pub fn delete_face(&mut self, face: FaceId) {
        self.paths.remove(&face);
    }

    /// Drop one fingerprint-equal path from a face, if present.
    pub fn delete_path(&mut self, face: FaceId, hop: &NextHop) {
        let Some(hops) = self.paths.get_mut(&face) else {
            return;
        };
        if let Some(pos) = hops.iter().position(|h| h == hop) {
            hops.remove(pos);
        }
        if hops.is_empty() {
            self.paths.remove(&face);
        }
    }

    /// Maintenance pass: rebuild each face's paths, dropping
    /// fingerprint-equal duplicates while keeping first-seen order.
    pub fn remove_repetitions(&mut self) {
        for hops in self.paths.values_mut() {
            let mut deduped: Vec<NextHop> = Vec::with_capacity(hops.len());
            for hop in hops.drain(..) {
                if !deduped.contains(&hop) {
                    deduped.push(hop);
                }
            }
            *hops = deduped;
        }
    }

    /// Minimum cost across the face's paths, or the infinity sentinel
    /// when the face has none.
    pub fn get_cost(&self, face: FaceId) -> u32 {
        self.next_hops(face)
            .iter()
            .map(NextHop::cost)
            .min()
            .unwrap_or(INFINITY_COST)
    }

    /// Cheapest path on a face, if any.
    pub fn best_hop(&self, face: FaceId) -> Option<&NextHop> {
        self.next_hops(face).iter().min_by_key(|hop| hop.cost())
    }

    pub fn contains(&self, face: FaceId, hop: &NextHop) -> bool {
        self.next_hops(face).contains(hop)
    }

    pub fn next_hops(&self, face: FaceId) -> &[NextHop] {
        self.paths.get(&face).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (FaceId, &[NextHop])> {
        self.paths.iter().map(|(face, hops)| (*face, hops.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
