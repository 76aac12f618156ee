use std::collections::BTreeMap;

use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::config::{ProtocolConfig, RetentionPolicy};
use crate::error::ConfigError;
use crate::fingerprint::Fingerprint;
use crate::messages::RouteAdvert;
use crate::path_vector::{NextHop, PathVectorSet};
use crate::{FaceId, RouterId, INFINITY_COST, LOCAL_FACE};

/// Cost and advertising neighbor recorded for one face of a route.
#[derive(Debug, Clone)]
pub struct NextHopRecord {
    pub cost: u32,
    pub neighbor: String,
}

/// Per-prefix routing state: sequence number, per-face cost table with
/// cached best/second-best selection, and the path-vector fingerprints
/// backing the loop checks.
///
/// Best/second-best are recomputed on every mutation with a single
/// ascending pass over the face table, so ties deterministically resolve
/// to the lowest face id. `learned_from` always names the neighbor
/// behind the current best face; the manager uses it for split-horizon
/// filtering of outbound advertisements.
#[derive(Debug, Clone)]
pub struct RoutingEntry {
    name: String,
    originator: String,
    seq_num: u64,
    next_hops: BTreeMap<FaceId, NextHopRecord>,
    best_face: Option<FaceId>,
    best_cost: u32,
    second_best_cost: u32,
    learned_from: String,
    path_vectors: PathVectorSet,
}

impl RoutingEntry {
    pub fn new(
        name: impl Into<String>,
        originator: impl Into<String>,
        seq_num: u64,
        path_vectors: PathVectorSet,
    ) -> Self {
        Self {
            name: name.into(),
            originator: originator.into(),
            seq_num,
            next_hops: BTreeMap::new(),
            best_face: None,
            best_cost: INFINITY_COST,
            second_best_cost: INFINITY_COST,
            learned_from: String::new(),
            path_vectors,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn originator(&self) -> &str {
        &self.originator
    }

    pub fn set_originator(&mut self, originator: impl Into<String>) {
        self.originator = originator.into();
    }

    pub fn seq_num(&self) -> u64 {
        self.seq_num
    }

    pub fn set_seq_num(&mut self, seq_num: u64) {
        self.seq_num = seq_num;
    }

    pub fn inc_seq(&mut self, by: u64) {
        self.seq_num += by;
    }

    /// Set or overwrite the (cost, neighbor) pair for a face and
    /// recompute the selection.
    pub fn upsert_next_hop(&mut self, face: FaceId, cost: u32, neighbor: impl Into<String>) {
        self.next_hops.insert(
            face,
            NextHopRecord {
                cost,
                neighbor: neighbor.into(),
            },
        );
        self.update_best();
    }

    /// Update the cost of an existing face; unknown faces are ignored.
    pub fn set_next_hop_cost(&mut self, face: FaceId, cost: u32) {
        let Some(record) = self.next_hops.get_mut(&face) else {
            return;
        };
        record.cost = cost;
        self.update_best();
    }

    pub fn delete_next_hop(&mut self, face: FaceId) {
        self.next_hops.remove(&face);
        self.update_best();
    }

    /// Cost recorded for a face, or the infinity sentinel when the face
    /// is unknown.
    pub fn cost(&self, face: FaceId) -> u32 {
        self.next_hops
            .get(&face)
            .map(|r| r.cost)
            .unwrap_or(INFINITY_COST)
    }

    /// Neighbor a face's route came from; empty when the face is unknown.
    pub fn next_hop_name(&self, face: FaceId) -> &str {
        self.next_hops
            .get(&face)
            .map(|r| r.neighbor.as_str())
            .unwrap_or("")
    }

    pub fn best_cost(&self) -> u32 {
        self.best_cost
    }

    pub fn second_best_cost(&self) -> u32 {
        self.second_best_cost
    }

    pub fn best_face(&self) -> Option<FaceId> {
        self.best_face
    }

    pub fn learned_from(&self) -> &str {
        &self.learned_from
    }

    /// Faces that still carry a usable (non-infinity) cost. Withdrawn
    /// faces stay in the table but do not count.
    pub fn valid_next_hops(&self) -> usize {
        self.next_hops
            .values()
            .filter(|r| r.cost != INFINITY_COST)
            .count()
    }

    pub fn is_next_hop(&self, face: FaceId) -> bool {
        self.next_hops.contains_key(&face)
    }

    pub fn is_direct_route(&self) -> bool {
        self.is_next_hop(LOCAL_FACE)
    }

    pub fn path_vectors(&self) -> &PathVectorSet {
        &self.path_vectors
    }

    pub fn path_vectors_mut(&mut self) -> &mut PathVectorSet {
        &mut self.path_vectors
    }

    fn update_best(&mut self) {
        self.best_face = None;
        self.best_cost = INFINITY_COST;
        self.second_best_cost = INFINITY_COST;

        // Ascending face order: the first face with the minimum cost
        // wins ties, which keeps the digest reproducible.
        for (face, record) in &self.next_hops {
            if record.cost < self.best_cost {
                self.second_best_cost = self.best_cost;
                self.best_cost = record.cost;
                self.best_face = Some(*face);
            } else if record.cost < self.second_best_cost {
                self.second_best_cost = record.cost;
            }
        }

        if let Some(face) = self.best_face {
            if let Some(record) = self.next_hops.get(&face) {
                self.learned_from = record.neighbor.clone();
            }
        }
    }
}

/// The routing table plus its freshness markers.
///
/// Entries are kept in name order; the digest is a fold over that order,
/// so two routers holding the same per-prefix state always agree on it.
/// The version counter increases on every committed change and lets the
/// transport layer cheaply detect a stale peer view.
pub struct RoutingManager {
    rt: BTreeMap<String, RoutingEntry>,
    version: u32,
    digest: String,
    local_router: RouterId,
    config: ProtocolConfig,
    template: Fingerprint,
}

impl RoutingManager {
    pub fn new(
        local_router: impl Into<RouterId>,
        config: ProtocolConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let template = Fingerprint::with_config(&config.fingerprint)?;
        Ok(Self {
            rt: BTreeMap::new(),
            version: 1,
            digest: "0".to_string(),
            local_router: local_router.into(),
            config,
            template,
        })
    }

    pub fn local_router(&self) -> &str {
        &self.local_router
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn len(&self) -> usize {
        self.rt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rt.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RoutingEntry)> {
        self.rt.iter()
    }

    pub fn lookup(&self, name: &str) -> Option<&RoutingEntry> {
        self.rt.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut RoutingEntry> {
        self.rt.get_mut(name)
    }

    pub fn is_direct_route(&self, name: &str) -> bool {
        self.rt
            .get(name)
            .map(RoutingEntry::is_direct_route)
            .unwrap_or(false)
    }

    /// Insert (or replace) an entry and commit the change.
    pub fn insert(&mut self, entry: RoutingEntry) {
        info!(
            "inserting route {} seq={} best_cost={}",
            entry.name(),
            entry.seq_num(),
            entry.best_cost()
        );
        self.rt.insert(entry.name().to_string(), entry);
        self.inc_version();
    }

    /// Remove one face of a route. Whether a fully withdrawn entry is
    /// purged or kept as a tombstone follows the configured retention
    /// policy.
    pub fn delete_route(&mut self, name: &str, face: FaceId) {
        let Some(entry) = self.rt.get_mut(name) else {
            return;
        };
        info!("deleting route {} via face {}", name, face);
        entry.delete_next_hop(face);
        entry.path_vectors_mut().delete_face(face);
        self.apply_retention();
        self.inc_version();
    }

    /// Remove an entry outright, regardless of retention policy.
    pub fn remove_route(&mut self, name: &str) {
        if self.rt.remove(name).is_some() {
            self.inc_version();
        }
    }

    /// Start originating a prefix from this router. The advertised
    /// fingerprint gets the local id stamped at encoding time, so the
    /// stored path vector stays empty for direct routes.
    pub fn advertise_local_prefix(&mut self, prefix: &str) {
        if let Some(entry) = self.rt.get_mut(prefix) {
            entry.inc_seq(1);
            self.inc_version();
            return;
        }
        let mut entry = RoutingEntry::new(
            prefix,
            self.local_router.clone(),
            1,
            PathVectorSet::new(self.local_router.clone()),
        );
        entry.upsert_next_hop(LOCAL_FACE, 0, self.local_router.clone());
        self.insert(entry);
    }

    /// Apply one decoded route advertisement received from `neighbor` on
    /// `face`. Returns whether the table changed.
    ///
    /// Admission order: reject echoes of our own originations, handle
    /// infinity-cost withdrawals, drop stale sequence numbers, then run
    /// the fingerprint loop/duplicate check before touching the cost
    /// table.
    pub fn process_update(&mut self, neighbor: &str, face: FaceId, advert: &RouteAdvert) -> bool {
        if advert.originator == self.local_router {
            debug!("ignoring echo of locally originated {}", advert.prefix);
            return false;
        }

        if advert.cost == INFINITY_COST {
            return self.process_withdrawal(face, advert);
        }

        let fingerprint = match Fingerprint::from_raw(advert.fingerprint, &self.config.fingerprint)
        {
            Ok(fp) => fp,
            Err(e) => {
                warn!("dropping advert for {}: {}", advert.prefix, e);
                return false;
            }
        };
        let hop = NextHop::new(fingerprint);
        let cost = hop.cost();

        match self.rt.get_mut(&advert.prefix) {
            Some(entry) => {
                if advert.seq_num < entry.seq_num() {
                    debug!(
                        "stale advert for {} (seq {} < {})",
                        advert.prefix,
                        advert.seq_num,
                        entry.seq_num()
                    );
                    return false;
                }
                if entry.path_vectors().contains(face, &hop) {
                    // Same path re-announced: only a fresher sequence
                    // number makes this a committed refresh.
                    if advert.seq_num == entry.seq_num() {
                        debug!("duplicate path for {} on face {}", advert.prefix, face);
                        return false;
                    }
                } else if !entry.path_vectors_mut().add_path(face, hop) {
                    return false;
                }
                entry.set_seq_num(advert.seq_num);
                entry.upsert_next_hop(face, cost, neighbor);
                debug!(
                    "updated {} via face {} cost {} from {}",
                    advert.prefix, face, cost, neighbor
                );
                self.inc_version();
                true
            }
            None => {
                let mut path_vectors = PathVectorSet::new(self.local_router.clone());
                if !path_vectors.add_path(face, hop) {
                    debug!("rejected first path for {} on face {}", advert.prefix, face);
                    return false;
                }
                let mut entry = RoutingEntry::new(
                    advert.prefix.clone(),
                    advert.originator.clone(),
                    advert.seq_num,
                    path_vectors,
                );
                entry.upsert_next_hop(face, cost, neighbor);
                self.insert(entry);
                true
            }
        }
    }

    /// A neighbor stopped answering hellos: every route learned on its
    /// face becomes unreachable and the face's path vectors are dropped.
    pub fn neighbor_down(&mut self, face: FaceId) {
        let mut changed = false;
        for entry in self.rt.values_mut() {
            if entry.is_next_hop(face) {
                entry.set_next_hop_cost(face, INFINITY_COST);
                entry.path_vectors_mut().delete_face(face);
                changed = true;
            }
        }
        if changed {
            info!("neighbor on face {} down, routes marked unreachable", face);
            self.apply_retention();
            self.inc_version();
        }
    }

    /// Build the outbound view for `neighbor`, split-horizon filtered:
    /// routes learned from that neighbor are not advertised back to it.
    pub fn advertisements_for(&self, neighbor: &str) -> Vec<RouteAdvert> {
        self.rt
            .values()
            .filter(|entry| entry.learned_from() != neighbor)
            .map(|entry| self.advert_for(entry))
            .collect()
    }

    /// Outbound view without per-neighbor filtering.
    pub fn advertisements(&self) -> Vec<RouteAdvert> {
        self.rt.values().map(|entry| self.advert_for(entry)).collect()
    }

    /// Recompute the table digest: a SHA-256 fold over (name, sequence,
    /// best cost) in name order, hex-rendered. Two routers with the same
    /// per-prefix state produce the same digest regardless of how the
    /// updates arrived.
    pub fn update_digest(&mut self) {
        let mut hasher = Sha256::new();
        for (name, entry) in &self.rt {
            hasher.update(name.as_bytes());
            hasher.update(entry.seq_num().to_le_bytes());
            hasher.update(entry.best_cost().to_le_bytes());
        }
        self.digest = hex::encode(hasher.finalize());
    }

    pub fn inc_version(&mut self) {
        self.version += 1;
        self.update_digest();
    }

    fn advert_for(&self, entry: &RoutingEntry) -> RouteAdvert {
        // Re-advertised fingerprint = cheapest admitted path on the best
        // face, with this router stamped in. Direct routes start from a
        // fresh fingerprint.
        let mut hop = entry
            .best_face()
            .and_then(|face| entry.path_vectors().best_hop(face))
            .cloned()
            .unwrap_or_else(|| NextHop::new(self.template.clone()));
        hop.add_router_id(&self.local_router);

        RouteAdvert {
            prefix: entry.name().to_string(),
            originator: entry.originator().to_string(),
            seq_num: entry.seq_num(),
            cost: entry.best_cost(),
            fingerprint: hop.raw(),
        }
    }

    fn process_withdrawal(&mut self, face: FaceId, advert: &RouteAdvert) -> bool {
        let Some(entry) = self.rt.get_mut(&advert.prefix) else {
            return false;
        };
        if !entry.is_next_hop(face) {
            return false;
        }
        info!("withdrawal for {} via face {}", advert.prefix, face);
        entry.set_next_hop_cost(face, INFINITY_COST);
        entry.path_vectors_mut().delete_face(face);
        if advert.seq_num > entry.seq_num() {
            entry.set_seq_num(advert.seq_num);
        }
        self.apply_retention();
        self.inc_version();
        true
    }

    fn apply_retention(&mut self) {
        if self.config.retention == RetentionPolicy::PurgeUnreachable {
            self.rt.retain(|_, entry| entry.valid_next_hops() > 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FingerprintConfig;

    fn entry(name: &str) -> RoutingEntry {
        RoutingEntry::new(name, "/net/origin", 1, PathVectorSet::new("/net/self"))
    }

    fn manager() -> RoutingManager {
        RoutingManager::new("/net/a", ProtocolConfig::default()).unwrap()
    }

    fn advert_from(router: &str, prefix: &str, seq: u64) -> RouteAdvert {
        let mut hop = NextHop::new(Fingerprint::new());
        hop.add_router_id(router);
        RouteAdvert {
            prefix: prefix.to_string(),
            originator: router.to_string(),
            seq_num: seq,
            cost: hop.cost(),
            fingerprint: hop.raw(),
        }
    }

    #[test]
    fn best_and_second_best_track_mutations() {
        let mut e = entry("/x");
        e.upsert_next_hop(5, 3, "/net/b");
        assert_eq!(e.best_cost(), 3);
        assert_eq!(e.best_face(), Some(5));
        assert_eq!(e.second_best_cost(), INFINITY_COST);

        e.upsert_next_hop(7, 1, "/net/c");
        assert_eq!(e.best_cost(), 1);
        assert_eq!(e.best_face(), Some(7));
        assert_eq!(e.second_best_cost(), 3);
        assert_eq!(e.learned_from(), "/net/c");

        e.delete_next_hop(7);
        assert_eq!(e.best_cost(), 3);
        assert_eq!(e.best_face(), Some(5));
        assert_eq!(e.second_best_cost(), INFINITY_COST);
        assert_eq!(e.learned_from(), "/net/b");
    }

    #[test]
    fn ties_resolve_to_lowest_face() {
        let mut e = entry("/x");
        e.upsert_next_hop(9, 2, "/net/b");
        e.upsert_next_hop(3, 2, "/net/c");
        assert_eq!(e.best_face(), Some(3));
        assert_eq!(e.best_cost(), 2);
        assert_eq!(e.second_best_cost(), 2);
        assert_eq!(e.learned_from(), "/net/c");
    }

    #[test]
    fn missing_face_lookups_return_sentinels() {
        let e = entry("/x");
        assert_eq!(e.cost(99), INFINITY_COST);
        assert_eq!(e.next_hop_name(99), "");
        assert_eq!(e.best_face(), None);
        assert_eq!(e.best_cost(), INFINITY_COST);
    }

    #[test]
    fn infinity_faces_are_not_valid_hops() {
        let mut e = entry("/x");
        e.upsert_next_hop(5, 2, "/net/b");
        e.upsert_next_hop(6, 4, "/net/c");
        assert_eq!(e.valid_next_hops(), 2);

        e.set_next_hop_cost(5, INFINITY_COST);
        assert_eq!(e.valid_next_hops(), 1);
        assert!(e.is_next_hop(5), "withdrawn face stays in the table");
        assert_eq!(e.best_cost(), 4);
        assert_eq!(e.best_face(), Some(6));
    }

    #[test]
    fn set_cost_on_unknown_face_is_a_no_op() {
        let mut e = entry("/x");
        e.set_next_hop_cost(5, 7);
        assert!(!e.is_next_hop(5));
    }

    #[test]
    fn version_and_digest_move_on_insert() {
        let mut m = manager();
        assert_eq!(m.version(), 1);
        assert_eq!(m.digest(), "0");

        m.insert(entry("/x"));
        assert_eq!(m.version(), 2);
        assert_ne!(m.digest(), "0");
    }

    #[test]
    fn digest_depends_only_on_final_state() {
        let mut one = manager();
        one.insert(entry("/x"));
        one.insert(entry("/y"));

        let mut two = manager();
        two.insert(entry("/y"));
        two.insert(entry("/x"));
        // extra committed change that ends in identical state
        two.delete_route("/y", 99);

        assert_ne!(one.version(), two.version());
        assert_eq!(one.digest(), two.digest());
    }

    #[test]
    fn digest_reflects_cost_changes() {
        let mut m = manager();
        m.insert(entry("/x"));
        let before = m.digest().to_string();

        m.lookup_mut("/x").unwrap().upsert_next_hop(5, 2, "/net/b");
        m.inc_version();
        assert_ne!(m.digest(), before);
    }

    #[test]
    fn process_update_admits_new_route() {
        let mut m = manager();
        let advert = advert_from("/net/b", "/x", 1);

        assert!(m.process_update("/net/b", 5, &advert));
        let e = m.lookup("/x").unwrap();
        assert_eq!(e.best_cost(), 1);
        assert_eq!(e.best_face(), Some(5));
        assert_eq!(e.learned_from(), "/net/b");
        assert_eq!(e.path_vectors().get_cost(5), 1);
    }

    #[test]
    fn process_update_rejects_looped_path() {
        let mut m = manager();
        assert!(m.process_update("/net/b", 5, &advert_from("/net/b", "/x", 1)));

        // The same route coming back after passing through us.
        let mut hop = NextHop::new(Fingerprint::new());
        hop.add_router_id("/net/b");
        hop.add_router_id("/net/a");
        let looped = RouteAdvert {
            prefix: "/x".to_string(),
            originator: "/net/b".to_string(),
            seq_num: 2,
            cost: hop.cost(),
            fingerprint: hop.raw(),
        };

        assert!(!m.process_update("/net/c", 6, &looped));
        assert!(!m.lookup("/x").unwrap().is_next_hop(6));
    }

    #[test]
    fn process_update_rejects_stale_sequence() {
        let mut m = manager();
        assert!(m.process_update("/net/b", 5, &advert_from("/net/b", "/x", 4)));

        let mut stale = advert_from("/net/c", "/x", 3);
        stale.originator = "/net/b".to_string();
        assert!(!m.process_update("/net/c", 6, &stale));
    }

    #[test]
    fn same_path_with_fresher_sequence_refreshes_entry() {
        let mut m = manager();
        assert!(m.process_update("/net/b", 5, &advert_from("/net/b", "/x", 1)));

        // Identical fingerprint, same sequence: nothing to commit.
        assert!(!m.process_update("/net/b", 5, &advert_from("/net/b", "/x", 1)));

        // Identical fingerprint, advanced sequence: committed refresh.
        assert!(m.process_update("/net/b", 5, &advert_from("/net/b", "/x", 2)));
        let e = m.lookup("/x").unwrap();
        assert_eq!(e.seq_num(), 2);
        assert_eq!(e.path_vectors().next_hops(5).len(), 1);
    }

    #[test]
    fn process_update_ignores_own_originations() {
        let mut m = manager();
        let advert = advert_from("/net/a", "/x", 1);
        assert!(!m.process_update("/net/b", 5, &advert));
        assert!(m.lookup("/x").is_none());
    }

    #[test]
    fn withdrawal_marks_face_unreachable() {
        let mut m = manager();
        assert!(m.process_update("/net/b", 5, &advert_from("/net/b", "/x", 1)));

        let withdrawal = RouteAdvert {
            prefix: "/x".to_string(),
            originator: "/net/b".to_string(),
            seq_num: 2,
            cost: INFINITY_COST,
            fingerprint: 0,
        };
        assert!(m.process_update("/net/b", 5, &withdrawal));

        let e = m.lookup("/x").unwrap();
        assert_eq!(e.cost(5), INFINITY_COST);
        assert_eq!(e.valid_next_hops(), 0);
        assert_eq!(e.seq_num(), 2);
    }

    #[test]
    fn neighbor_down_withdraws_learned_routes() {
        let mut m = manager();
        m.process_update("/net/b", 5, &advert_from("/net/b", "/x", 1));
        m.process_update("/net/b", 5, &advert_from("/net/b", "/y", 1));
        let version = m.version();

        m.neighbor_down(5);
        assert!(m.version() > version);
        assert_eq!(m.lookup("/x").unwrap().best_cost(), INFINITY_COST);
        assert_eq!(m.lookup("/x").unwrap().valid_next_hops(), 0);
        assert!(m.lookup("/x").unwrap().path_vectors().is_empty());
    }

    #[test]
    fn tombstones_survive_unless_purging() {
        let mut retaining = manager();
        retaining.process_update("/net/b", 5, &advert_from("/net/b", "/x", 1));
        retaining.delete_route("/x", 5);
        assert!(retaining.lookup("/x").is_some());

        let config = ProtocolConfig {
            retention: RetentionPolicy::PurgeUnreachable,
            ..Default::default()
        };
        let mut purging = RoutingManager::new("/net/a", config).unwrap();
        purging.process_update("/net/b", 5, &advert_from("/net/b", "/x", 1));
        purging.delete_route("/x", 5);
        assert!(purging.lookup("/x").is_none());
    }

    #[test]
    fn advertisements_stamp_local_router() {
        let mut m = manager();
        m.process_update("/net/b", 5, &advert_from("/net/b", "/x", 1));

        let adverts = m.advertisements();
        assert_eq!(adverts.len(), 1);
        let fp =
            Fingerprint::from_raw(adverts[0].fingerprint, &FingerprintConfig::default()).unwrap();
        assert!(fp.contains("/net/a"));
        assert!(fp.contains("/net/b"));
        assert_eq!(fp.count(), 2);
    }

    #[test]
    fn split_horizon_skips_upstream_neighbor() {
        let mut m = manager();
        m.process_update("/net/b", 5, &advert_from("/net/b", "/x", 1));
        m.process_update("/net/c", 6, &advert_from("/net/c", "/y", 1));

        let to_b: Vec<_> = m
            .advertisements_for("/net/b")
            .into_iter()
            .map(|a| a.prefix)
            .collect();
        assert_eq!(to_b, vec!["/y".to_string()]);
    }

    #[test]
    fn local_prefix_is_direct_and_advertised() {
        let mut m = manager();
        m.advertise_local_prefix("/net/a/site");

        assert!(m.is_direct_route("/net/a/site"));
        let e = m.lookup("/net/a/site").unwrap();
        assert_eq!(e.best_cost(), 0);
        assert_eq!(e.seq_num(), 1);

        let adverts = m.advertisements_for("/net/b");
        assert_eq!(adverts.len(), 1);
        let fp =
            Fingerprint::from_raw(adverts[0].fingerprint, &FingerprintConfig::default()).unwrap();
        assert!(fp.contains("/net/a"));
        assert_eq!(fp.count(), 1);

        m.advertise_local_prefix("/net/a/site");
        assert_eq!(m.lookup("/net/a/site").unwrap().seq_num(), 2);
    }
}
