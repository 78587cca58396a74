//! Routes by-root requests to the best-placed peer.
//!
//! Peers are ranked by custody coverage of the missing columns first, then by how many
//! requests they already have in flight. Selection hands out a scoped guard; dropping the
//! guard releases the request slot.

use crate::metrics;
use crate::network::PeerSyncMeta;
use libp2p_identity::PeerId;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use types::ColumnIndex;

/// In-flight requests allowed per peer.
pub const MAX_CONCURRENT_REQUESTS: usize = 2;

#[derive(Debug)]
struct PeerInfo {
    client: String,
    custody_columns: HashSet<ColumnIndex>,
    active_requests: usize,
}

#[derive(Default)]
pub struct PeerBalancer {
    peers: Mutex<HashMap<PeerId, PeerInfo>>,
}

impl PeerBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_peer_connected(&self, meta: PeerSyncMeta) {
        let mut peers = self.peers.lock();
        peers.insert(
            meta.peer_id,
            PeerInfo {
                client: meta.client,
                custody_columns: meta.custody_columns,
                active_requests: 0,
            },
        );
        metrics::set_gauge(&metrics::BALANCER_PEERS, peers.len() as i64);
    }

    pub fn on_peer_disconnected(&self, peer_id: &PeerId) {
        let mut peers = self.peers.lock();
        peers.remove(peer_id);
        metrics::set_gauge(&metrics::BALANCER_PEERS, peers.len() as i64);
    }

    /// Pick the best peer for a request, excluding `excluded`.
    ///
    /// With a pending-columns set, only peers whose custody intersects it qualify, and only
    /// those with the widest intersection survive. Ties break by fewest active requests,
    /// shuffled so equally-placed peers share the load.
    pub fn best_peer(
        self: &Arc<Self>,
        pending_columns: Option<&HashSet<ColumnIndex>>,
        excluded: &HashSet<PeerId>,
    ) -> Option<ActiveRequestGuard> {
        let mut peers = self.peers.lock();

        let mut candidates = peers
            .iter()
            .filter(|(peer_id, info)| {
                info.active_requests < MAX_CONCURRENT_REQUESTS && !excluded.contains(peer_id)
            })
            .map(|(peer_id, info)| {
                let coverage = pending_columns
                    .map(|pending| pending.intersection(&info.custody_columns).count())
                    .unwrap_or(0);
                (*peer_id, coverage, info.active_requests)
            })
            .collect::<Vec<_>>();

        if let Some(pending) = pending_columns {
            if !pending.is_empty() {
                let best_coverage = candidates.iter().map(|(_, c, _)| *c).max()?;
                if best_coverage == 0 {
                    return None;
                }
                candidates.retain(|(_, coverage, _)| *coverage == best_coverage);
            }
        }

        candidates.shuffle(&mut rand::rng());
        // Stable sort keeps the shuffle within each active-request tier.
        candidates.sort_by_key(|(_, _, active)| *active);

        let (peer_id, _, _) = candidates.first()?;
        let info = peers.get_mut(peer_id)?;
        info.active_requests += 1;
        debug!(%peer_id, client = %info.client, "Selected peer for request");
        drop(peers);

        self.update_active_requests_gauge();
        Some(ActiveRequestGuard {
            balancer: self.clone(),
            peer_id: *peer_id,
        })
    }

    fn on_request_completed(&self, peer_id: &PeerId) {
        if let Some(info) = self.peers.lock().get_mut(peer_id) {
            info.active_requests = info.active_requests.saturating_sub(1);
        }
        self.update_active_requests_gauge();
    }

    pub fn total_active_requests(&self) -> usize {
        self.peers
            .lock()
            .values()
            .map(|info| info.active_requests)
            .sum()
    }

    pub fn active_requests_for(&self, peer_id: &PeerId) -> usize {
        self.peers
            .lock()
            .get(peer_id)
            .map(|info| info.active_requests)
            .unwrap_or(0)
    }

    pub fn custody_columns_of(&self, peer_id: &PeerId) -> Option<HashSet<ColumnIndex>> {
        self.peers
            .lock()
            .get(peer_id)
            .map(|info| info.custody_columns.clone())
    }

    pub fn num_peers(&self) -> usize {
        self.peers.lock().len()
    }

    fn update_active_requests_gauge(&self) {
        metrics::set_gauge(
            &metrics::BALANCER_ACTIVE_REQUESTS,
            self.total_active_requests() as i64,
        );
    }
}

/// A claimed request slot. Dropping it releases the slot; callers therefore cannot forget to
/// balance `on_request` with a completion.
pub struct ActiveRequestGuard {
    balancer: Arc<PeerBalancer>,
    peer_id: PeerId,
}

impl ActiveRequestGuard {
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.balancer.on_request_completed(&self.peer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashset;

    fn meta(peer_id: PeerId, custody: HashSet<ColumnIndex>) -> PeerSyncMeta {
        PeerSyncMeta {
            peer_id,
            client: "test".into(),
            custody_columns: custody,
        }
    }

    /// Scenario: widest custody coverage wins; peers with zero coverage never qualify.
    #[test]
    fn widest_column_coverage_wins() {
        let balancer = Arc::new(PeerBalancer::new());
        let peer_a = PeerId::random();
        let peer_b = PeerId::random();
        let peer_c = PeerId::random();
        balancer.on_peer_connected(meta(peer_a, hashset! {5, 10}));
        balancer.on_peer_connected(meta(peer_b, hashset! {5, 10, 15}));
        balancer.on_peer_connected(meta(peer_c, hashset! {20}));

        let missing = hashset! {5, 10, 15, 20};
        let guard = balancer
            .best_peer(Some(&missing), &HashSet::new())
            .expect("a peer qualifies");
        assert_eq!(guard.peer_id(), peer_b, "B has the widest intersection");
        drop(guard);
        assert_eq!(balancer.total_active_requests(), 0);

        // Only column 20 is still missing: C is the only qualifying peer; A never qualifies.
        let missing = hashset! {20};
        let guard = balancer
            .best_peer(Some(&missing), &HashSet::new())
            .expect("C qualifies");
        assert_eq!(guard.peer_id(), peer_c);
    }

    #[test]
    fn saturated_peers_are_skipped() {
        let balancer = Arc::new(PeerBalancer::new());
        let peer_a = PeerId::random();
        let peer_b = PeerId::random();
        balancer.on_peer_connected(meta(peer_a, hashset! {}));
        balancer.on_peer_connected(meta(peer_b, hashset! {}));

        // Claim both of A's slots and one of B's.
        let mut guards = vec![];
        for _ in 0..2 * MAX_CONCURRENT_REQUESTS - 1 {
            guards.push(balancer.best_peer(None, &HashSet::new()).unwrap());
        }
        // A balanced allocation: the least-busy peer is picked each time.
        assert_eq!(
            balancer.active_requests_for(&peer_a) + balancer.active_requests_for(&peer_b),
            3
        );

        let last = balancer.best_peer(None, &HashSet::new()).unwrap();
        assert_eq!(balancer.total_active_requests(), 4);
        // Every slot is taken now.
        assert!(balancer.best_peer(None, &HashSet::new()).is_none());

        drop(last);
        assert_eq!(balancer.total_active_requests(), 3);
        assert!(balancer.best_peer(None, &HashSet::new()).is_some());
    }

    #[test]
    fn excluded_peers_are_skipped() {
        let balancer = Arc::new(PeerBalancer::new());
        let peer_a = PeerId::random();
        balancer.on_peer_connected(meta(peer_a, hashset! {1}));

        let excluded = hashset! { peer_a };
        assert!(balancer.best_peer(None, &excluded).is_none());
        assert!(balancer.best_peer(None, &HashSet::new()).is_some());
    }

    #[test]
    fn least_busy_peer_is_preferred() {
        let balancer = Arc::new(PeerBalancer::new());
        let peer_a = PeerId::random();
        let peer_b = PeerId::random();
        balancer.on_peer_connected(meta(peer_a, hashset! {}));
        balancer.on_peer_connected(meta(peer_b, hashset! {}));

        let first = balancer.best_peer(None, &HashSet::new()).unwrap();
        let second = balancer.best_peer(None, &HashSet::new()).unwrap();
        assert_ne!(
            first.peer_id(),
            second.peer_id(),
            "load spreads across peers"
        );
    }

    #[test]
    fn disconnect_drops_peer() {
        let balancer = Arc::new(PeerBalancer::new());
        let peer_a = PeerId::random();
        balancer.on_peer_connected(meta(peer_a, hashset! {1}));
        assert_eq!(balancer.num_peers(), 1);
        balancer.on_peer_disconnected(&peer_a);
        assert_eq!(balancer.num_peers(), 0);
        assert!(balancer.best_peer(None, &HashSet::new()).is_none());
    }
}
