//! Peer tracking and liveness for the gossip mesh.
//!
//! The [`PeerTable`] is the single source of truth for "who do we know?".
//! Peers are keyed by canonical `host:port`; observing a peer is
//! idempotent and only refreshes its last-heard timestamp.  Entries that
//! stay silent past the prune horizon are evicted.  All methods take
//! `now` explicitly so tests control the clock.

use {
    crate::message::peer_key,
    log::{info, warn},
    omesh_consensus_om::types::PeerKey,
    rand::{seq::IteratorRandom, Rng},
    std::{
        collections::HashMap,
        net::SocketAddr,
        time::{Duration, Instant},
    },
};

/// Per-peer bookkeeping.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    /// Resolved UDP endpoint.
    pub addr: SocketAddr,
    /// Monotonic time of the last gossip heard from (or about) this peer.
    pub last_heard: Instant,
}

/// The set of known peers on the mesh.
#[derive(Debug)]
pub struct PeerTable {
    peers: HashMap<PeerKey, PeerEntry>,
    prune_horizon: Duration,
}

impl PeerTable {
    /// Create an empty table with the given prune horizon.
    pub fn new(prune_horizon: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            prune_horizon,
        }
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.peers.contains_key(key)
    }

    /// Record that a peer was heard from.  Idempotent with respect to
    /// identity: a known peer only gets its timestamp refreshed.
    pub fn observe(&mut self, addr: SocketAddr, now: Instant) -> PeerKey {
        let key = peer_key(&addr);
        match self.peers.get_mut(&key) {
            Some(entry) => entry.last_heard = now,
            None => {
                info!("discovered peer {key}");
                self.peers.insert(
                    key.clone(),
                    PeerEntry {
                        addr,
                        last_heard: now,
                    },
                );
            }
        }
        key
    }

    /// All known peer keys.
    pub fn keys(&self) -> Vec<PeerKey> {
        self.peers.keys().cloned().collect()
    }

    /// Endpoint of a known peer.
    pub fn addr_of(&self, key: &str) -> Option<SocketAddr> {
        self.peers.get(key).map(|e| e.addr)
    }

    /// Point-in-time view: `(key, silence)` per peer, sorted by key for
    /// stable presentation.
    pub fn snapshot(&self, now: Instant) -> Vec<(PeerKey, Duration)> {
        let mut view: Vec<_> = self
            .peers
            .iter()
            .map(|(k, e)| (k.clone(), now.saturating_duration_since(e.last_heard)))
            .collect();
        view.sort_by(|a, b| a.0.cmp(&b.0));
        view
    }

    /// Evict peers silent for longer than the prune horizon.  Returns the
    /// evicted keys.
    pub fn prune(&mut self, now: Instant) -> Vec<PeerKey> {
        let horizon = self.prune_horizon;
        let stale: Vec<PeerKey> = self
            .peers
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.last_heard) > horizon)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            warn!("pruning stale peer {key} (silent >{}s)", horizon.as_secs());
            self.peers.remove(key);
        }
        stale
    }

    /// Up to `k` peers chosen uniformly, skipping any key for which
    /// `exclude` returns true.
    pub fn random_subset(
        &self,
        k: usize,
        exclude: impl Fn(&str) -> bool,
        rng: &mut impl Rng,
    ) -> Vec<(PeerKey, SocketAddr)> {
        self.peers
            .iter()
            .filter(|(key, _)| !exclude(key))
            .map(|(key, entry)| (key.clone(), entry.addr))
            .choose_multiple(rng, k)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use {super::*, rand::rngs::StdRng, rand::SeedableRng};

    fn addr(n: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, n], 9000))
    }

    #[test]
    fn test_observe_is_idempotent() {
        let mut table = PeerTable::new(Duration::from_secs(120));
        let t0 = Instant::now();
        let key = table.observe(addr(1), t0);
        assert_eq!(key, "10.0.0.1:9000");

        let t1 = t0 + Duration::from_secs(30);
        table.observe(addr(1), t1);
        assert_eq!(table.len(), 1);
        let (_, silence) = table.snapshot(t1).pop().unwrap();
        assert_eq!(silence, Duration::ZERO);
    }

    #[test]
    fn test_prune_evicts_past_horizon() {
        let mut table = PeerTable::new(Duration::from_secs(120));
        let t0 = Instant::now();
        table.observe(addr(1), t0);
        table.observe(addr(2), t0 + Duration::from_secs(100));

        let now = t0 + Duration::from_secs(121);
        let evicted = table.prune(now);
        assert_eq!(evicted, vec!["10.0.0.1:9000".to_string()]);
        assert!(!table.contains("10.0.0.1:9000"));
        assert!(table.contains("10.0.0.2:9000"));
    }

    #[test]
    fn test_random_subset_bounds_and_exclusion() {
        let mut table = PeerTable::new(Duration::from_secs(120));
        let t0 = Instant::now();
        for n in 1..=5 {
            table.observe(addr(n), t0);
        }
        let mut rng = StdRng::seed_from_u64(3);

        let all = table.random_subset(10, |_| false, &mut rng);
        assert_eq!(all.len(), 5);

        let some = table.random_subset(3, |k| k == "10.0.0.1:9000", &mut rng);
        assert_eq!(some.len(), 3);
        assert!(some.iter().all(|(k, _)| k != "10.0.0.1:9000"));
    }

    #[test]
    fn test_snapshot_is_sorted_and_aged() {
        let mut table = PeerTable::new(Duration::from_secs(120));
        let t0 = Instant::now();
        table.observe(addr(2), t0);
        table.observe(addr(1), t0);
        let view = table.snapshot(t0 + Duration::from_secs(7));
        assert_eq!(view[0].0, "10.0.0.1:9000");
        assert_eq!(view[1].0, "10.0.0.2:9000");
        assert!(view.iter().all(|(_, d)| *d == Duration::from_secs(7)));
    }
}
