//! Gossip engine: heartbeats, duplicate suppression, fanout forwarding.
//!
//! Membership spreads epidemically: every node heartbeats its own
//! endpoint on a fixed interval, and every node re-broadcasts gossip it
//! has not seen before to a few random peers, excluding the sender and
//! anyone the message already visited.  A bounded seen-id cache keeps the
//! flood finite; on overflow the oldest id is evicted and the protocol
//! tolerates the occasional re-forward.

use {
    crate::{
        message::{resolve_peer, GossipMessage, WireMessage},
        peer_table::PeerTable,
    },
    log::debug,
    omesh_consensus_om::types::{generate_round_id, PeerKey},
    rand::Rng,
    std::{
        collections::{HashSet, VecDeque},
        net::SocketAddr,
        time::Instant,
    },
};

/// Bounded insertion-ordered id set.  Oldest entries are evicted first
/// once capacity is reached.
#[derive(Debug)]
struct SeenCache {
    order: VecDeque<String>,
    set: HashSet<String>,
    capacity: usize,
}

impl SeenCache {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Insert an id, returning `false` when it was already present.
    fn insert(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.set.insert(id.to_string());
        true
    }
}

/// The gossip membership engine for one node.
#[derive(Debug)]
pub struct GossipEngine {
    identity: PeerKey,
    host: String,
    port: u16,
    fanout: usize,
    seen: SeenCache,
}

impl GossipEngine {
    /// Create an engine advertising `host:port` as this node's endpoint.
    pub fn new(host: String, port: u16, fanout: usize, seen_cache_size: usize) -> Self {
        Self {
            identity: format!("{host}:{port}"),
            host,
            port,
            fanout,
            seen: SeenCache::new(seen_cache_size),
        }
    }

    /// This node's advertised peer key.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Build a fresh heartbeat advertising this node, with an empty path.
    /// The id is marked seen so our own gossip is never re-forwarded when
    /// the mesh echoes it back.
    pub fn make_heartbeat(&mut self, rng: &mut impl Rng) -> WireMessage {
        let id = generate_round_id(&self.identity, rng);
        self.seen.insert(&id);
        WireMessage::Gossip(GossipMessage {
            id,
            host: self.host.clone(),
            port: self.port,
            path: Vec::new(),
        })
    }

    /// Process one inbound gossip.  Unseen gossip records the sender and
    /// the advertised endpoint in the peer table, then returns forwards
    /// for up to `fanout` peers not yet on the path.  Duplicates return
    /// nothing.
    pub fn on_gossip(
        &mut self,
        msg: GossipMessage,
        sender: SocketAddr,
        table: &mut PeerTable,
        now: Instant,
        rng: &mut impl Rng,
    ) -> Vec<(SocketAddr, WireMessage)> {
        if !self.seen.insert(&msg.id) {
            debug!("duplicate gossip {} from {sender}", msg.id);
            return Vec::new();
        }

        let sender_key = table.observe(sender, now);

        // The advertised endpoint is the point of forwarding: it lets us
        // learn peers we have never exchanged a datagram with.
        if msg.origin_key() != self.identity {
            if let Ok(addr) = resolve_peer(&msg.host, msg.port) {
                table.observe(addr, now);
            } else {
                debug!("gossip {} advertises unresolvable {}", msg.id, msg.origin_key());
            }
        }

        let mut forward = msg;
        forward.path.push(self.identity.clone());

        let targets = table.random_subset(
            self.fanout,
            |key| key == sender_key || forward.path.iter().any(|p| p == key),
            rng,
        );
        targets
            .into_iter()
            .map(|(_, addr)| (addr, WireMessage::Gossip(forward.clone())))
            .collect()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use {
        super::*,
        rand::{rngs::StdRng, SeedableRng},
        std::time::Duration,
    };

    fn addr(n: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, n], 9000))
    }

    fn key(n: u8) -> String {
        format!("10.0.0.{n}:9000")
    }

    fn engine() -> GossipEngine {
        GossipEngine::new("10.0.0.99".to_string(), 9000, 3, 16)
    }

    fn heartbeat_from(n: u8, id: &str) -> GossipMessage {
        GossipMessage {
            id: id.to_string(),
            host: format!("10.0.0.{n}"),
            port: 9000,
            path: vec![],
        }
    }

    #[test]
    fn test_heartbeat_advertises_self_with_empty_path() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut engine = engine();
        match engine.make_heartbeat(&mut rng) {
            WireMessage::Gossip(g) => {
                assert_eq!(g.host, "10.0.0.99");
                assert_eq!(g.port, 9000);
                assert!(g.path.is_empty());
                assert!(g.id.starts_with("10.0.0.99:9000:"));
            }
            other => panic!("expected gossip, got {other:?}"),
        }
    }

    #[test]
    fn test_unseen_gossip_learns_and_forwards() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut engine = engine();
        let mut table = PeerTable::new(Duration::from_secs(120));
        let now = Instant::now();
        for n in 2..=6 {
            table.observe(addr(n), now);
        }

        // Peer 1 forwards a heartbeat that originated at peer 7.
        let forwards = engine.on_gossip(heartbeat_from(7, "g1"), addr(1), &mut table, now, &mut rng);

        assert!(table.contains(&key(1)), "sender observed");
        assert!(table.contains(&key(7)), "advertised endpoint observed");
        assert_eq!(forwards.len(), 3, "fanout respected");
        for (to, msg) in &forwards {
            assert_ne!(*to, addr(1), "never forwarded back to the sender");
            match msg {
                WireMessage::Gossip(g) => {
                    assert_eq!(g.path, vec!["10.0.0.99:9000".to_string()]);
                }
                other => panic!("expected gossip, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_duplicate_gossip_not_reforwarded() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut engine = engine();
        let mut table = PeerTable::new(Duration::from_secs(120));
        let now = Instant::now();
        for n in 2..=4 {
            table.observe(addr(n), now);
        }

        let first = engine.on_gossip(heartbeat_from(1, "g1"), addr(1), &mut table, now, &mut rng);
        assert!(!first.is_empty());
        let second = engine.on_gossip(heartbeat_from(1, "g1"), addr(1), &mut table, now, &mut rng);
        assert!(second.is_empty());
    }

    #[test]
    fn test_path_members_excluded_from_forwarding() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut engine = engine();
        let mut table = PeerTable::new(Duration::from_secs(120));
        let now = Instant::now();
        for n in 2..=4 {
            table.observe(addr(n), now);
        }

        let mut msg = heartbeat_from(1, "g2");
        msg.path = vec![key(2), key(3)];
        let forwards = engine.on_gossip(msg, addr(1), &mut table, now, &mut rng);
        let targets: Vec<SocketAddr> = forwards.iter().map(|(a, _)| *a).collect();
        assert_eq!(targets, vec![addr(4)]);
    }

    #[test]
    fn test_own_heartbeat_echo_suppressed() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut engine = engine();
        let mut table = PeerTable::new(Duration::from_secs(120));
        let now = Instant::now();
        table.observe(addr(2), now);

        let WireMessage::Gossip(hb) = engine.make_heartbeat(&mut rng) else {
            panic!("heartbeat is gossip");
        };
        // The mesh echoes our own heartbeat back through peer 2.
        let forwards = engine.on_gossip(hb, addr(2), &mut table, now, &mut rng);
        assert!(forwards.is_empty());
    }

    #[test]
    fn test_seen_cache_evicts_oldest() {
        let mut cache = SeenCache::new(2);
        assert!(cache.insert("a"));
        assert!(cache.insert("b"));
        assert!(cache.insert("c")); // evicts "a"
        assert!(!cache.insert("b"));
        assert!(cache.insert("a"), "evicted id is forwardable again");
    }
}
