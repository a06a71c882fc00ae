//! Configuration for the gossip networking layer.

use std::time::Duration;

/// Configuration for gossip membership and the UDP transport.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Interval between heartbeat gossips.
    /// Default: 60 s.
    pub heartbeat_interval_secs: u64,

    /// How long a peer may stay silent before being pruned.
    /// Default: 120 s.
    pub peer_prune_secs: u64,

    /// How often the prune scan runs.
    /// Default: 5 s.
    pub prune_check_secs: u64,

    /// How many peers a unique gossip is re-broadcast to.  Must exceed 1
    /// for the mesh to heal around a dead node.
    /// Default: 3.
    pub fanout: usize,

    /// Capacity of the seen-gossip-id cache.  On overflow the oldest id
    /// is evicted; the protocol tolerates the resulting re-forward.
    /// Default: 1024.
    pub seen_cache_size: usize,

    /// Maximum encoded datagram size in bytes, kept under the IPv4
    /// fragmentation threshold.
    /// Default: 1400.
    pub max_datagram_size: usize,

    /// Size of the inbound datagram channel buffer.
    pub channel_buffer_size: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 60,
            peer_prune_secs: 120,
            prune_check_secs: 5,
            fanout: 3,
            seen_cache_size: 1024,
            max_datagram_size: 1_400,
            channel_buffer_size: 1_024,
        }
    }
}

impl GossipConfig {
    /// Prune horizon as a [`Duration`].
    pub fn prune_horizon(&self) -> Duration {
        Duration::from_secs(self.peer_prune_secs)
    }

    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Create a config suitable for local testing with short intervals.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            heartbeat_interval_secs: 1,
            peer_prune_secs: 10,
            prune_check_secs: 1,
            fanout: 3,
            seen_cache_size: 64,
            max_datagram_size: 1_400,
            channel_buffer_size: 64,
        }
    }
}
