//! Wire envelope and serialization for the UDP protocol.
//!
//! Every datagram carries exactly one JSON object, tagged by `type`:
//!
//! ```text
//! {"type":"gossip","id":...,"host":...,"port":...,"path":[...]}
//! {"type":"consensus","kind":"forward",...}
//! {"type":"consensus","kind":"report",...}
//! ```
//!
//! Unknown fields are ignored; missing required fields fail decoding and
//! the transport drops the datagram silently.

use {
    crate::error::{NetError, Result},
    omesh_consensus_om::types::{ConsensusMessage, PeerKey},
    serde::{Deserialize, Serialize},
    std::net::{IpAddr, SocketAddr, ToSocketAddrs},
};

/// A gossip heartbeat advertising the originator's UDP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipMessage {
    /// Unique gossip id, used for duplicate suppression.
    pub id: String,
    /// Originator's canonical host.
    pub host: String,
    /// Originator's UDP port.
    pub port: u16,
    /// Peers this gossip has already visited.
    pub path: Vec<PeerKey>,
}

impl GossipMessage {
    /// Peer key of the advertised endpoint.
    pub fn origin_key(&self) -> PeerKey {
        format!("{}:{}", self.host, self.port)
    }
}

/// Top-level wire message: one per datagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    Gossip(GossipMessage),
    Consensus(ConsensusMessage),
}

impl WireMessage {
    /// Encode to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(NetError::Serialization)
    }

    /// Decode from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(NetError::Serialization)
    }

    /// Encode, failing when the result would exceed `max_size`.
    pub fn encode_checked(&self, max_size: usize) -> Result<Vec<u8>> {
        let bytes = self.to_bytes()?;
        if bytes.len() > max_size {
            return Err(NetError::DatagramTooLarge {
                size: bytes.len(),
                max: max_size,
            });
        }
        Ok(bytes)
    }

    /// Return a human-readable tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gossip(_) => "gossip",
            Self::Consensus(msg) => msg.kind(),
        }
    }
}

/// Canonical peer key for a socket address.
pub fn peer_key(addr: &SocketAddr) -> PeerKey {
    format!("{}:{}", addr.ip(), addr.port())
}

/// Resolve a `host`/`port` pair to a socket address.  IP literals take a
/// fast path; hostnames go through the system resolver, which only
/// happens for bootstrap entries since gossip advertises resolved
/// literals.
pub fn resolve_peer(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (host, port)
        .to_socket_addrs()
        .map_err(|_| NetError::InvalidPeerAddress(format!("{host}:{port}")))?
        .next()
        .ok_or_else(|| NetError::InvalidPeerAddress(format!("{host}:{port}")))
}

/// Split a `host:port` string.  The port is everything after the last
/// colon, so IPv6 literals and peer-key round ids keep working.
pub fn parse_host_port(s: &str) -> Result<(String, u16)> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| NetError::InvalidPeerAddress(s.to_string()))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| NetError::InvalidPeerAddress(s.to_string()))?;
    if host.is_empty() {
        return Err(NetError::InvalidPeerAddress(s.to_string()));
    }
    Ok((host.to_string(), port))
}

// ── Tests ───────────────────────────────────────────────────────────────────
