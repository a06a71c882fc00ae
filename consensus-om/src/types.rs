//! Core types for the OM consensus protocol.
//!
//! Defines the two consensus message kinds (`forward`, `report`), the
//! round-id format, and the peer-key string alias shared across the
//! workspace.  Messages serialize to the JSON shapes used on the wire;
//! the transport envelope lives in the networking crate.

use {
    rand::Rng,
    serde::{Deserialize, Serialize},
};

/// Globally unique round identifier: `<peerKey>:<32 lowercase hex chars>`.
pub type RoundId = String;

/// Canonical `host:port` string identifying a UDP endpoint.
pub type PeerKey = String;

/// Number of entries in the shared word database.
pub const WORD_COUNT: usize = 5;

/// Consensus messages exchanged between peers.
///
/// Every consensus datagram carries exactly one of these, tagged by the
/// `kind` field.  Unknown JSON fields are ignored; missing required
/// fields fail deserialization and the datagram is dropped upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConsensusMessage {
    /// Downward propagation of a value under examination.
    Forward {
        /// Round id this message opens at the receiver.
        id: RoundId,
        /// Id of the round that spawned this one; empty for a root.
        parentid: String,
        /// Recursion levels remaining (OM(m)).
        om: u32,
        /// Database index targeted by the root.
        index: usize,
        /// The value under examination at this branch.
        value: String,
        /// Peer key of the root initiator.
        origin: PeerKey,
        /// Peers already visited on this branch, in hop order.
        path: Vec<PeerKey>,
    },

    /// Upward report of a resolved child round.
    Report {
        /// Fresh message id; not used for routing.
        id: String,
        /// Id of the round this vote belongs to at the receiver.
        parentid: RoundId,
        /// Peer key of the child whose result this carries.
        reporter: PeerKey,
        /// The reported value.
        value: String,
    },
}

impl ConsensusMessage {
    /// Return a short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Forward { .. } => "forward",
            Self::Report { .. } => "report",
        }
    }

    /// The round id a receiver should correlate this message with:
    /// the opened round for forwards, the reported-into round for reports.
    pub fn round_id(&self) -> &str {
        match self {
            Self::Forward { id, .. } => id,
            Self::Report { parentid, .. } => parentid,
        }
    }
}

/// Generate a round id: the originator's peer key, a colon, and a random
/// 128-bit value as lowercase hex.  Collisions are treated as
/// non-existent.
pub fn generate_round_id(origin: &str, rng: &mut impl Rng) -> RoundId {
    format!("{origin}:{:032x}", rng.gen::<u128>())
}
