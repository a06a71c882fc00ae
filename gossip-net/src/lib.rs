//! omesh Gossip Networking Layer
//!
//! This crate provides the membership substrate underneath the OM
//! consensus engine.  It handles:
//!
//! - **Wire encoding** — every datagram is one JSON object, either a
//!   gossip heartbeat or a consensus message, capped below the IP
//!   fragmentation threshold.
//! - **Peer discovery** — nodes announce themselves to bootstrap peers
//!   and learn the rest of the mesh from forwarded heartbeats; each peer
//!   carries a last-heard timestamp and is pruned after two minutes of
//!   silence.
//! - **Gossip forwarding** — unique heartbeats are re-broadcast to a
//!   small random fanout, with a visited-path to stop cycles and a
//!   bounded seen-id cache for duplicate suppression.
//! - **UDP transport** — a background receive task parses datagrams and
//!   feeds them to the node loop over a bounded channel; malformed input
//!   is dropped without ever surfacing to the loop.
//!
//! ## Crate modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`]     | `GossipConfig` defaults and dev overrides |
//! | [`message`]    | Wire envelope, JSON codec, peer-key helpers |
//! | [`peer_table`] | Peer lifecycle, liveness, random sampling |
//! | [`gossip`]     | Heartbeats, dedup, fanout forwarding |
//! | [`transport`]  | UDP socket ownership, receive task, sends |
//! | [`error`]      | Crate-wide error enum |

pub mod config;
pub mod error;
pub mod gossip;
pub mod message;
pub mod peer_table;
pub mod transport;

pub use config::GossipConfig;
pub use error::{NetError, Result};
pub use gossip::GossipEngine;
pub use message::{peer_key, resolve_peer, GossipMessage, WireMessage};
pub use peer_table::PeerTable;
pub use transport::{InboundDatagram, UdpTransport};
