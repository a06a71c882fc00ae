//! omesh Peer Node
//!
//! Ties the gossip membership layer and the OM consensus engine together
//! into a running node: one UDP socket, one TCP CLI listener, and a
//! single-threaded event loop that owns every piece of mutable state.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────┐
//!  │                 Node event loop                   │
//!  │                                                   │
//!  │  UDP datagrams ──▶ gossip engine ──▶ forwards     │
//!  │                └─▶ OM engine ──┬──▶ datagrams     │
//!  │                                └──▶ word store    │
//!  │  CLI requests ──▶ command exec ──▶ replies        │
//!  │  1 s tick ──▶ heartbeat / prune / sweep           │
//!  └──────────────────────────────────────────────────┘
//! ```
//!
//! The transport and CLI sessions run as reader tasks feeding bounded
//! channels; everything they deliver is processed serially on the loop,
//! so there is no locking anywhere in the node.

pub mod cli;
pub mod node;
pub mod store;
