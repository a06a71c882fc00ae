//! Error types for the gossip networking layer.

use thiserror::Error;

/// Errors that can occur in the gossip networking layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// Failed to encode or decode a datagram.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encoded datagram exceeds the fragmentation-safe maximum.
    #[error("datagram too large: {size} bytes (max {max} bytes)")]
    DatagramTooLarge {
        /// Actual encoded size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Socket-level I/O error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The channel delivering datagrams to the node loop is closed.
    #[error("inbound channel closed")]
    ChannelClosed,

    /// A peer address could not be parsed or resolved.
    #[error("invalid peer address: {0}")]
    InvalidPeerAddress(String),
}

/// Convenience result type for gossip networking operations.
pub type Result<T> = std::result::Result<T, NetError>;
