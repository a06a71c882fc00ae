//! UDP transport for the gossip mesh.
//!
//! The transport owns the node's one UDP socket.  A background task reads
//! datagrams, decodes them, and delivers [`InboundDatagram`]s to the node
//! loop over a bounded channel; malformed datagrams are dropped there and
//! never reach the loop.  Sends are fire-and-forget: a failed send is the
//! caller's to log, never to retry; the consensus deadline machinery
//! absorbs the loss.

use {
    crate::{
        error::Result,
        message::WireMessage,
    },
    log::{debug, error, warn},
    std::{net::SocketAddr, sync::Arc},
    tokio::{net::UdpSocket, sync::mpsc},
};

/// Largest datagram the receive path will read.
const RECV_BUFFER_SIZE: usize = 4_096;

/// A decoded datagram together with the address it came from.
#[derive(Debug)]
pub struct InboundDatagram {
    /// The decoded wire message.
    pub message: WireMessage,
    /// The remote socket address that sent it.
    pub from: SocketAddr,
}

/// UDP transport bound to one local socket.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    max_datagram_size: usize,
}

impl UdpTransport {
    /// Bind to `addr` (port 0 asks the OS for a free port).
    pub async fn bind(addr: SocketAddr, max_datagram_size: usize) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            max_datagram_size,
        })
    }

    /// The local address this transport is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawn the background receive task.  Returns the channel on which
    /// decoded datagrams arrive.  The task lives as long as the socket.
    pub fn start_receive(&self, channel_buffer: usize) -> mpsc::Receiver<InboundDatagram> {
        let socket = self.socket.clone();
        let (tx, rx) = mpsc::channel(channel_buffer);

        tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, from)) => match WireMessage::from_bytes(&buf[..len]) {
                        Ok(message) => {
                            debug!("received {} from {from}", message.kind());
                            if tx.send(InboundDatagram { message, from }).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            debug!("dropping malformed datagram from {from}: {e}");
                        }
                    },
                    Err(e) => {
                        error!("UDP receive error: {e}");
                    }
                }
            }
        });

        rx
    }

    /// Send one message to one address.
    pub async fn send(&self, msg: &WireMessage, addr: SocketAddr) -> Result<()> {
        let bytes = msg.encode_checked(self.max_datagram_size)?;
        self.socket.send_to(&bytes, addr).await?;
        Ok(())
    }

    /// Send one message to several addresses, logging failures per
    /// target and carrying on.
    pub async fn broadcast(&self, msg: &WireMessage, addrs: &[SocketAddr]) {
        let bytes = match msg.encode_checked(self.max_datagram_size) {
            Ok(b) => b,
            Err(e) => {
                warn!("not broadcasting {}: {e}", msg.kind());
                return;
            }
        };
        for addr in addrs {
            if let Err(e) = self.socket.send_to(&bytes, *addr).await {
                warn!("failed to send {} to {addr}: {e}", msg.kind());
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
