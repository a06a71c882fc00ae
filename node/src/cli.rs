//! TCP command-line interface.
//!
//! A listener accepts connections on an OS-assigned port; each session is
//! a line-oriented ASCII protocol.  Sessions never touch node state
//! directly: every command line is shipped to the event loop over a
//! channel and the reply comes back on a oneshot, so any number of
//! concurrent sessions share the same serialization discipline as the
//! rest of the node.  A client that cannot absorb its reply within the
//! write timeout is disconnected.

use {
    log::{debug, error, warn},
    std::{net::SocketAddr, time::Duration},
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::{tcp::OwnedWriteHalf, TcpListener, TcpStream},
        sync::{mpsc, oneshot},
        time::timeout,
    },
};

/// Greeting printed when a session opens.
pub const WELCOME: &str =
    "omesh CLI. commands: peers, current, consensus <index> <word>, lie [percent], truth, exit";

/// How long a reply write may stall before the client is dropped.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// One command line awaiting execution on the node loop.
#[derive(Debug)]
pub struct CliRequest {
    pub line: String,
    pub reply: oneshot::Sender<CliReply>,
}

/// The node loop's answer to one command.
#[derive(Debug)]
pub struct CliReply {
    /// Text to print; may span multiple lines.
    pub text: String,
    /// Whether the session should close after printing.
    pub close: bool,
}

/// A parsed CLI command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Peers,
    Current,
    Consensus { index: usize, word: String },
    Lie(u8),
    Truth,
    Exit,
}

/// Parse one non-empty command line.  Errors are the reason text for an
/// `error:` reply.
pub fn parse_command(line: &str) -> Result<CliCommand, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["peers"] => Ok(CliCommand::Peers),
        ["current"] => Ok(CliCommand::Current),
        ["consensus", index, word @ ..] if !word.is_empty() => {
            let index = index
                .parse::<usize>()
                .map_err(|_| "index must be an integer".to_string())?;
            Ok(CliCommand::Consensus {
                index,
                word: word.join(" "),
            })
        }
        ["consensus", ..] => Err("usage: consensus <index> <word>".to_string()),
        ["lie"] => Ok(CliCommand::Lie(100)),
        ["lie", percent] => percent
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= 100)
            .map(CliCommand::Lie)
            .ok_or_else(|| "percent must be an integer in 0..100".to_string()),
        ["lie", ..] => Err("usage: lie [percent]".to_string()),
        ["truth"] => Ok(CliCommand::Truth),
        ["exit"] => Ok(CliCommand::Exit),
        _ => Err("unknown command".to_string()),
    }
}

/// Spawn the accept loop.  Each accepted connection gets its own session
/// task feeding `requests`.
pub fn spawn(listener: TcpListener, requests: mpsc::Sender<CliRequest>) {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("CLI session opened from {addr}");
                    tokio::spawn(session(stream, addr, requests.clone()));
                }
                Err(e) => error!("CLI accept error: {e}"),
            }
        }
    });
}

async fn session(stream: TcpStream, addr: SocketAddr, requests: mpsc::Sender<CliRequest>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    if write_line(&mut write_half, WELCOME).await.is_err() {
        return;
    }

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!("CLI read error from {addr}: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if requests
            .send(CliRequest {
                line: line.trim().to_string(),
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            break;
        }
        let Ok(reply) = reply_rx.await else { break };

        if write_line(&mut write_half, &reply.text).await.is_err() {
            warn!("disconnecting slow CLI client {addr}");
            break;
        }
        if reply.close {
            break;
        }
    }
    debug!("CLI session from {addr} closed");
}

async fn write_line(writer: &mut OwnedWriteHalf, text: &str) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(text.len().saturating_add(1));
    buf.extend_from_slice(text.as_bytes());
    buf.push(b'\n');
    match timeout(WRITE_TIMEOUT, writer.write_all(&buf)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "CLI write timed out",
        )),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
