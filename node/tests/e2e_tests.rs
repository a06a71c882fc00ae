//! E2E tests: full nodes over loopback sockets.
//!
//! Each test binds one or more real nodes on 127.0.0.1 with dev-profile
//! timings, drives them through the TCP CLI, and observes convergence of
//! the word database.  Scenarios that need precise clock control (deep
//! recursion, deadline defaults, peer pruning) live as deterministic
//! unit tests next to the engine and the peer table; these tests cover
//! the socket plumbing end to end.

use {
    omesh_consensus_om::OmConfig,
    omesh_gossip_net::GossipConfig,
    omesh_node::node::{Node, NodeConfig},
    std::{
        net::{IpAddr, Ipv4Addr, SocketAddr},
        time::Duration,
    },
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::{
            tcp::{OwnedReadHalf, OwnedWriteHalf},
            TcpStream, UdpSocket,
        },
        time::{sleep, timeout},
    },
};

fn dev_config() -> NodeConfig {
    NodeConfig {
        om: OmConfig::dev_default(),
        gossip: GossipConfig::dev_default(),
        bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        udp_port: 0,
        advertise_host: None,
        bootstrap: Vec::new(),
        lie_percent: 0,
    }
}

/// Bind a node, hand its loop to the runtime, and return its endpoints.
async fn spawn_node(config: NodeConfig) -> (SocketAddr, SocketAddr) {
    let node = Node::bind(config).await.expect("node binds on loopback");
    let endpoints = (node.udp_addr(), node.cli_addr());
    tokio::spawn(node.run());
    endpoints
}

struct CliClient {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl CliClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("CLI connects");
        let (read_half, writer) = stream.into_split();
        let mut client = Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        };
        let welcome = client.read_line().await;
        assert!(welcome.contains("omesh CLI"), "unexpected banner: {welcome}");
        client
    }

    async fn read_line(&mut self) -> String {
        timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for CLI output")
            .expect("CLI read failed")
            .expect("CLI connection closed early")
    }

    async fn send(&mut self, command: &str) {
        self.writer
            .write_all(format!("{command}\n").as_bytes())
            .await
            .expect("CLI write failed");
    }

    /// Send a command and collect a known number of reply lines.
    async fn command(&mut self, command: &str, reply_lines: usize) -> Vec<String> {
        self.send(command).await;
        let mut lines = Vec::with_capacity(reply_lines);
        for _ in 0..reply_lines {
            lines.push(self.read_line().await);
        }
        lines
    }

    async fn assert_closed(mut self) {
        let eof = timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for CLI close");
        assert!(matches!(eof, Ok(None)), "expected session close, got {eof:?}");
    }
}

async fn wait_for_word(client: &mut CliClient, index: usize, expected: &str) {
    let want = format!("{index}: {expected}");
    for _ in 0..50 {
        let lines = client.command("current", 5).await;
        if lines[index] == want {
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }
    panic!("index {index} never became '{expected}'");
}

#[tokio::test]
async fn test_single_node_cli_surface() {
    let (udp, cli) = spawn_node(dev_config()).await;
    let mut client = CliClient::connect(cli).await;

    // Fresh database.
    let current = client.command("current", 5).await;
    assert_eq!(current[0], "0: word0");
    assert_eq!(current[4], "4: word4");

    // No gossip yet.
    assert_eq!(client.command("peers", 1).await[0], "no peers known");

    // A root with zero peers resolves immediately to its own proposal.
    let id = client.command("consensus 2 apple", 1).await.remove(0);
    assert!(
        id.starts_with(&format!("127.0.0.1:{}:", udp.port())),
        "unexpected round id: {id}"
    );
    wait_for_word(&mut client, 2, "apple").await;

    // Command surface errors.
    assert_eq!(
        client.command("consensus 5 foo", 1).await[0],
        "error: index 5 out of range (0..4)"
    );
    assert_eq!(
        client.command("consensus two foo", 1).await[0],
        "error: index must be an integer"
    );
    assert_eq!(
        client.command("frobnicate", 1).await[0],
        "error: unknown command"
    );

    // Lying policy round trip.
    assert_eq!(client.command("lie", 1).await[0], "lying at 100%");
    assert_eq!(client.command("lie 30", 1).await[0], "lying at 30%");
    assert_eq!(client.command("truth", 1).await[0], "lying disabled");

    assert_eq!(client.command("exit", 1).await[0], "goodbye");
    client.assert_closed().await;
}

#[tokio::test]
async fn test_concurrent_cli_sessions() {
    let (_, cli) = spawn_node(dev_config()).await;
    let mut first = CliClient::connect(cli).await;
    let mut second = CliClient::connect(cli).await;

    first.send("current").await;
    second.send("current").await;
    for client in [&mut first, &mut second] {
        let mut lines = Vec::new();
        for _ in 0..5 {
            lines.push(client.read_line().await);
        }
        assert_eq!(lines[0], "0: word0");
    }
}

#[tokio::test]
async fn test_malformed_datagrams_do_not_stop_the_node() {
    let (udp, cli) = spawn_node(dev_config()).await;

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(b"\xff\xfe definitely not json", udp).await.unwrap();
    raw.send_to(br#"{"type":"consensus"}"#, udp).await.unwrap();
    raw.send_to(br#"{"type":"gossip","id":1}"#, udp).await.unwrap();

    // The node keeps operating: a subsequent round succeeds.
    let mut client = CliClient::connect(cli).await;
    let id = client.command("consensus 1 sky", 1).await.remove(0);
    assert!(!id.starts_with("error:"), "round rejected: {id}");
    wait_for_word(&mut client, 1, "sky").await;
}

#[tokio::test]
async fn test_two_nodes_converge() {
    let (a_udp, a_cli) = spawn_node(dev_config()).await;

    let mut b_config = dev_config();
    b_config.bootstrap = vec![format!("127.0.0.1:{}", a_udp.port())];
    let (b_udp, b_cli) = spawn_node(b_config).await;

    let mut a_client = CliClient::connect(a_cli).await;
    let mut b_client = CliClient::connect(b_cli).await;

    // A learns B from B's startup announce; B was seeded with A.
    let b_key = format!("127.0.0.1:{}", b_udp.port());
    let mut discovered = false;
    for _ in 0..50 {
        let line = a_client.command("peers", 1).await.remove(0);
        if line.starts_with(&b_key) {
            assert!(line.contains("age="), "malformed peers line: {line}");
            discovered = true;
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    assert!(discovered, "A never discovered B");

    let a_key = format!("127.0.0.1:{}", a_udp.port());
    let peers_on_b = b_client.command("peers", 1).await.remove(0);
    assert!(peers_on_b.starts_with(&a_key), "B lost its bootstrap peer");

    // Consensus started on B reaches both databases.
    let id = b_client.command("consensus 0 hello", 1).await.remove(0);
    assert!(!id.starts_with("error:"), "round rejected: {id}");
    wait_for_word(&mut b_client, 0, "hello").await;
    wait_for_word(&mut a_client, 0, "hello").await;
}
