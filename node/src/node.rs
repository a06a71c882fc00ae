//! The node orchestrator.
//!
//! Owns the UDP transport, the CLI listener, and every piece of mutable
//! state: peer table, gossip engine, OM engine, and word store.  A single
//! event loop multiplexes inbound datagrams, CLI requests, and a 1 s tick
//! that drives heartbeats, peer pruning, and the consensus sweep.  A
//! failing handler is logged and the loop carries on; nothing short of
//! process death stops it.

use {
    crate::{
        cli::{self, CliCommand, CliReply, CliRequest},
        store::WordStore,
    },
    log::{debug, error, info, warn},
    omesh_consensus_om::{
        EngineOutput, LyingPolicy, OmConfig, OmEngine, PeerKey,
    },
    omesh_gossip_net::{
        message::{parse_host_port, peer_key, resolve_peer},
        GossipConfig, GossipEngine, InboundDatagram, PeerTable, Result, UdpTransport, WireMessage,
    },
    rand::{rngs::StdRng, SeedableRng},
    std::{
        net::{IpAddr, Ipv4Addr, SocketAddr},
        time::{Duration, Instant},
    },
    tokio::{net::TcpListener, sync::mpsc, time},
};

/// Buffer for the CLI request channel.
const CLI_CHANNEL_BUFFER: usize = 64;

/// Everything needed to start a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub om: OmConfig,
    pub gossip: GossipConfig,
    /// Local IP to bind both sockets on.
    pub bind_ip: IpAddr,
    /// UDP peer port; 0 asks the OS.
    pub udp_port: u16,
    /// Host advertised in gossip.  Defaults to the bound address, or
    /// loopback when bound to the wildcard.
    pub advertise_host: Option<String>,
    /// Bootstrap peers as `host:port`, seeded into the table on start.
    pub bootstrap: Vec<String>,
    /// Initial lying percentage.
    pub lie_percent: u8,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            om: OmConfig::default(),
            gossip: GossipConfig::default(),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            udp_port: 0,
            advertise_host: None,
            bootstrap: Vec::new(),
            lie_percent: 0,
        }
    }
}

/// A bound, not-yet-running node.
pub struct Node {
    transport: UdpTransport,
    inbound: mpsc::Receiver<InboundDatagram>,
    cli_listener: TcpListener,
    cli_addr: SocketAddr,
    state: NodeState,
    bootstrap: Vec<String>,
    heartbeat_interval: Duration,
    prune_check: Duration,
}

/// The mutable state owned by the event loop.
struct NodeState {
    identity: PeerKey,
    peer_table: PeerTable,
    gossip: GossipEngine,
    engine: OmEngine,
    store: WordStore,
    rng: StdRng,
    fanout: usize,
}

impl Node {
    /// Bind the UDP and CLI sockets and assemble the node.
    pub async fn bind(config: NodeConfig) -> Result<Self> {
        let transport = UdpTransport::bind(
            SocketAddr::new(config.bind_ip, config.udp_port),
            config.gossip.max_datagram_size,
        )
        .await?;
        let udp_addr = transport.local_addr();

        let host = match &config.advertise_host {
            Some(host) => host.clone(),
            None if udp_addr.ip().is_unspecified() => Ipv4Addr::LOCALHOST.to_string(),
            None => udp_addr.ip().to_string(),
        };
        let identity: PeerKey = format!("{host}:{}", udp_addr.port());

        let cli_listener = TcpListener::bind(SocketAddr::new(config.bind_ip, 0)).await?;
        let cli_addr = cli_listener.local_addr()?;
        info!("peer {identity} listening on UDP {udp_addr}");
        info!("CLI listening on TCP {cli_addr}");

        let inbound = transport.start_receive(config.gossip.channel_buffer_size);

        let mut engine = OmEngine::new(config.om.clone(), identity.clone());
        engine.set_policy(LyingPolicy::new(config.lie_percent));

        let state = NodeState {
            identity,
            peer_table: PeerTable::new(config.gossip.prune_horizon()),
            gossip: GossipEngine::new(
                host,
                udp_addr.port(),
                config.gossip.fanout,
                config.gossip.seen_cache_size,
            ),
            engine,
            store: WordStore::new(),
            rng: StdRng::from_entropy(),
            fanout: config.gossip.fanout,
        };

        Ok(Self {
            transport,
            inbound,
            cli_listener,
            cli_addr,
            state,
            bootstrap: config.bootstrap,
            heartbeat_interval: config.gossip.heartbeat_interval(),
            prune_check: Duration::from_secs(config.gossip.prune_check_secs),
        })
    }

    /// The bound UDP endpoint.
    pub fn udp_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// The bound CLI endpoint.
    pub fn cli_addr(&self) -> SocketAddr {
        self.cli_addr
    }

    /// Run the event loop.  Only a closed inbound channel (the socket
    /// task dying) ends it.
    pub async fn run(self) {
        let Node {
            transport,
            mut inbound,
            cli_listener,
            cli_addr: _,
            mut state,
            bootstrap,
            heartbeat_interval,
            prune_check,
        } = self;

        state.announce(&bootstrap, &transport).await;

        let (cli_tx, mut cli_rx) = mpsc::channel::<CliRequest>(CLI_CHANNEL_BUFFER);
        cli::spawn(cli_listener, cli_tx);

        let mut tick = time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut last_heartbeat = Instant::now();
        let mut last_prune = Instant::now();

        loop {
            tokio::select! {
                maybe = inbound.recv() => match maybe {
                    Some(datagram) => state.handle_datagram(datagram, &transport).await,
                    None => {
                        error!("inbound datagram channel closed; stopping node loop");
                        break;
                    }
                },
                Some(request) = cli_rx.recv() => {
                    state.handle_cli(request, &transport).await;
                }
                _ = tick.tick() => {
                    state
                        .tick(
                            &transport,
                            heartbeat_interval,
                            prune_check,
                            &mut last_heartbeat,
                            &mut last_prune,
                        )
                        .await;
                }
            }
        }
    }
}

impl NodeState {
    /// Seed the peer table from the bootstrap list and announce ourselves
    /// to every entry.
    async fn announce(&mut self, bootstrap: &[String], transport: &UdpTransport) {
        let now = Instant::now();
        let mut targets = Vec::new();
        for entry in bootstrap {
            let addr = parse_host_port(entry)
                .and_then(|(host, port)| resolve_peer(&host, port));
            match addr {
                Ok(addr) if peer_key(&addr) != self.identity => {
                    self.peer_table.observe(addr, now);
                    targets.push(addr);
                }
                Ok(_) => debug!("skipping self in bootstrap list"),
                Err(e) => warn!("ignoring bootstrap peer '{entry}': {e}"),
            }
        }
        if !targets.is_empty() {
            let heartbeat = self.gossip.make_heartbeat(&mut self.rng);
            transport.broadcast(&heartbeat, &targets).await;
            info!("announced to {} bootstrap peers", targets.len());
        }
    }

    async fn handle_datagram(&mut self, datagram: InboundDatagram, transport: &UdpTransport) {
        let now = Instant::now();
        match datagram.message {
            WireMessage::Gossip(gossip) => {
                let forwards =
                    self.gossip
                        .on_gossip(gossip, datagram.from, &mut self.peer_table, now, &mut self.rng);
                for (addr, message) in forwards {
                    if let Err(e) = transport.send(&message, addr).await {
                        warn!("gossip forward to {addr} failed: {e}");
                    }
                }
            }
            WireMessage::Consensus(message) => {
                let sender = peer_key(&datagram.from);
                let peers = self.peer_table.keys();
                let output = self.engine.handle_message(message, &sender, &peers, now);
                self.apply(output, transport).await;
            }
        }
    }

    /// Ship engine output: word writes into the store, messages onto the
    /// wire.  Report targets may already have been pruned from the table;
    /// their keys still parse back into an address.
    async fn apply(&mut self, output: EngineOutput, transport: &UdpTransport) {
        for write in output.writes {
            self.store.set(write.index, write.value);
        }
        for (peer, message) in output.outbound {
            let addr = self.peer_table.addr_of(&peer).or_else(|| {
                parse_host_port(&peer)
                    .and_then(|(host, port)| resolve_peer(&host, port))
                    .ok()
            });
            let Some(addr) = addr else {
                warn!("no address for peer {peer}; dropping {}", message.kind());
                continue;
            };
            if let Err(e) = transport
                .send(&WireMessage::Consensus(message), addr)
                .await
            {
                warn!("consensus send to {peer} failed: {e}");
            }
        }
    }

    async fn handle_cli(&mut self, request: CliRequest, transport: &UdpTransport) {
        let (text, close) = self.execute(&request.line, transport).await;
        // A dropped receiver just means the session died first.
        let _ = request.reply.send(CliReply { text, close });
    }

    async fn execute(&mut self, line: &str, transport: &UdpTransport) -> (String, bool) {
        let command = match cli::parse_command(line) {
            Ok(command) => command,
            Err(reason) => return (format!("error: {reason}"), false),
        };
        let now = Instant::now();
        match command {
            CliCommand::Peers => {
                let snapshot = self.peer_table.snapshot(now);
                if snapshot.is_empty() {
                    return ("no peers known".to_string(), false);
                }
                let lines: Vec<String> = snapshot
                    .iter()
                    .map(|(key, age)| format!("{key}  age={}s", age.as_secs()))
                    .collect();
                (lines.join("\n"), false)
            }
            CliCommand::Current => (self.store.lines().join("\n"), false),
            CliCommand::Consensus { index, word } => {
                let peers = self.peer_table.keys();
                match self.engine.start_root(index, &word, &peers, now) {
                    Ok((id, output)) => {
                        self.apply(output, transport).await;
                        (id, false)
                    }
                    Err(e) => (format!("error: {e}"), false),
                }
            }
            CliCommand::Lie(percent) => {
                self.engine.set_policy(LyingPolicy::new(percent));
                (format!("lying at {percent}%"), false)
            }
            CliCommand::Truth => {
                self.engine.set_policy(LyingPolicy::truthful());
                ("lying disabled".to_string(), false)
            }
            CliCommand::Exit => ("goodbye".to_string(), true),
        }
    }

    async fn tick(
        &mut self,
        transport: &UdpTransport,
        heartbeat_interval: Duration,
        prune_check: Duration,
        last_heartbeat: &mut Instant,
        last_prune: &mut Instant,
    ) {
        let now = Instant::now();

        if now.duration_since(*last_heartbeat) >= heartbeat_interval {
            *last_heartbeat = now;
            let heartbeat = self.gossip.make_heartbeat(&mut self.rng);
            let targets: Vec<SocketAddr> = self
                .peer_table
                .random_subset(self.fanout, |_| false, &mut self.rng)
                .into_iter()
                .map(|(_, addr)| addr)
                .collect();
            if !targets.is_empty() {
                transport.broadcast(&heartbeat, &targets).await;
            }
        }

        if now.duration_since(*last_prune) >= prune_check {
            *last_prune = now;
            self.peer_table.prune(now);
        }

        let swept = self.engine.sweep(now);
        self.apply(swept, transport).await;
    }
}
