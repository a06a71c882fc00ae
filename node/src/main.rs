//! omesh node entrypoint.

use {
    clap::Parser,
    log::error,
    omesh_consensus_om::OmConfig,
    omesh_gossip_net::{message::parse_host_port, GossipConfig},
    omesh_node::node::{Node, NodeConfig},
    std::net::IpAddr,
};

/// Gossip-mesh Oral Messages consensus node.
#[derive(Parser, Debug)]
#[command(name = "omesh-node", version, about)]
struct Args {
    /// UDP peer port (0 = OS assigned).
    #[arg(default_value_t = 0)]
    port: u16,

    /// Bootstrap peer as host:port; repeatable.
    #[arg(short = 'p', long = "peer")]
    peers: Vec<String>,

    /// IP to bind the sockets on.
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Host advertised in gossip (defaults to the bound address, or
    /// 127.0.0.1 when bound to the wildcard).
    #[arg(long)]
    host: Option<String>,

    /// Initial lying percentage.
    #[arg(long, default_value_t = 0)]
    lie: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let om = OmConfig::default();
    if let Err(e) = om.validate() {
        error!("invalid consensus config: {e}");
        std::process::exit(1);
    }
    for peer in &args.peers {
        if let Err(e) = parse_host_port(peer) {
            error!("invalid bootstrap peer '{peer}': {e}");
            std::process::exit(1);
        }
    }

    let config = NodeConfig {
        om,
        gossip: GossipConfig::default(),
        bind_ip: args.bind,
        udp_port: args.port,
        advertise_host: args.host,
        bootstrap: args.peers,
        lie_percent: args.lie,
    };

    let node = match Node::bind(config).await {
        Ok(node) => node,
        Err(e) => {
            error!("failed to start node: {e}");
            std::process::exit(1);
        }
    };
    node.run().await;
}
