//! Run a Meridian node: listen for peers, admit transactions, mine blocks.

use clap::Parser;
use meridian::config::{self, Config};
use meridian::node::Node;
use meridian::persistence::JsonFileSink;
use tracing::info;

#[derive(Parser)]
#[command(name = "meridian-node", about = "Run a Meridian ledger node")]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Override the P2P listen port
    #[arg(long)]
    port: Option<u16>,

    /// Bootstrap peer (host:port), repeatable
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Disable mining on this node
    #[arg(long)]
    no_mine: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config: Config = config::load_config(&args.config)?;
    if let Some(port) = args.port {
        config.network.p2p_port = port;
    }
    config.network.bootstrap_peers.extend(args.peers);
    if args.no_mine {
        config.miner.enabled = false;
    }

    info!(
        port = config.network.p2p_port,
        difficulty = config.chain.difficulty,
        mining = config.miner.enabled,
        "starting meridian node"
    );

    let sink = JsonFileSink::open(&config.storage.blocks_path)?;
    let node = Node::new(config, Box::new(sink))?;
    node.run().await?;
    Ok(())
}
