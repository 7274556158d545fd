#![forbid(unsafe_code)]
//! AccessChain node: serves the wire protocol, joins or founds a network and
//! keeps its chain reconciled with its peers.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use accesschain::config::{load_config, load_config_from};
use accesschain::node::{init_tracing, Node};

#[derive(Parser, Debug)]
#[command(name = "accesschain-node", version, about = "Run an AccessChain ledger node")]
struct Args {
    /// Configuration file (defaults to ./config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address advertised to peers
    #[arg(long)]
    address: Option<String>,

    /// Listen port, also used to reach peers
    #[arg(short, long)]
    port: Option<u16>,

    /// Peer to join through; omit to found a new network
    #[arg(short, long)]
    bootstrap: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(address) = args.address {
        config.network.address = address;
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if args.bootstrap.is_some() {
        config.network.bootstrap_peer = args.bootstrap;
    }

    let node = Arc::new(Node::init(config)?);
    node.start().await?;
    Ok(())
}
