#![forbid(unsafe_code)]
//! Command-line client for a running AccessChain node.

use accesschain::blockchain::{Block, Chain};
use accesschain::ledger::NodeStatus;
use accesschain::network::LookupResponse;
use clap::{Parser, Subcommand};
use colored::*;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "accesschain-cli", version, about = "Talk to an AccessChain node")]
struct Cli {
    /// Node to talk to, as host:port
    #[arg(short, long, default_value = "127.0.0.1:65006")]
    node: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a door/key grant and broadcast it
    Save { door_id: String, access_key: String },
    /// Find the block holding an access key
    LookupKey { access_key: String },
    /// Find the block holding a door id
    LookupDoor { door_id: String },
    /// Ask the network whether a door/key grant is genuine
    Verify { door_id: String, access_key: String },
    /// Reconcile the node's chain with its peers
    Integrity,
    /// Show node state, chain length and peers
    State,
    /// Print the node's chain
    Chain,
}

struct Client {
    base: String,
    http: reqwest::Client,
}

impl Client {
    fn new(node: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base: format!("http://{}", node),
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    async fn get<T: DeserializeOwned>(&self, route: &str) -> Result<T, Box<dyn std::error::Error>> {
        let response = self.http.get(format!("{}/{}", self.base, route)).send().await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, route: &str, form: &[(&str, &str)]) -> Result<T, Box<dyn std::error::Error>> {
        let response = self.http.post(format!("{}/{}", self.base, route)).form(form).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Box<dyn std::error::Error>> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(format!("node answered {}: {}", status, body).into());
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn print_block(block: &Block) {
    println!("{} {}", "Block".bright_cyan().bold(), block.block_number.to_string().bold());
    println!("  {:<12} {}", "kind:".dimmed(), block.transaction.kind());
    println!("  {:<12} {}", "timestamp:".dimmed(), block.timestamp);
    println!("  {:<12} {}", "submitter:".dimmed(), block.submitter_key_fingerprint);
}

fn print_lookup(result: LookupResponse) {
    match result {
        LookupResponse::Found(block) => print_block(&block),
        LookupResponse::NotFound(_) => println!("{}", "Not found".yellow()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new(&cli.node, Duration::from_secs(cli.timeout))?;

    match cli.command {
        Command::Save { door_id, access_key } => {
            let block: Block = client
                .post("save-transaction", &[("doorId", door_id.as_str()), ("accessKey", access_key.as_str())])
                .await?;
            println!("{}", "Grant recorded".green().bold());
            print_block(&block);
        }
        Command::LookupKey { access_key } => {
            print_lookup(client.post("lookup-by-access-key", &[("accessKey", access_key.as_str())]).await?);
        }
        Command::LookupDoor { door_id } => {
            print_lookup(client.post("lookup-by-door-id", &[("doorId", door_id.as_str())]).await?);
        }
        Command::Verify { door_id, access_key } => {
            let genuine: bool = client
                .post(
                    "request-reliability-verification",
                    &[("doorId", door_id.as_str()), ("accessKey", access_key.as_str())],
                )
                .await?;
            if genuine {
                println!("{}", "Genuine: the network majority holds this grant".green().bold());
            } else {
                println!("{}", "Rejected: the network majority does not hold this grant".red().bold());
            }
        }
        Command::Integrity => {
            let ok: bool = client.get("request-chain-integrity").await?;
            if ok {
                println!("{}", "Chain reconciled".green());
            } else {
                println!("{}", "No valid chain found; local chain kept".yellow());
            }
        }
        Command::State => {
            let status: NodeStatus = client.get("node-state").await?;
            println!("{} {}", "Node".bright_cyan().bold(), status.address.bold());
            println!("  {:<8} {:?}", "state:".dimmed(), status.state);
            println!("  {:<8} {}", "blocks:".dimmed(), status.chain_length);
            println!("  {:<8} {}", "peers:".dimmed(), status.peers.len());
            for peer in &status.peers {
                println!("    - {}", peer);
            }
        }
        Command::Chain => {
            let chain: Chain = client.get("get-chain").await?;
            println!("{} {} blocks", "Chain:".bright_cyan().bold(), chain.len());
            for block in &chain {
                print_block(block);
            }
        }
    }

    Ok(())
}
