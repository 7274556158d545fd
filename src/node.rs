//! Node orchestration: wires configuration, key material, storage, transport,
//! the HTTP server and the integrity timers into one running process.

use crate::config::Config;
use crate::error::ChainError;
use crate::keys::NodeIdentity;
use crate::ledger::{Ledger, NodeState};
use crate::network::HttpTransport;
use crate::persistence::JsonFileStore;
use crate::sync::{spawn_integrity_timer, IntegrityTask};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed when embedded in another binary.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub struct Node {
    pub config: Config,
    pub ledger: Arc<Ledger>,
}

impl Node {
    pub fn init(config: Config) -> Result<Self, ChainError> {
        config.validate()?;
        info!(address = %config.network.address, port = config.network.port, "Starting AccessChain node");

        let identity = NodeIdentity::load_or_generate(
            config.network.address.clone(),
            Path::new(&config.storage.keys_dir),
        )?;
        let store = Arc::new(JsonFileStore::open(&config.storage.data_dir)?);
        let transport = Arc::new(HttpTransport::new(config.network.port, config.request_timeout())?);

        let ledger = Arc::new(Ledger::new(identity, store, transport));
        ledger.boot()?;

        Ok(Self { config, ledger })
    }

    pub async fn start(self: Arc<Self>) -> Result<(), ChainError> {
        // 1) Serve the wire protocol before talking to anyone
        let api_task = self.clone().spawn_api();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // 2) Found or join a network when we have no chain yet
        if self.ledger.state() == NodeState::AwaitingGenesisOrJoin {
            let directory = self.config.network.bootstrap_peer.as_deref();
            let outcome = self.ledger.join_network(directory).await?;
            info!(outcome = ?outcome, "Network membership established");
        }

        // 3) Keep chain and peer list reconciled
        let block_timer = spawn_integrity_timer(
            self.ledger.clone(),
            IntegrityTask::Chain,
            self.config.block_integrity_interval(),
        );
        let network_timer = spawn_integrity_timer(
            self.ledger.clone(),
            IntegrityTask::Network,
            self.config.network_integrity_interval(),
        );

        tokio::select! {
            result = api_task => {
                match result {
                    Ok(Err(e)) => error!(error = %e, "API server failed"),
                    Err(e) => error!(error = %e, "API task aborted"),
                    Ok(Ok(())) => warn!("API server stopped"),
                }
            }
            _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
        }

        block_timer.abort();
        network_timer.abort();
        Ok(())
    }

    #[cfg(feature = "api")]
    fn spawn_api(self: Arc<Self>) -> tokio::task::JoinHandle<Result<(), ChainError>> {
        let port = self.config.network.port;
        tokio::spawn(async move { crate::api::run_api_server(self.ledger.clone(), port).await })
    }

    #[cfg(not(feature = "api"))]
    fn spawn_api(self: Arc<Self>) -> tokio::task::JoinHandle<Result<(), ChainError>> {
        drop(self);
        tokio::spawn(async { Err(ChainError::Config("API feature not enabled in this build".to_string())) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_keys_and_awaits_join() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("files").display().to_string();
        config.storage.keys_dir = dir.path().join("keys").display().to_string();

        let node = Node::init(config).unwrap();
        assert_eq!(node.ledger.state(), NodeState::AwaitingGenesisOrJoin);
        assert!(dir.path().join("keys/transaction/public.pem").exists());
        assert!(dir.path().join("files").is_dir());
    }
}
