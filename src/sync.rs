//! Peer fan-out and background integrity maintenance for AccessChain
//!
//! This module provides:
//! - Race-to-first-success iteration over peers (join, initial chain fetch)
//! - Gather-all concurrent fan-out (reconciliation, reliability votes, broadcasts)
//! - Fixed-delay timers that re-run chain and network reconciliation

use crate::error::ChainError;
use crate::ledger::Ledger;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Calls `call` on each peer in order and stops at the first success.
/// Failures are logged and skipped.
pub async fn first_success<'a, T, F, Fut>(peers: &'a [String], mut call: F) -> Option<(&'a str, T)>
where
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    for peer in peers {
        match call(peer.as_str()).await {
            Ok(value) => return Some((peer.as_str(), value)),
            Err(e) => warn!(peer = %peer, error = %e, "Peer call failed, trying next"),
        }
    }
    None
}

/// Calls `call` on every peer concurrently and waits for all of them.
/// Results come back in peer order.
pub async fn gather_all<'a, T, F, Fut>(peers: &'a [String], call: F) -> Vec<(&'a str, Result<T, ChainError>)>
where
    F: Fn(&'a str) -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let calls = peers.iter().map(|peer| {
        let pending = call(peer.as_str());
        async move { (peer.as_str(), pending.await) }
    });
    join_all(calls).await
}

/// Which reconciliation a timer drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityTask {
    Chain,
    Network,
}

impl IntegrityTask {
    fn name(self) -> &'static str {
        match self {
            IntegrityTask::Chain => "chain integrity",
            IntegrityTask::Network => "network integrity",
        }
    }

    async fn run(self, ledger: &Ledger) -> Result<bool, ChainError> {
        match self {
            IntegrityTask::Chain => ledger.request_chain_integrity().await,
            IntegrityTask::Network => ledger.request_network_integrity().await,
        }
    }
}

/// Re-runs `task` forever, sleeping `interval` after each run completes.
pub fn spawn_integrity_timer(ledger: Arc<Ledger>, task: IntegrityTask, interval: Duration) -> JoinHandle<()> {
    info!(task = task.name(), interval_ms = interval.as_millis() as u64, "Starting integrity timer");
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match task.run(&ledger).await {
                Ok(true) => debug!(task = task.name(), "Integrity run completed"),
                Ok(false) => warn!(task = task.name(), "Integrity run found nothing usable"),
                Err(e) => warn!(task = task.name(), error = %e, "Integrity run failed"),
            }
        }
    })
}
