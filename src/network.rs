//! Outbound peer calls.
//!
//! Every call a node makes to another node goes through [`PeerTransport`].
//! [`HttpTransport`] speaks the HTTP wire protocol; [`loopback::LoopbackTransport`]
//! routes calls to ledgers living in the same process.

pub mod loopback;

use crate::blockchain::Block;
use crate::error::ChainError;
use crate::registry::PeerEntry;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::time::Duration;

pub use loopback::LoopbackTransport;

/// Form body of `request-join` and `accept-join`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinForm {
    #[serde(rename = "publicAddr", default, skip_serializing_if = "Option::is_none")]
    pub public_addr: Option<String>,
    /// Joiner address sealed with the receiver's network public key.
    #[serde(rename = "privateAddrEncrypted")]
    pub private_addr_encrypted: String,
    #[serde(rename = "networkPublicKeyPEM")]
    pub network_public_key: String,
    #[serde(rename = "transactionPrivateKeyPEM")]
    pub transaction_private_key: String,
}

/// Answer to a join: the peer list, or a fault marker such as `"Decryption error"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JoinResponse {
    Peers(Vec<PeerEntry>),
    Fault(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessForm {
    #[serde(rename = "doorId")]
    pub door_id: String,
    #[serde(rename = "accessKey")]
    pub access_key: String,
}

impl AccessForm {
    pub fn new(door_id: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            door_id: door_id.into(),
            access_key: access_key.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKeyForm {
    #[serde(rename = "accessKey")]
    pub access_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorIdForm {
    #[serde(rename = "doorId")]
    pub door_id: String,
}

/// JSON body of `local-validation` and `validate-block`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEnvelope {
    pub block: Block,
}

/// Answer to a block lookup: the block, or the `-1` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LookupResponse {
    Found(Block),
    NotFound(i64),
}

impl From<Option<Block>> for LookupResponse {
    fn from(found: Option<Block>) -> Self {
        match found {
            Some(block) => LookupResponse::Found(block),
            None => LookupResponse::NotFound(crate::blockchain::NOT_FOUND),
        }
    }
}

/// Which endpoint a broadcast block is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broadcast {
    /// Membership blocks produced while accepting a join.
    LocalValidation,
    /// Every other block.
    ValidateBlock,
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Raw body of the peer's `get-chain`; its length ranks candidate chains.
    async fn fetch_chain(&self, peer: &str) -> Result<String, ChainError>;
    async fn network_identity(&self, peer: &str) -> Result<PeerEntry, ChainError>;
    async fn request_join(&self, peer: &str, form: &JoinForm) -> Result<JoinResponse, ChainError>;
    async fn accept_join(&self, peer: &str, form: &JoinForm) -> Result<JoinResponse, ChainError>;
    async fn send_block(&self, peer: &str, route: Broadcast, block: &Block) -> Result<bool, ChainError>;
    async fn verify_access_key_locally(&self, peer: &str, form: &AccessForm) -> Result<i64, ChainError>;
}

/// Peer transport over HTTP. Peers are addressed as `http://{address}:{port}/{route}`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    port: u16,
}

impl HttpTransport {
    pub fn new(port: u16, timeout: Duration) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, port })
    }

    /// An address that already names a port is used as is. Bare IPv6
    /// literals are bracketed.
    pub fn peer_url(&self, peer: &str, route: &str) -> String {
        let authority = if peer.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", peer, self.port)
        } else if peer.ends_with(']') || !peer.contains(':') {
            format!("{}:{}", peer, self.port)
        } else {
            peer.to_string()
        };
        format!("http://{}/{}", authority, route)
    }

    async fn read_text(response: Response) -> Result<String, ChainError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChainError::Transport(format!("Peer answered {}: {}", status, body)));
        }
        Ok(body)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ChainError> {
        let body = Self::read_text(response).await?;
        serde_json::from_str(&body)
            .map_err(|e| ChainError::Transport(format!("Unexpected peer response: {}", e)))
    }

    async fn get<T: DeserializeOwned>(&self, peer: &str, route: &str) -> Result<T, ChainError> {
        let response = self.client.get(self.peer_url(peer, route)).send().await?;
        Self::read_json(response).await
    }

    async fn post_form<F, T>(&self, peer: &str, route: &str, form: &F) -> Result<T, ChainError>
    where
        F: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.client.post(self.peer_url(peer, route)).form(form).send().await?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn fetch_chain(&self, peer: &str) -> Result<String, ChainError> {
        let response = self.client.get(self.peer_url(peer, "get-chain")).send().await?;
        Self::read_text(response).await
    }

    async fn network_identity(&self, peer: &str) -> Result<PeerEntry, ChainError> {
        self.get(peer, "network-identity").await
    }

    async fn request_join(&self, peer: &str, form: &JoinForm) -> Result<JoinResponse, ChainError> {
        self.post_form(peer, "request-join", form).await
    }

    async fn accept_join(&self, peer: &str, form: &JoinForm) -> Result<JoinResponse, ChainError> {
        self.post_form(peer, "accept-join", form).await
    }

    async fn send_block(&self, peer: &str, route: Broadcast, block: &Block) -> Result<bool, ChainError> {
        let route = match route {
            Broadcast::LocalValidation => "local-validation",
            Broadcast::ValidateBlock => "validate-block",
        };
        let envelope = BlockEnvelope { block: block.clone() };
        let response = self.client.post(self.peer_url(peer, route)).json(&envelope).send().await?;
        Self::read_json(response).await
    }

    async fn verify_access_key_locally(&self, peer: &str, form: &AccessForm) -> Result<i64, ChainError> {
        self.post_form(peer, "verify-access-key-locally", form).await
    }
}
