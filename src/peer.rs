//! Public key lookup against peers.
//!
//! Every candidate gets its own spawned task; each lookup is bounded by
//! the configured timeout and the results are drained in completion
//! order until every task has settled.  Failed lookups are logged and
//! contribute nothing.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{FuturesUnordered, StreamExt};
use log::{debug, error};
use serde::Deserialize;

use crate::error::PeerError;
use crate::types::{Candidate, PeerRecord};

const PUBLIC_KEY_METHOD: &str = "peer_public_key";

#[async_trait]
pub trait PeerKeySource: Send + Sync {
    /// Ask the peer at `ip` for its public key.
    async fn public_key(&self, ip: IpAddr) -> Result<String, PeerError>;
}

/// JSON-RPC 2.0 over HTTP client for the peer's RPC port.
pub struct JsonRpcPeerClient {
    client: reqwest::Client,
    port: u16,
}

impl JsonRpcPeerClient {
    pub fn new(port: u16, timeout: Duration) -> Result<Self, PeerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, port })
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[async_trait]
impl PeerKeySource for JsonRpcPeerClient {
    async fn public_key(&self, ip: IpAddr) -> Result<String, PeerError> {
        let url = format!("http://{}", SocketAddr::new(ip, self.port));
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": PUBLIC_KEY_METHOD,
        });
        let response: RpcResponse = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;
        if let Some(err) = response.error {
            return Err(PeerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response.result.ok_or(PeerError::MissingResult)
    }
}

/// Query every candidate concurrently and return the successful answers
/// in the order they completed.
pub async fn fetch_peer_keys(
    source: Arc<dyn PeerKeySource>,
    candidates: Vec<Candidate>,
    timeout: Duration,
) -> Vec<PeerRecord> {
    let mut pending: FuturesUnordered<_> = candidates
        .into_iter()
        .map(|candidate| {
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                let outcome = match tokio::time::timeout(timeout, source.public_key(candidate.ip)).await {
                    Ok(res) => res,
                    Err(_) => Err(PeerError::Timeout(timeout)),
                };
                (candidate, outcome)
            })
        })
        .collect();

    let mut records = Vec::new();
    while let Some(joined) = pending.next().await {
        match joined {
            Ok((candidate, Ok(public_key))) => {
                debug!("Peer {} ({}) answered", candidate.ip, candidate.task_id);
                records.push(PeerRecord {
                    ip: candidate.ip,
                    public_key,
                });
            }
            Ok((candidate, Err(e))) => {
                error!(
                    "Failed to request peer public key from {} (task {}): {}",
                    candidate.ip, candidate.task_id, e
                );
            }
            Err(e) => error!("Peer key lookup task panicked: {}", e),
        }
    }
    records
}
