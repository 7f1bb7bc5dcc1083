// Copyright 2024, The Kaspa AIO Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! JSON-RPC client for the node's DAG info query.

use crate::error::{BoundaryError, ErrorKind};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_QUERY_METHOD: &str = "getBlockDagInfo";

#[derive(Debug, Clone)]
pub struct NodeRpcConfig {
    pub host: String,
    pub port: u16,
    pub method: String,
    pub timeout: Duration,
}

impl Default for NodeRpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 16110,
            method: DEFAULT_QUERY_METHOD.to_string(),
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("RPC request timed out")]
    Timeout,
    #[error("RPC transport error: {0}")]
    Transport(String),
    #[error("Node returned RPC error {code}: {message}")]
    Node { code: i64, message: String },
    #[error("Unexpected RPC response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Timeout | RpcError::Transport(_))
    }
}

impl BoundaryError for RpcError {
    fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Timeout => ErrorKind::RpcTimeout,
            _ => ErrorKind::RpcError,
        }
    }
}

/// What the query method reports about the node's DAG.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDagInfo {
    pub block_count: u64,
    pub header_count: u64,
    pub is_synced: bool,
    #[serde(default)]
    pub network_name: Option<String>,
    #[serde(default)]
    pub tip_hashes: Vec<String>,
    #[serde(default)]
    pub difficulty: Option<f64>,
}

#[derive(Clone)]
pub struct NodeRpcClient {
    config: NodeRpcConfig,
    client: reqwest::Client,
}

impl NodeRpcClient {
    pub fn new(config: NodeRpcConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &NodeRpcConfig {
        &self.config
    }

    pub async fn query(&self) -> Result<BlockDagInfo, RpcError> {
        let url = format!("http://{}:{}/", self.config.host, self.config.port);
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": self.config.method,
            "params": [],
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    RpcError::Timeout
                } else {
                    RpcError::Transport(err.to_string())
                }
            })?;

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|err| RpcError::InvalidResponse(err.to_string()))?;

        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            return Err(RpcError::Node {
                code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        let result = value
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::InvalidResponse("missing result".to_string()))?;
        serde_json::from_value(result).map_err(|err| RpcError::InvalidResponse(err.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dag_info_deserializes_from_the_wire_shape() {
        let raw = json!({
            "blockCount": 1200, "headerCount": 50000, "isSynced": false,
            "networkName": "kaspa-mainnet", "tipHashes": ["aa", "bb"], "difficulty": 1.5e12,
        });
        let info: BlockDagInfo = serde_json::from_value(raw).unwrap();
        assert_eq!(info.block_count, 1200);
        assert_eq!(info.header_count, 50_000);
        assert!(!info.is_synced);
        assert_eq!(info.tip_hashes.len(), 2);
    }

    #[test]
    fn optional_fields_default() {
        let raw = json!({ "blockCount": 1, "headerCount": 1, "isSynced": true });
        let info: BlockDagInfo = serde_json::from_value(raw).unwrap();
        assert!(info.network_name.is_none());
        assert!(info.tip_hashes.is_empty());
        assert!(info.difficulty.is_none());
    }

    #[test]
    fn transient_classification() {
        assert!(RpcError::Timeout.is_transient());
        assert!(RpcError::Transport("reset".to_string()).is_transient());
        assert!(!RpcError::Node { code: -32601, message: "no method".to_string() }.is_transient());
    }
}
