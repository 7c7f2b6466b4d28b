#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::U64;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::chain::{ChainClient, ChainError, FilterQuery, RawLog};

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: U64,
}

/// JSON-RPC client for an EVM node. Every request is bounded by the client
/// timeout.
#[derive(Debug, Clone)]
pub struct EvmRpcClient {
    http: reqwest::Client,
    url: Url,
    next_id: Arc<AtomicU64>,
}

impl EvmRpcClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<Option<T>, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "chain rpc request");
        let response: RpcResponse<T> = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if let Some(err) = response.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result)
    }
}

impl ChainClient for EvmRpcClient {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let head: U64 = self
            .request("eth_blockNumber", serde_json::json!([]))
            .await?
            .ok_or_else(|| ChainError::Malformed("eth_blockNumber returned null".to_string()))?;
        Ok(head.to::<u64>())
    }

    async fn filter_logs(&self, query: &FilterQuery) -> Result<Vec<RawLog>, ChainError> {
        let logs: Option<Vec<RawLog>> = self
            .request("eth_getLogs", serde_json::json!([query.to_params()]))
            .await?;
        Ok(logs.unwrap_or_default())
    }

    async fn block_time(&self, block_number: u64) -> Result<i64, ChainError> {
        let block: BlockHeader = self
            .request(
                "eth_getBlockByNumber",
                serde_json::json!([format!("{block_number:#x}"), false]),
            )
            .await?
            .ok_or(ChainError::MissingBlock(block_number))?;
        i64::try_from(block.timestamp.to::<u64>())
            .map_err(|_| ChainError::Malformed(format!("timestamp of block {block_number}")))
    }
}
