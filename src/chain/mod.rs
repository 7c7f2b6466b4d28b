#![forbid(unsafe_code)]

use std::future::Future;

use alloy_primitives::{Address, B256, Bytes, U64};
use serde::Deserialize;
use thiserror::Error;

pub mod events;
pub mod evm;

pub use evm::EvmRpcClient;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("block {0} not found")]
    MissingBlock(u64),
}

/// Logs from `addresses` in `[from_block, to_block]` whose first topic is any
/// of `topics` (all topics when empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterQuery {
    pub from_block: u64,
    pub to_block: u64,
    pub addresses: Vec<Address>,
    pub topics: Vec<B256>,
}

impl FilterQuery {
    pub fn to_params(&self) -> serde_json::Value {
        let mut filter = serde_json::json!({
            "fromBlock": format!("{:#x}", self.from_block),
            "toBlock": format!("{:#x}", self.to_block),
            "address": self.addresses,
        });
        if !self.topics.is_empty() {
            filter["topics"] = serde_json::json!([self.topics]);
        }
        filter
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: U64,
    pub transaction_hash: B256,
    pub log_index: U64,
    #[serde(default)]
    pub removed: bool,
}

impl RawLog {
    pub fn block(&self) -> u64 {
        self.block_number.to::<u64>()
    }

    pub fn index(&self) -> u64 {
        self.log_index.to::<u64>()
    }
}

pub trait ChainClient: Clone + Send + Sync + 'static {
    fn block_number(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;

    fn filter_logs(
        &self,
        query: &FilterQuery,
    ) -> impl Future<Output = Result<Vec<RawLog>, ChainError>> + Send;

    /// Unix seconds of the block's timestamp.
    fn block_time(&self, block_number: u64) -> impl Future<Output = Result<i64, ChainError>> + Send;
}
