use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::model::ZERO_ADDRESS;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rpc_timeout_secs() -> u64 {
    10
}

fn default_eth_address() -> String {
    ZERO_ADDRESS.to_string()
}

fn default_batch_size() -> u64 {
    10
}

fn default_sleep_interval_secs() -> u64 {
    10
}

fn default_index_type() -> i32 {
    6
}

fn default_project() -> String {
    "easyswap".to_string()
}

fn default_price_index_max_len() -> usize {
    100
}

fn default_expiry_workers() -> usize {
    8
}

fn default_expiry_queue_capacity() -> usize {
    10_000
}

fn default_floor_sweep_interval_secs() -> u64 {
    10
}

fn default_floor_retention_secs() -> u64 {
    7 * 24 * 3600
}

fn default_retention_sweep_interval_secs() -> u64 {
    24 * 3600
}

fn default_listing_dedup_ttl_secs() -> u64 {
    600
}

fn default_queue_poll_interval_ms() -> u64 {
    1000
}

fn default_min_pool_size() -> u32 {
    2
}

fn default_max_pool_size() -> u32 {
    16
}

fn default_acquire_timeout_seconds() -> u64 {
    30
}

fn default_max_lifetime_seconds() -> u64 {
    1800
}

fn default_statement_timeout_ms() -> u64 {
    30_000
}

fn default_rpc_addr() -> String {
    "127.0.0.1:7070".to_string()
}

fn default_max_request_body_size() -> u32 {
    10 * 1024 * 1024
}

fn default_max_response_body_size() -> u32 {
    10 * 1024 * 1024
}

fn default_max_connections() -> u32 {
    100
}

fn default_max_subscriptions_per_connection() -> u32 {
    1024
}

fn default_message_buffer_capacity() -> u32 {
    1024
}

/// Blocks kept behind the head before a block is indexed.
pub fn confirmation_lag_for(chain: &str) -> u64 {
    match chain {
        "optimism" | "arbitrum" | "base" | "zksync-era" => 2,
        _ => 1,
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub id: i64,
    pub rpc_url: String,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    #[serde(default)]
    pub confirmation_lag: Option<u64>,
}

impl ChainConfig {
    pub fn confirmation_lag(&self) -> u64 {
        self.confirmation_lag
            .unwrap_or_else(|| confirmation_lag_for(&self.name))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ContractConfig {
    pub dex_address: String,
    #[serde(default = "default_eth_address")]
    pub eth_address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IndexerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_sleep_interval_secs")]
    pub sleep_interval_secs: u64,
    #[serde(default = "default_index_type")]
    pub index_type: i32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            sleep_interval_secs: default_sleep_interval_secs(),
            index_type: default_index_type(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderManagerConfig {
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default)]
    pub exact_floor_price: bool,
    #[serde(default = "default_price_index_max_len")]
    pub price_index_max_len: usize,
    #[serde(default = "default_expiry_workers")]
    pub expiry_workers: usize,
    #[serde(default = "default_expiry_queue_capacity")]
    pub expiry_queue_capacity: usize,
    #[serde(default = "default_floor_sweep_interval_secs")]
    pub floor_sweep_interval_secs: u64,
    #[serde(default = "default_floor_retention_secs")]
    pub floor_retention_secs: u64,
    #[serde(default = "default_retention_sweep_interval_secs")]
    pub retention_sweep_interval_secs: u64,
    #[serde(default = "default_listing_dedup_ttl_secs")]
    pub listing_dedup_ttl_secs: u64,
    #[serde(default = "default_queue_poll_interval_ms")]
    pub queue_poll_interval_ms: u64,
}

impl Default for OrderManagerConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            exact_floor_price: false,
            price_index_max_len: default_price_index_max_len(),
            expiry_workers: default_expiry_workers(),
            expiry_queue_capacity: default_expiry_queue_capacity(),
            floor_sweep_interval_secs: default_floor_sweep_interval_secs(),
            floor_retention_secs: default_floor_retention_secs(),
            retention_sweep_interval_secs: default_retention_sweep_interval_secs(),
            listing_dedup_ttl_secs: default_listing_dedup_ttl_secs(),
            queue_poll_interval_ms: default_queue_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: u32,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "default_max_lifetime_seconds")]
    pub max_lifetime_seconds: u64,
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            min_pool_size: default_min_pool_size(),
            max_pool_size: default_max_pool_size(),
            acquire_timeout_seconds: default_acquire_timeout_seconds(),
            max_lifetime_seconds: default_max_lifetime_seconds(),
            statement_timeout_ms: default_statement_timeout_ms(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_addr")]
    pub addr: String,
    #[serde(default = "default_max_request_body_size")]
    pub max_request_body_size: u32,
    #[serde(default = "default_max_response_body_size")]
    pub max_response_body_size: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_max_subscriptions_per_connection")]
    pub max_subscriptions_per_connection: u32,
    #[serde(default = "default_message_buffer_capacity")]
    pub message_buffer_capacity: u32,
    #[serde(default)]
    pub batch_request_limit: Option<u32>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            addr: default_rpc_addr(),
            max_request_body_size: default_max_request_body_size(),
            max_response_body_size: default_max_response_body_size(),
            max_connections: default_max_connections(),
            max_subscriptions_per_connection: default_max_subscriptions_per_connection(),
            message_buffer_capacity: default_message_buffer_capacity(),
            batch_request_limit: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub service: ServiceConfig,
    pub chain: ChainConfig,
    pub contract: ContractConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub order_manager: OrderManagerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let settings = Self::from_toml(&raw, std::env::var("DATABASE_URL").ok())
            .with_context(|| format!("parse config file {}", path.display()))?;
        Ok(settings)
    }

    /// Parses and validates; `env_database_url` fills a missing
    /// `[database] url`.
    pub fn from_toml(raw: &str, env_database_url: Option<String>) -> Result<Self> {
        let mut settings: Settings = toml::from_str(raw)?;
        if settings.database.url.as_deref().is_none_or(str::is_empty) {
            settings.database.url = env_database_url;
        }
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        self.database_url()?;
        self.rpc_url()?;
        self.dex_address()?;
        if self.chain.name.trim().is_empty() {
            bail!("chain.name must not be empty");
        }
        if self.indexer.batch_size == 0 {
            bail!("indexer.batch_size must be positive");
        }
        Ok(())
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("database.url is not set and DATABASE_URL is empty"))
    }

    pub fn rpc_url(&self) -> Result<Url> {
        Url::parse(&self.chain.rpc_url)
            .with_context(|| format!("invalid chain.rpc_url {}", self.chain.rpc_url))
    }

    pub fn dex_address(&self) -> Result<Address> {
        self.contract
            .dex_address
            .parse()
            .with_context(|| format!("invalid contract.dex_address {}", self.contract.dex_address))
    }

    /// Currency recorded on orders and activities, lowercase hex.
    pub fn currency_address(&self) -> String {
        self.contract.eth_address.to_lowercase()
    }
}
