#![forbid(unsafe_code)]

use std::net::SocketAddr;

use anyhow::{Context, Result};
use jsonrpsee::server::{BatchRequestConfig, Server, ServerBuilder, ServerConfig, ServerConfigBuilder};

use crate::app::config::RpcConfig;

fn server_config(rpc_cfg: &RpcConfig) -> ServerConfig {
    let mut builder = ServerConfigBuilder::new()
        .max_request_body_size(rpc_cfg.max_request_body_size)
        .max_response_body_size(rpc_cfg.max_response_body_size)
        .max_connections(rpc_cfg.max_connections)
        .max_subscriptions_per_connection(rpc_cfg.max_subscriptions_per_connection)
        .set_message_buffer_capacity(rpc_cfg.message_buffer_capacity);

    match rpc_cfg.batch_request_limit {
        Some(0) => builder = builder.set_batch_request_config(BatchRequestConfig::Disabled),
        Some(limit) => builder = builder.set_batch_request_config(BatchRequestConfig::Limit(limit)),
        None => {}
    }
    builder.build()
}

pub async fn build_server(addr: SocketAddr, rpc_cfg: &RpcConfig) -> Result<Server> {
    ServerBuilder::with_config(server_config(rpc_cfg))
        .build(addr)
        .await
        .with_context(|| format!("bind status server on {addr}"))
}
