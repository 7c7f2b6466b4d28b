#![forbid(unsafe_code)]

use std::net::SocketAddr;

use anyhow::Result;
use jsonrpsee::server::{RpcModule, ServerHandle};
use tracing::warn;

use crate::app::config::RpcConfig;
use crate::core::Orderbookd;

mod context;
mod error;
mod registry;
mod server;

pub mod methods;

pub use context::RpcContext;
pub use error::RpcError;
pub use registry::MethodRegistry;

pub async fn start_rpc(
    state: Orderbookd,
    addr: SocketAddr,
    rpc_cfg: &RpcConfig,
) -> Result<ServerHandle> {
    let registry = MethodRegistry::default();
    let ctx = RpcContext::new(state, registry.clone());
    let server = server::build_server(addr, rpc_cfg).await?;

    let mut root = RpcModule::new(ctx.clone());
    methods::register_all(&mut root, ctx, registry)?;

    Ok(server.start(root))
}

/// Asks the server to stop. Returns `false` when it had already stopped.
pub fn stop_rpc(handle: &ServerHandle) -> bool {
    match handle.stop() {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "JSON-RPC server already stopped");
            false
        }
    }
}
