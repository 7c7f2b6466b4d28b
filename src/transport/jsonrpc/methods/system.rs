use anyhow::Result;
use jsonrpsee::server::RpcModule;
use serde::Serialize;

use crate::transport::jsonrpc::{MethodRegistry, RpcContext, RpcError};

#[derive(Clone, Debug, Serialize)]
struct SystemInfoResponse {
    version: Option<serde_json::Value>,
    build: Option<serde_json::Value>,
    chain: String,
    uptime_secs: u64,
}

pub fn module(ctx: RpcContext, registry: MethodRegistry) -> Result<RpcModule<RpcContext>> {
    let mut m = RpcModule::new(ctx);

    registry.track("system.ping");
    m.register_method("system.ping", |_p, _ctx, _| "pong")?;

    registry.track("system.get_info");
    m.register_method("system.get_info", |_p, ctx, _| {
        Ok::<SystemInfoResponse, RpcError>(SystemInfoResponse {
            version: ctx.state.info.get("version").cloned(),
            build: ctx.state.info.get("build").cloned(),
            chain: ctx.state.chain.clone(),
            uptime_secs: ctx.state.started.elapsed().as_secs(),
        })
    })?;

    registry.track("system.help");
    m.register_method("system.help", |_p, ctx, _| ctx.methods.list())?;

    Ok(m)
}
