use anyhow::Result;
use jsonrpsee::server::RpcModule;
use serde::Serialize;

use crate::transport::jsonrpc::{MethodRegistry, RpcContext, RpcError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexerStatusResponse {
    pub chain: String,
    pub last_indexed_block: u64,
    pub chain_head: u64,
    /// Blocks between the checkpoint and the last head seen.
    pub lag_blocks: u64,
}

pub fn status(ctx: &RpcContext) -> IndexerStatusResponse {
    let indexer = &ctx.state.indexer;
    let last_indexed_block = indexer.last_indexed();
    let chain_head = indexer.chain_head();
    IndexerStatusResponse {
        chain: ctx.state.chain.clone(),
        last_indexed_block,
        chain_head,
        lag_blocks: chain_head.saturating_sub(last_indexed_block),
    }
}

pub fn module(ctx: RpcContext, registry: MethodRegistry) -> Result<RpcModule<RpcContext>> {
    let mut m = RpcModule::new(ctx);

    registry.track("indexer.status");
    m.register_method("indexer.status", |_p, ctx, _| {
        Ok::<IndexerStatusResponse, RpcError>(status(&ctx))
    })?;

    Ok(m)
}
