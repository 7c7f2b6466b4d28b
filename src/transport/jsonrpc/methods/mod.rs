#![forbid(unsafe_code)]

use anyhow::Result;
use jsonrpsee::server::RpcModule;

use crate::transport::jsonrpc::{MethodRegistry, RpcContext};

pub mod indexer;
pub mod orderbook;
pub mod system;

pub fn register_all(
    root: &mut RpcModule<RpcContext>,
    ctx: RpcContext,
    registry: MethodRegistry,
) -> Result<()> {
    root.merge(system::module(ctx.clone(), registry.clone())?)?;
    root.merge(indexer::module(ctx.clone(), registry.clone())?)?;
    root.merge(orderbook::module(ctx, registry)?)?;
    Ok(())
}
