use anyhow::Result;
use jsonrpsee::server::RpcModule;
use serde::{Deserialize, Serialize};

use crate::core::state::FloorSnapshot;
use crate::core::wheel::lock_wheel;
use crate::transport::jsonrpc::{MethodRegistry, RpcContext, RpcError};

#[derive(Debug, Deserialize)]
struct FloorPriceParams {
    collection: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WheelStatusResponse {
    pub scheduled: usize,
    pub current_index: usize,
    pub size: usize,
    pub current_bucket: usize,
}

pub fn floor_price(ctx: &RpcContext, collection: &str) -> Result<FloorSnapshot, RpcError> {
    let collection = collection.trim();
    if collection.is_empty() {
        return Err(RpcError::InvalidParams("collection must not be empty".to_string()));
    }
    ctx.state
        .floors
        .get(collection)
        .ok_or_else(|| RpcError::UnknownCollection(collection.to_lowercase()))
}

pub fn wheel_status(ctx: &RpcContext) -> WheelStatusResponse {
    let wheel = lock_wheel(&ctx.state.wheel);
    let current_index = wheel.current_index();
    WheelStatusResponse {
        scheduled: wheel.len(),
        current_index,
        size: wheel.size(),
        current_bucket: wheel.bucket_len(current_index),
    }
}

pub fn module(ctx: RpcContext, registry: MethodRegistry) -> Result<RpcModule<RpcContext>> {
    let mut m = RpcModule::new(ctx);

    registry.track("orderbook.floor_price");
    m.register_method("orderbook.floor_price", |params, ctx, _| {
        let FloorPriceParams { collection } = params
            .parse()
            .map_err(|e| RpcError::InvalidParams(e.to_string()))?;
        floor_price(&ctx, &collection)
    })?;

    registry.track("orderbook.wheel_status");
    m.register_method("orderbook.wheel_status", |_p, ctx, _| {
        Ok::<WheelStatusResponse, RpcError>(wheel_status(&ctx))
    })?;

    Ok(m)
}
