#![forbid(unsafe_code)]

use crate::core::Orderbookd;

use super::registry::MethodRegistry;

#[derive(Clone)]
pub struct RpcContext {
    pub state: Orderbookd,
    pub methods: MethodRegistry,
}

impl RpcContext {
    pub fn new(state: Orderbookd, methods: MethodRegistry) -> Self {
        Self { state, methods }
    }
}
