use jsonrpsee::types::{ErrorObject, ErrorObjectOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("no floor price known for collection {0}")]
    UnknownCollection(String),
    #[error("{0}")]
    Other(String),
}

impl From<RpcError> for ErrorObjectOwned {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::InvalidParams(msg) => ErrorObject::owned(-32602, msg, None::<()>),
            RpcError::UnknownCollection(collection) => ErrorObject::owned(
                -32004,
                format!("no floor price known for collection {collection}"),
                None::<()>,
            ),
            other => ErrorObject::owned(-32000, other.to_string(), None::<()>),
        }
    }
}
