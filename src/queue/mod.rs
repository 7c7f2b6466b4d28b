#![forbid(unsafe_code)]

use std::future::Future;

use serde::Serialize;
use thiserror::Error;

use crate::core::model::{ListingInfo, TradeEvent};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgQueue;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// At-least-once FIFO per key.
pub trait DurableQueue: Clone + Send + Sync + 'static {
    fn push(&self, key: &str, payload: String) -> impl Future<Output = Result<(), QueueError>> + Send;

    fn pop(&self, key: &str) -> impl Future<Output = Result<Option<String>, QueueError>> + Send;
}

pub fn orders_key(chain: &str) -> String {
    format!("cache:es:orders:{chain}")
}

pub fn trade_events_key(chain: &str) -> String {
    format!("cache:es:trade_events:{chain}")
}

async fn push_json<Q: DurableQueue, T: Serialize + Sync>(
    queue: &Q,
    key: &str,
    message: &T,
) -> Result<(), QueueError> {
    let payload = serde_json::to_string(message)?;
    queue.push(key, payload).await
}

pub async fn push_listing<Q: DurableQueue>(
    queue: &Q,
    chain: &str,
    listing: &ListingInfo,
) -> Result<(), QueueError> {
    push_json(queue, &orders_key(chain), listing).await
}

pub async fn push_trade_event<Q: DurableQueue>(
    queue: &Q,
    chain: &str,
    event: &TradeEvent,
) -> Result<(), QueueError> {
    push_json(queue, &trade_events_key(chain), event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::TradeEventType;
    use crate::queue::memory::MemoryQueue;

    #[test]
    fn keys_are_scoped_per_chain() {
        assert_eq!(orders_key("eth"), "cache:es:orders:eth");
        assert_eq!(trade_events_key("base"), "cache:es:trade_events:base");
    }

    #[tokio::test]
    async fn trade_events_are_pushed_as_json() {
        let queue = MemoryQueue::default();
        let event = TradeEvent::new(TradeEventType::Cancel, "0xc").order("0x01");
        push_trade_event(&queue, "eth", &event).await.expect("push");
        let raw = queue
            .pop(&trade_events_key("eth"))
            .await
            .expect("pop")
            .expect("message");
        let back: TradeEvent = serde_json::from_str(&raw).expect("decode");
        assert_eq!(back, event);
        assert!(queue.pop(&trade_events_key("eth")).await.expect("pop").is_none());
    }
}
