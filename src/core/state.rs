use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;

use crate::core::model::FloorPrice;
use crate::core::wheel::SharedWheel;

/// Progress counters the indexer publishes for the status API.
#[derive(Debug, Clone, Default)]
pub struct IndexerStatus {
    last_indexed: Arc<AtomicU64>,
    chain_head: Arc<AtomicU64>,
}

impl IndexerStatus {
    pub fn record_checkpoint(&self, block: u64) {
        self.last_indexed.fetch_max(block, Ordering::Relaxed);
    }

    pub fn record_head(&self, head: u64) {
        self.chain_head.store(head, Ordering::Relaxed);
    }

    pub fn last_indexed(&self) -> u64 {
        self.last_indexed.load(Ordering::Relaxed)
    }

    pub fn chain_head(&self) -> u64 {
        self.chain_head.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorSource {
    Incremental,
    Sweep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FloorSnapshot {
    #[serde(flatten)]
    pub floor: FloorPrice,
    pub source: FloorSource,
}

/// Latest known floor per collection. The periodic sweep overwrites whatever
/// the incremental index published.
#[derive(Debug, Clone, Default)]
pub struct FloorBoard {
    inner: Arc<DashMap<String, FloorSnapshot>>,
}

impl FloorBoard {
    pub fn publish(&self, floor: FloorPrice, source: FloorSource) {
        let key = floor.collection_address.to_lowercase();
        self.inner.insert(key, FloorSnapshot { floor, source });
    }

    pub fn get(&self, collection: &str) -> Option<FloorSnapshot> {
        self.inner
            .get(&collection.to_lowercase())
            .map(|entry| entry.value().clone())
    }

    pub fn clear(&self, collection: &str) {
        self.inner.remove(&collection.to_lowercase());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[derive(Clone)]
pub struct Orderbookd {
    pub(crate) started: Instant,
    pub info: serde_json::Value,
    pub chain: String,
    pub indexer: IndexerStatus,
    pub floors: FloorBoard,
    pub wheel: SharedWheel,
}

impl Orderbookd {
    pub fn new(
        chain: impl Into<String>,
        indexer: IndexerStatus,
        floors: FloorBoard,
        wheel: SharedWheel,
    ) -> Self {
        let info = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "build": option_env!("GIT_HASH").unwrap_or("unknown"),
        });

        Self {
            started: Instant::now(),
            info,
            chain: chain.into(),
            indexer,
            floors,
            wheel,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn checkpoint_counter_never_moves_backwards() {
        let status = IndexerStatus::default();
        status.record_checkpoint(120);
        status.record_checkpoint(80);
        assert_eq!(status.last_indexed(), 120);
    }

    #[test]
    fn floor_board_lookup_ignores_case() {
        let board = FloorBoard::default();
        board.publish(
            FloorPrice {
                collection_address: "0xAbC".to_string(),
                price: Decimal::from(5),
                event_time: 1,
            },
            FloorSource::Incremental,
        );
        board.publish(
            FloorPrice {
                collection_address: "0xabc".to_string(),
                price: Decimal::from(4),
                event_time: 2,
            },
            FloorSource::Sweep,
        );
        let snapshot = board.get("0xABC").expect("floor");
        assert_eq!(snapshot.floor.price, Decimal::from(4));
        assert_eq!(snapshot.source, FloorSource::Sweep);
        assert_eq!(board.len(), 1);
    }
}
