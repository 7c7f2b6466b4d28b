#![forbid(unsafe_code)]

pub mod cache;
pub mod model;
pub mod price_index;
pub mod state;
pub mod wheel;

pub use state::{FloorBoard, IndexerStatus, Orderbookd};

use std::time::{SystemTime, UNIX_EPOCH};

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
