#![forbid(unsafe_code)]

use std::future::Future;

use thiserror::Error;

use crate::core::model::{Activity, ActiveOrder, FloorPrice, MatchOutcome, MatchRecord, Order};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgOrderStore;

/// Upper bound on rows written per statement by the batch operations.
pub const WRITE_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no checkpoint row for chain {chain_id} index type {index_type}")]
    MissingCheckpoint { chain_id: i64, index_type: i32 },
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// Read/write contract over orders, activities, floor snapshots and the
/// indexer checkpoint. Every status transition is guarded on `Active`.
pub trait OrderStore: Clone + Send + Sync + 'static {
    fn last_indexed_block(
        &self,
        chain_id: i64,
        index_type: i32,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Never lowers the stored value.
    fn set_last_indexed_block(
        &self,
        chain_id: i64,
        index_type: i32,
        block: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns `false` when a row with the same order id already existed.
    fn insert_order(&self, order: &Order) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn get_order(
        &self,
        order_id: &str,
    ) -> impl Future<Output = Result<Option<Order>, StoreError>> + Send;

    fn cancel_order(&self, order_id: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn expire_order(&self, order_id: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Bulk expiry by primary key; returns the number of rows transitioned.
    fn expire_orders(&self, ids: &[i64]) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn active_orders_page(
        &self,
        after_id: i64,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<ActiveOrder>, StoreError>> + Send;

    /// Lowest-priced live listings of a collection whose maker still owns the
    /// token.
    fn active_listings(
        &self,
        collection: &str,
        now: i64,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<ActiveOrder>, StoreError>> + Send;

    fn insert_activity(
        &self,
        activity: &Activity,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn apply_match(
        &self,
        record: &MatchRecord,
    ) -> impl Future<Output = Result<MatchOutcome, StoreError>> + Send;

    fn query_collection_floor_prices(
        &self,
        now: i64,
    ) -> impl Future<Output = Result<Vec<FloorPrice>, StoreError>> + Send;

    fn persist_floor_prices(
        &self,
        prices: &[FloorPrice],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete_floor_prices_before(
        &self,
        cutoff: i64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Lowercased chain name restricted to identifier characters, for use in
/// per-chain table names.
pub fn table_suffix(chain: &str) -> String {
    chain
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
