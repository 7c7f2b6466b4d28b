#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::time::Duration;

use alloy_primitives::Address;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::chain::events::{self, LogMeta, OrderbookEvent};
use crate::chain::{ChainClient, ChainError, FilterQuery, RawLog};
use crate::core::IndexerStatus;
use crate::queue::{DurableQueue, QueueError};
use crate::store::{OrderStore, StoreError};

mod handlers;

pub use handlers::plan_match;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Decode(#[from] events::DecodeError),
}

impl IndexerError {
    /// Transient failures abort the window so it is retried; decode failures
    /// only affect the one log.
    pub fn is_transient(&self) -> bool {
        !matches!(self, IndexerError::Decode(_))
    }
}

#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub chain: String,
    pub chain_id: i64,
    pub index_type: i32,
    pub dex_address: Address,
    pub currency_address: String,
    pub batch_size: u64,
    pub confirmation_lag: u64,
    pub sleep_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncProgress {
    /// Head is within the confirmation lag of the checkpoint.
    Idle { head: u64 },
    Advanced { next: u64 },
}

/// Inclusive block window to index next, or `None` while the chain head is
/// not yet `lag` blocks past `last`.
pub fn sync_window(last: u64, head: u64, lag: u64, batch_size: u64) -> Option<(u64, u64)> {
    if head.saturating_sub(last) <= lag {
        return None;
    }
    let end = last.saturating_add(batch_size).min(head - lag);
    Some((last, end))
}

/// Block timestamps memoized for the duration of one window.
#[derive(Debug, Default)]
pub(crate) struct BlockTimes(HashMap<u64, i64>);

impl BlockTimes {
    pub(crate) async fn get<C: ChainClient>(
        &mut self,
        chain: &C,
        block: u64,
    ) -> Result<i64, ChainError> {
        if let Some(time) = self.0.get(&block) {
            return Ok(*time);
        }
        let time = chain.block_time(block).await?;
        self.0.insert(block, time);
        Ok(time)
    }
}

pub struct OrderbookIndexer<C, S, Q> {
    chain: C,
    store: S,
    queue: Q,
    settings: IndexerSettings,
    status: IndexerStatus,
}

impl<C, S, Q> OrderbookIndexer<C, S, Q>
where
    C: ChainClient,
    S: OrderStore,
    Q: DurableQueue,
{
    pub fn new(chain: C, store: S, queue: Q, settings: IndexerSettings, status: IndexerStatus) -> Self {
        Self {
            chain,
            store,
            queue,
            settings,
            status,
        }
    }

    pub async fn load_checkpoint(&self) -> Result<u64, StoreError> {
        let last = self
            .store
            .last_indexed_block(self.settings.chain_id, self.settings.index_type)
            .await?;
        self.status.record_checkpoint(last);
        Ok(last)
    }

    /// Runs for the lifetime of the process starting at `last`.
    pub async fn sync_loop(self, mut last: u64) {
        info!(
            chain = %self.settings.chain,
            start_block = last,
            "orderbook indexer started"
        );
        loop {
            match self.sync_once(last).await {
                Ok(SyncProgress::Advanced { next }) => last = next,
                Ok(SyncProgress::Idle { head }) => {
                    debug!(head, last, "waiting for confirmations");
                    tokio::time::sleep(self.settings.sleep_interval).await;
                }
                Err(err) => {
                    error!(
                        error = %err,
                        chain = %self.settings.chain,
                        start_block = last,
                        "indexing window failed; retrying"
                    );
                    tokio::time::sleep(self.settings.sleep_interval).await;
                }
            }
        }
    }

    /// Indexes one window starting at `last` and persists the next checkpoint.
    /// Nothing is advanced when any transient failure occurs.
    pub async fn sync_once(&self, last: u64) -> Result<SyncProgress, IndexerError> {
        let head = self.chain.block_number().await?;
        self.status.record_head(head);

        let Some((start, end)) = sync_window(
            last,
            head,
            self.settings.confirmation_lag,
            self.settings.batch_size,
        ) else {
            return Ok(SyncProgress::Idle { head });
        };

        let query = FilterQuery {
            from_block: start,
            to_block: end,
            addresses: vec![self.settings.dex_address],
            topics: events::tracked_topics(),
        };
        let logs = self.chain.filter_logs(&query).await?;
        debug!(start_block = start, end_block = end, logs = logs.len(), "fetched logs");

        self.process_logs(&logs).await?;

        let next = end + 1;
        self.store
            .set_last_indexed_block(self.settings.chain_id, self.settings.index_type, next)
            .await?;
        self.status.record_checkpoint(next);
        info!(start_block = start, end_block = end, "indexed window");
        Ok(SyncProgress::Advanced { next })
    }

    pub(crate) async fn process_logs(&self, logs: &[RawLog]) -> Result<(), IndexerError> {
        let mut times = BlockTimes::default();
        for log in logs {
            if log.removed {
                debug!(block = log.block(), "skipping removed log");
                continue;
            }
            let meta = LogMeta::from(log);
            let event = match events::decode_log(log) {
                Ok(event) => event,
                Err(err) => {
                    warn!(
                        error = %err,
                        tx_hash = %meta.tx_hash,
                        log_index = meta.log_index,
                        "skipping undecodable log"
                    );
                    continue;
                }
            };
            let handled = match event {
                OrderbookEvent::Make(ev) => self.handle_make(&meta, ev, &mut times).await,
                OrderbookEvent::Cancel(ev) => self.handle_cancel(&meta, ev, &mut times).await,
                OrderbookEvent::Match(ev) => self.handle_match(&meta, ev, &mut times).await,
                OrderbookEvent::Unknown(_) => Ok(()),
            };
            if let Err(err) = handled {
                if err.is_transient() {
                    return Err(err);
                }
                warn!(error = %err, tx_hash = %meta.tx_hash, "skipping log");
            }
        }
        Ok(())
    }
}
