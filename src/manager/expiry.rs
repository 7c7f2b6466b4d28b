use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::core::model::{TradeEvent, TradeEventType};
use crate::core::wheel::{ExpiryTask, lock_wheel};
use crate::manager::{ManagerError, OrderManager};
use crate::queue::{self, DurableQueue};
use crate::store::{OrderStore, WRITE_BATCH_SIZE};

/// Rows read per page by the startup reload.
pub const RELOAD_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub scheduled: usize,
    pub expired: usize,
}

impl<S, Q> OrderManager<S, Q>
where
    S: OrderStore,
    Q: DurableQueue,
{
    /// Returns the bucket the order landed in.
    pub fn schedule(&self, delay_secs: i64, order_id: &str, collection: &str) -> usize {
        let task = ExpiryTask {
            order_id: order_id.to_string(),
            collection_address: collection.to_string(),
            chain: self.settings.chain.clone(),
        };
        let bucket = lock_wheel(&self.wheel).schedule(delay_secs, task);
        debug!(order_id, delay_secs, bucket, "expiry scheduled");
        bucket
    }

    /// Advances the wheel one bucket and hands due entries to the finalize
    /// workers. The wheel lock is released before dispatch; entries that do
    /// not fit in the channel go back on the wheel for the next tick.
    pub fn sweep_tick(&self, workers: &mpsc::Sender<ExpiryTask>) -> usize {
        let due = lock_wheel(&self.wheel).tick();
        let mut dispatched = 0;
        for task in due {
            match workers.try_send(task) {
                Ok(()) => dispatched += 1,
                Err(mpsc::error::TrySendError::Full(task)) => {
                    warn!(order_id = %task.order_id, "expiry workers saturated; deferring");
                    lock_wheel(&self.wheel).schedule(1, task);
                }
                Err(mpsc::error::TrySendError::Closed(task)) => {
                    error!(order_id = %task.order_id, "expiry workers stopped");
                }
            }
        }
        dispatched
    }

    pub(crate) async fn sweep_loop(self, workers: mpsc::Sender<ExpiryTask>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            self.sweep_tick(&workers);
        }
    }

    /// Spawns the fixed finalize pool and returns its feeding channel.
    pub(crate) fn spawn_expiry_workers(&self) -> mpsc::Sender<ExpiryTask> {
        let (tx, rx) = mpsc::channel::<ExpiryTask>(self.settings.expiry_queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        for worker in 0..self.settings.expiry_workers.max(1) {
            let manager = self.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(task) = next else {
                        debug!(worker, "expiry worker exiting");
                        break;
                    };
                    if let Err(err) = manager.finalize_expiry(&task).await {
                        error!(
                            error = %err,
                            order_id = %task.order_id,
                            collection = %task.collection_address,
                            "failed to expire order"
                        );
                    }
                }
            });
        }
        tx
    }

    /// Expires the order if it is still active and announces it. Returns
    /// `false` when the order had already settled.
    pub async fn finalize_expiry(&self, task: &ExpiryTask) -> Result<bool, ManagerError> {
        if !self.store.expire_order(&task.order_id).await? {
            debug!(order_id = %task.order_id, "expiry skipped for settled order");
            return Ok(false);
        }
        let event = TradeEvent::new(TradeEventType::Expired, task.collection_address.clone())
            .order(task.order_id.clone());
        queue::push_trade_event(&self.queue, &task.chain, &event).await?;
        info!(order_id = %task.order_id, "order expired");
        Ok(true)
    }

    /// Pages through every active order: live ones go on the wheel, lapsed
    /// ones are expired in bulk once paging is done.
    pub async fn load_orders_to_queue(&self, now: i64) -> Result<LoadSummary, ManagerError> {
        let mut summary = LoadSummary::default();
        let mut lapsed = Vec::new();
        let mut after_id = 0;
        loop {
            let page = self.store.active_orders_page(after_id, RELOAD_PAGE_SIZE).await?;
            let Some(last) = page.last() else {
                break;
            };
            after_id = last.id;
            let full = page.len() as i64 == RELOAD_PAGE_SIZE;
            for order in page {
                if order.expire_time < now {
                    lapsed.push(order);
                } else {
                    self.schedule(
                        order.expire_time - now,
                        &order.order_id,
                        &order.collection_address,
                    );
                    summary.scheduled += 1;
                }
            }
            if !full {
                break;
            }
        }

        for chunk in lapsed.chunks(WRITE_BATCH_SIZE) {
            let ids: Vec<i64> = chunk.iter().map(|o| o.id).collect();
            let updated = self.store.expire_orders(&ids).await?;
            debug!(requested = ids.len(), updated, "expired lapsed orders");
            for order in chunk {
                self.emit_expired(&order.collection_address, &order.order_id).await;
            }
        }
        summary.expired = lapsed.len();
        Ok(summary)
    }
}
