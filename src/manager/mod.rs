#![forbid(unsafe_code)]

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::cache::TtlCache;
use crate::core::model::{ListingInfo, OrderType, TradeEvent, TradeEventType};
use crate::core::state::FloorBoard;
use crate::core::unix_now;
use crate::core::wheel::SharedWheel;
use crate::queue::{self, DurableQueue, QueueError};
use crate::store::{OrderStore, StoreError};

pub mod expiry;
pub mod floor;

pub use expiry::LoadSummary;
pub use floor::FloorTracker;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub chain: String,
    pub project: String,
    pub exact_floor_price: bool,
    pub price_index_max_len: usize,
    pub expiry_workers: usize,
    pub expiry_queue_capacity: usize,
    pub floor_sweep_interval: Duration,
    pub floor_retention: Duration,
    pub retention_sweep_interval: Duration,
    pub listing_dedup_ttl: Duration,
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
}

/// Owns order expiry and the floor-price layers for one chain. Collaborators
/// are injected so several chains can run side by side.
#[derive(Clone)]
pub struct OrderManager<S, Q> {
    store: S,
    queue: Q,
    settings: ManagerSettings,
    wheel: SharedWheel,
    floors: FloorBoard,
    seen_listings: TtlCache,
}

impl<S, Q> OrderManager<S, Q>
where
    S: OrderStore,
    Q: DurableQueue,
{
    pub fn new(
        store: S,
        queue: Q,
        settings: ManagerSettings,
        wheel: SharedWheel,
        floors: FloorBoard,
    ) -> Self {
        Self {
            store,
            queue,
            settings,
            wheel,
            floors,
            seen_listings: TtlCache::new(),
        }
    }

    /// Reloads active orders into the wheel, then spawns the background loops.
    /// A failed reload aborts startup so the wheel never runs half-populated.
    pub async fn start(&self) -> Result<(), ManagerError> {
        let summary = self.load_orders_to_queue(unix_now()).await?;
        info!(
            chain = %self.settings.chain,
            project = %self.settings.project,
            scheduled = summary.scheduled,
            expired = summary.expired,
            "active orders loaded"
        );

        let expiry_tx = self.spawn_expiry_workers();
        tokio::spawn(self.clone().sweep_loop(expiry_tx));
        tokio::spawn(self.clone().listing_loop());
        tokio::spawn(self.clone().trade_event_loop());
        if self.settings.exact_floor_price {
            tokio::spawn(self.clone().floor_sweep_loop());
        }
        tokio::spawn(self.clone().retention_loop());
        Ok(())
    }

    async fn listing_loop(self) {
        let key = queue::orders_key(&self.settings.chain);
        loop {
            match self.queue.pop(&key).await {
                Ok(Some(raw)) => self.handle_listing_message(&raw, unix_now()).await,
                Ok(None) => {
                    self.seen_listings.purge_expired();
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
                Err(err) => {
                    warn!(error = %err, key = %key, "failed to pop listing");
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
            }
        }
    }

    /// Routes one listing message: already-stale orders are expired on the
    /// spot, live ones are announced to the floor layer and put on the wheel.
    pub async fn handle_listing_message(&self, raw: &str, now: i64) {
        let listing: ListingInfo = match serde_json::from_str(raw) {
            Ok(listing) => listing,
            Err(err) => {
                warn!(error = %err, "dropping malformed listing message");
                return;
            }
        };
        if listing.order_id.is_empty() {
            error!("dropping listing message with empty order id");
            return;
        }
        if self.seen_listings.contains(&listing.order_id) {
            debug!(order_id = %listing.order_id, "listing already handled");
            return;
        }
        self.seen_listings.set_with_expiry(
            listing.order_id.clone(),
            listing.collection_addr.clone(),
            self.settings.listing_dedup_ttl,
        );

        if listing.expire_in < now {
            info!(order_id = %listing.order_id, "listing arrived already expired");
            match self.store.expire_order(&listing.order_id).await {
                Ok(true) => self.emit_expired(&listing.collection_addr, &listing.order_id).await,
                Ok(false) => {}
                Err(err) => error!(
                    error = %err,
                    order_id = %listing.order_id,
                    "failed to expire order"
                ),
            }
            return;
        }

        if listing.order_type == OrderType::Listing {
            let event = TradeEvent::new(TradeEventType::Listing, listing.collection_addr.clone())
                .order(listing.order_id.clone())
                .token(listing.token_id.clone())
                .price(listing.price)
                .from_addr(listing.maker.clone());
            if let Err(err) = queue::push_trade_event(&self.queue, &self.settings.chain, &event).await
            {
                error!(
                    error = %err,
                    order_id = %listing.order_id,
                    price = %listing.price,
                    chain = %self.settings.chain,
                    "failed to push listing trade event"
                );
            }
        }
        self.schedule(
            listing.expire_in - now,
            &listing.order_id,
            &listing.collection_addr,
        );
    }

    pub(crate) async fn emit_expired(&self, collection: &str, order_id: &str) {
        let event = TradeEvent::new(TradeEventType::Expired, collection).order(order_id);
        if let Err(err) = queue::push_trade_event(&self.queue, &self.settings.chain, &event).await {
            error!(error = %err, order_id, "failed to push expired trade event");
        }
    }
}


#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::testing::manager;
    use super::*;
    use crate::chain::events::fixtures::{Terms, account, cancel_log, dex, key, make_log};
    use crate::core::IndexerStatus;
    use crate::core::model::{OrderStatus, ZERO_ADDRESS};
    use crate::core::wheel::lock_wheel;
    use crate::indexer::scripted::{GENESIS_TIME, ScriptedChain};
    use crate::indexer::{IndexerSettings, OrderbookIndexer};
    use crate::queue::memory::MemoryQueue;
    use crate::queue::{orders_key, trade_events_key};
    use crate::store::memory::MemoryStore;

    fn listing_json(order_id: &str, expire_in: i64) -> String {
        serde_json::to_string(&ListingInfo {
            expire_in,
            order_id: order_id.to_string(),
            collection_addr: "0xcc".to_string(),
            token_id: "7".to_string(),
            price: Decimal::from(100),
            maker: "0xaa".to_string(),
            order_type: OrderType::Listing,
        })
        .expect("json")
    }

    fn trade_events(queue: &MemoryQueue) -> Vec<TradeEvent> {
        queue
            .drain(&trade_events_key("eth"))
            .iter()
            .map(|raw| serde_json::from_str(raw).expect("trade event"))
            .collect()
    }

    fn indexer(
        chain: &ScriptedChain,
        store: &MemoryStore,
        queue: &MemoryQueue,
    ) -> OrderbookIndexer<ScriptedChain, MemoryStore, MemoryQueue> {
        OrderbookIndexer::new(
            chain.clone(),
            store.clone(),
            queue.clone(),
            IndexerSettings {
                chain: "eth".to_string(),
                chain_id: 1,
                index_type: 6,
                dex_address: dex(),
                currency_address: ZERO_ADDRESS.to_string(),
                batch_size: 10,
                confirmation_lag: 1,
                sleep_interval: Duration::from_millis(10),
            },
            IndexerStatus::default(),
        )
    }

    fn listing_terms(expiry: i64) -> Terms {
        Terms {
            side: 0,
            sale_kind: 1,
            maker: account(0xaa),
            collection: account(0xcc),
            token_id: 7,
            amount: 1,
            price: 100,
            expiry: expiry as u64,
            salt: 1,
        }
    }

    #[tokio::test]
    async fn live_listing_is_announced_and_scheduled() {
        let store = MemoryStore::default();
        let queue = MemoryQueue::default();
        let (manager, wheel) = manager(&store, &queue, 60);

        manager.handle_listing_message(&listing_json("0x01", 1_050), 1_000).await;

        let events = trade_events(&queue);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, TradeEventType::Listing);
        assert_eq!(events[0].price, Some(Decimal::from(100)));
        assert_eq!(events[0].from.as_deref(), Some("0xaa"));
        assert_eq!(lock_wheel(&wheel).len(), 1);
        assert_eq!(lock_wheel(&wheel).bucket_len(49), 1);
    }

    #[tokio::test]
    async fn redelivered_listing_is_ignored() {
        let store = MemoryStore::default();
        let queue = MemoryQueue::default();
        let (manager, wheel) = manager(&store, &queue, 60);
        let raw = listing_json("0x01", 1_050);

        manager.handle_listing_message(&raw, 1_000).await;
        manager.handle_listing_message(&raw, 1_001).await;

        assert_eq!(trade_events(&queue).len(), 1);
        assert_eq!(lock_wheel(&wheel).len(), 1);
    }

    #[tokio::test]
    async fn malformed_and_empty_listings_are_dropped() {
        let store = MemoryStore::default();
        let queue = MemoryQueue::default();
        let (manager, wheel) = manager(&store, &queue, 60);

        manager.handle_listing_message("{not json", 1_000).await;
        manager.handle_listing_message(&listing_json("", 1_050), 1_000).await;

        assert!(trade_events(&queue).is_empty());
        assert!(lock_wheel(&wheel).is_empty());
    }

    #[tokio::test]
    async fn bid_is_scheduled_without_listing_event() {
        let store = MemoryStore::default();
        let queue = MemoryQueue::default();
        let (manager, wheel) = manager(&store, &queue, 60);
        let mut bid: ListingInfo =
            serde_json::from_str(&listing_json("0x02", 1_020)).expect("listing");
        bid.order_type = OrderType::CollectionBid;
        let raw = serde_json::to_string(&bid).expect("json");

        manager.handle_listing_message(&raw, 1_000).await;

        assert!(trade_events(&queue).is_empty());
        assert_eq!(lock_wheel(&wheel).len(), 1);
    }

    /// Make for token #7 expiring 50s out, consumed by the manager and
    /// expired by 50 manual sweep ticks.
    #[tokio::test]
    async fn made_listing_expires_after_fifty_ticks() {
        let now = GENESIS_TIME + 20;
        let chain = ScriptedChain::new(30, vec![make_log(key(1), &listing_terms(now + 50), 10, 0xf1, 0)]);
        let store = MemoryStore::with_checkpoint(1, 6, 10);
        let queue = MemoryQueue::default();
        indexer(&chain, &store, &queue).sync_once(10).await.expect("sync");

        let order_id = format!("0x{}", "01".repeat(32));
        let order = store.order(&order_id).expect("order");
        assert_eq!(order.order_status, OrderStatus::Active);
        assert_eq!(order.quantity_remaining, order.size);

        let listings = queue.drain(&orders_key("eth"));
        assert_eq!(listings.len(), 1);

        let (manager, _wheel) = manager(&store, &queue, 3600);
        manager.handle_listing_message(&listings[0], now).await;
        assert_eq!(trade_events(&queue)[0].event_type, TradeEventType::Listing);

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        for _ in 0..49 {
            assert_eq!(manager.sweep_tick(&tx), 0);
        }
        assert_eq!(manager.sweep_tick(&tx), 1);
        let task = rx.recv().await.expect("expiry task");
        assert!(manager.finalize_expiry(&task).await.expect("finalize"));

        assert_eq!(
            store.order(&order_id).expect("order").order_status,
            OrderStatus::Expired
        );
        let events = trade_events(&queue);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, TradeEventType::Expired);
        assert_eq!(events[0].order_id.as_deref(), Some(order_id.as_str()));
    }

    #[tokio::test]
    async fn cancelled_listing_does_not_expire_later() {
        let now = GENESIS_TIME + 20;
        let logs = vec![
            make_log(key(1), &listing_terms(now + 5), 10, 0xf1, 0),
            cancel_log(key(1), account(0xaa), 11, 0xf2, 0),
        ];
        let chain = ScriptedChain::new(30, logs);
        let store = MemoryStore::with_checkpoint(1, 6, 10);
        let queue = MemoryQueue::default();
        indexer(&chain, &store, &queue).sync_once(10).await.expect("sync");
        queue.drain(&trade_events_key("eth"));

        let (manager, _wheel) = manager(&store, &queue, 60);
        for raw in queue.drain(&orders_key("eth")) {
            manager.handle_listing_message(&raw, now).await;
        }
        queue.drain(&trade_events_key("eth"));

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let fired: usize = (0..5).map(|_| manager.sweep_tick(&tx)).sum();
        assert_eq!(fired, 1);
        let task = rx.recv().await.expect("expiry task");
        assert!(!manager.finalize_expiry(&task).await.expect("finalize"));

        let order_id = format!("0x{}", "01".repeat(32));
        assert_eq!(
            store.order(&order_id).expect("order").order_status,
            OrderStatus::Cancelled
        );
        assert!(trade_events(&queue).is_empty());
    }

    #[tokio::test]
    async fn stale_listing_is_expired_immediately() {
        let now = GENESIS_TIME + 100;
        let chain = ScriptedChain::new(30, vec![make_log(key(1), &listing_terms(now - 10), 10, 0xf1, 0)]);
        let store = MemoryStore::with_checkpoint(1, 6, 10);
        let queue = MemoryQueue::default();
        indexer(&chain, &store, &queue).sync_once(10).await.expect("sync");

        let (manager, wheel) = manager(&store, &queue, 60);
        for raw in queue.drain(&orders_key("eth")) {
            manager.handle_listing_message(&raw, now).await;
        }

        let order_id = format!("0x{}", "01".repeat(32));
        assert_eq!(
            store.order(&order_id).expect("order").order_status,
            OrderStatus::Expired
        );
        assert!(lock_wheel(&wheel).is_empty());
        let events = trade_events(&queue);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, TradeEventType::Expired);
    }
}
