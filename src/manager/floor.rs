use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::core::model::{ActiveOrder, FloorPrice, TradeEvent, TradeEventType};
use crate::core::price_index::PriorityQueueMap;
use crate::core::state::FloorSource;
use crate::core::unix_now;
use crate::manager::OrderManager;
use crate::queue::{self, DurableQueue};
use crate::store::{OrderStore, StoreError};

/// Incremental floor layer: one price index per collection, owned by the
/// trade-event loop.
#[derive(Debug)]
pub struct FloorTracker {
    indexes: HashMap<String, PriorityQueueMap>,
    max_len: usize,
}

impl FloorTracker {
    pub fn new(max_len: usize) -> Self {
        Self {
            indexes: HashMap::new(),
            max_len,
        }
    }

    pub fn is_tracked(&self, collection: &str) -> bool {
        self.indexes.contains_key(&collection.to_lowercase())
    }

    /// Applies one event to its collection's index. Returns `true` when the
    /// index must be reloaded from the store: it was forced, or a removal
    /// drained it.
    pub fn apply(&mut self, event: &TradeEvent) -> bool {
        let collection = event.collection_addr.to_lowercase();
        match event.event_type {
            TradeEventType::UpdateCollection => true,
            TradeEventType::Listing => {
                let (Some(order_id), Some(price)) = (&event.order_id, event.price) else {
                    warn!(collection = %event.collection_addr, "listing event without order or price");
                    return false;
                };
                let max_len = self.max_len;
                self.indexes
                    .entry(collection)
                    .or_insert_with(|| PriorityQueueMap::new(max_len))
                    .add(
                        order_id,
                        price,
                        event.from.as_deref().unwrap_or_default(),
                        event.token_id.as_deref().unwrap_or_default(),
                    );
                false
            }
            TradeEventType::Cancel | TradeEventType::Expired | TradeEventType::Buy => {
                let Some(index) = self.indexes.get_mut(&collection) else {
                    return false;
                };
                let mut removed = event
                    .order_id
                    .as_deref()
                    .is_some_and(|order_id| index.remove(order_id));
                if event.event_type == TradeEventType::Buy {
                    if let (Some(from), Some(token_id)) = (&event.from, &event.token_id) {
                        removed |= index.remove_maker_orders(from, token_id) > 0;
                    }
                }
                removed && index.is_empty()
            }
        }
    }

    pub fn rebuild(&mut self, collection: &str, listings: &[ActiveOrder]) {
        let mut index = PriorityQueueMap::new(self.max_len);
        for listing in listings {
            index.add(&listing.order_id, listing.price, &listing.maker, &listing.token_id);
        }
        self.indexes.insert(collection.to_lowercase(), index);
    }

    /// Lowest listed price, or `None` when nothing is listed.
    pub fn floor(&self, collection: &str) -> Option<Decimal> {
        self.indexes
            .get(&collection.to_lowercase())
            .and_then(|index| index.min())
            .map(|entry| entry.priority)
    }

    pub fn collections(&self) -> usize {
        self.indexes.len()
    }
}

impl<S, Q> OrderManager<S, Q>
where
    S: OrderStore,
    Q: DurableQueue,
{
    async fn reload_price_index(
        &self,
        tracker: &mut FloorTracker,
        collection: &str,
        now: i64,
    ) -> Result<(), StoreError> {
        let limit = i64::try_from(self.settings.price_index_max_len).unwrap_or(i64::MAX);
        let listings = self.store.active_listings(collection, now, limit).await?;
        debug!(collection = %collection, listings = listings.len(), "price index loaded");
        tracker.rebuild(collection, &listings);
        Ok(())
    }

    /// A collection is loaded from the store the first time it is seen, so
    /// listings made before this process started count toward its floor.
    pub async fn handle_trade_event(&self, tracker: &mut FloorTracker, event: &TradeEvent, now: i64) {
        let collection = event.collection_addr.to_lowercase();
        if !tracker.is_tracked(&collection) {
            if let Err(err) = self.reload_price_index(tracker, &collection, now).await {
                // The store already holds this event's effect; the next event retries the load.
                warn!(error = %err, collection = %collection, "failed to load price index");
                return;
            }
        }
        if tracker.apply(event) {
            if let Err(err) = self.reload_price_index(tracker, &collection, now).await {
                warn!(error = %err, collection = %collection, "failed to rebuild price index");
            }
        }

        match tracker.floor(&collection) {
            Some(price) => self.floors.publish(
                FloorPrice {
                    collection_address: collection,
                    price,
                    event_time: now,
                },
                FloorSource::Incremental,
            ),
            None => self.floors.clear(&collection),
        }
    }

    pub(crate) async fn trade_event_loop(self) {
        let key = queue::trade_events_key(&self.settings.chain);
        let mut tracker = FloorTracker::new(self.settings.price_index_max_len);
        loop {
            let raw = match self.queue.pop(&key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    tokio::time::sleep(self.settings.poll_interval).await;
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, key = %key, "failed to pop trade event");
                    tokio::time::sleep(self.settings.poll_interval).await;
                    continue;
                }
            };
            match serde_json::from_str::<TradeEvent>(&raw) {
                Ok(event) => self.handle_trade_event(&mut tracker, &event, unix_now()).await,
                Err(err) => warn!(error = %err, "dropping malformed trade event"),
            }
        }
    }

    /// Recomputes every collection's floor from the store, persists the
    /// snapshot and publishes it over the incremental values.
    pub async fn floor_sweep_once(&self, now: i64) -> Result<usize, StoreError> {
        let prices = self.store.query_collection_floor_prices(now).await?;
        self.store.persist_floor_prices(&prices).await?;
        for price in &prices {
            self.floors.publish(price.clone(), FloorSource::Sweep);
        }
        Ok(prices.len())
    }

    pub(crate) async fn floor_sweep_loop(self) {
        let mut ticker = tokio::time::interval(self.settings.floor_sweep_interval);
        loop {
            ticker.tick().await;
            match self.floor_sweep_once(unix_now()).await {
                Ok(collections) => debug!(collections, "floor prices recomputed"),
                Err(err) => error!(error = %err, "floor price sweep failed"),
            }
        }
    }

    pub async fn prune_floor_history(&self, now: i64) -> Result<u64, StoreError> {
        let retention = i64::try_from(self.settings.floor_retention.as_secs()).unwrap_or(i64::MAX);
        self.store
            .delete_floor_prices_before(now.saturating_sub(retention))
            .await
    }

    pub(crate) async fn retention_loop(self) {
        let mut ticker = tokio::time::interval(self.settings.retention_sweep_interval);
        loop {
            ticker.tick().await;
            match self.prune_floor_history(unix_now()).await {
                Ok(deleted) => info!(deleted, "pruned floor price history"),
                Err(err) => error!(error = %err, "floor price retention sweep failed"),
            }
        }
    }
}
