use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::model::{
    Activity, ActiveOrder, CounterOrderOutcome, FloorPrice, MatchOutcome, MatchRecord, Order,
    OrderStatus, OrderType,
};
use crate::store::{OrderStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    orders: BTreeMap<i64, Order>,
    ids: HashMap<String, i64>,
    activities: Vec<Activity>,
    activity_keys: HashSet<(String, i64)>,
    owners: HashMap<(String, String), String>,
    floors: BTreeMap<(String, i64), rust_decimal::Decimal>,
    checkpoints: HashMap<(i64, i32), u64>,
}

/// In-process [`OrderStore`] with the same guard semantics as the Postgres
/// adapter.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn with_checkpoint(chain_id: i64, index_type: i32, block: u64) -> Self {
        let store = Self::default();
        store.lock().checkpoints.insert((chain_id, index_type), block);
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn order(&self, order_id: &str) -> Option<Order> {
        let inner = self.lock();
        let id = inner.ids.get(order_id)?;
        inner.orders.get(id).cloned()
    }

    pub fn activities(&self) -> Vec<Activity> {
        self.lock().activities.clone()
    }

    pub fn owner(&self, collection: &str, token_id: &str) -> Option<String> {
        self.lock()
            .owners
            .get(&(collection.to_lowercase(), token_id.to_string()))
            .cloned()
    }

    pub fn set_owner(&self, collection: &str, token_id: &str, owner: &str) {
        self.lock().owners.insert(
            (collection.to_lowercase(), token_id.to_string()),
            owner.to_lowercase(),
        );
    }

    pub fn floor_rows(&self) -> Vec<FloorPrice> {
        self.lock()
            .floors
            .iter()
            .map(|((collection, time), price)| FloorPrice {
                collection_address: collection.clone(),
                price: *price,
                event_time: *time,
            })
            .collect()
    }

    pub fn checkpoint(&self, chain_id: i64, index_type: i32) -> Option<u64> {
        self.lock().checkpoints.get(&(chain_id, index_type)).copied()
    }
}

fn to_active(id: i64, o: &Order) -> ActiveOrder {
    ActiveOrder {
        id,
        order_id: o.order_id.clone(),
        collection_address: o.collection_address.clone(),
        token_id: o.token_id.clone(),
        order_type: o.order_type,
        maker: o.maker.clone(),
        price: o.price,
        expire_time: o.expire_time,
    }
}

fn transition(inner: &mut Inner, order_id: &str, to: OrderStatus) -> bool {
    let Some(id) = inner.ids.get(order_id).copied() else {
        return false;
    };
    match inner.orders.get_mut(&id) {
        Some(order) if order.order_status == OrderStatus::Active => {
            order.order_status = to;
            true
        }
        _ => false,
    }
}

fn live_listings<'a>(inner: &'a Inner, now: i64) -> impl Iterator<Item = (i64, &'a Order)> + 'a {
    inner.orders.iter().filter_map(move |(id, o)| {
        let owner = inner
            .owners
            .get(&(o.collection_address.clone(), o.token_id.clone()));
        let owned = owner.is_none_or(|owner| *owner == o.maker);
        (o.order_type == OrderType::Listing
            && o.order_status == OrderStatus::Active
            && o.expire_time > now
            && owned)
            .then_some((*id, o))
    })
}

impl OrderStore for MemoryStore {
    async fn last_indexed_block(&self, chain_id: i64, index_type: i32) -> Result<u64, StoreError> {
        self.checkpoint(chain_id, index_type)
            .ok_or(StoreError::MissingCheckpoint {
                chain_id,
                index_type,
            })
    }

    async fn set_last_indexed_block(
        &self,
        chain_id: i64,
        index_type: i32,
        block: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let slot = inner.checkpoints.entry((chain_id, index_type)).or_insert(block);
        *slot = (*slot).max(block);
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.ids.contains_key(&order.order_id) {
            return Ok(false);
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.ids.insert(order.order_id.clone(), id);
        inner.orders.insert(id, order.clone());
        Ok(true)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.order(order_id))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, StoreError> {
        Ok(transition(&mut self.lock(), order_id, OrderStatus::Cancelled))
    }

    async fn expire_order(&self, order_id: &str) -> Result<bool, StoreError> {
        Ok(transition(&mut self.lock(), order_id, OrderStatus::Expired))
    }

    async fn expire_orders(&self, ids: &[i64]) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut count = 0;
        for id in ids {
            if let Some(order) = inner.orders.get_mut(id) {
                if order.order_status == OrderStatus::Active {
                    order.order_status = OrderStatus::Expired;
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn active_orders_page(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<ActiveOrder>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .orders
            .range(after_id.saturating_add(1)..)
            .filter(|(_, o)| o.order_status == OrderStatus::Active)
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|(id, o)| to_active(*id, o))
            .collect())
    }

    async fn active_listings(
        &self,
        collection: &str,
        now: i64,
        limit: i64,
    ) -> Result<Vec<ActiveOrder>, StoreError> {
        let inner = self.lock();
        let collection = collection.to_lowercase();
        let mut rows: Vec<_> = live_listings(&inner, now)
            .filter(|(_, o)| o.collection_address == collection)
            .map(|(id, o)| to_active(id, o))
            .collect();
        rows.sort_by(|a, b| a.price.cmp(&b.price).then(a.id.cmp(&b.id)));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn insert_activity(&self, activity: &Activity) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let key = (activity.tx_hash.clone(), activity.log_index);
        if !inner.activity_keys.insert(key) {
            return Ok(false);
        }
        inner.activities.push(activity.clone());
        Ok(true)
    }

    async fn apply_match(&self, record: &MatchRecord) -> Result<MatchOutcome, StoreError> {
        let mut inner = self.lock();
        let key = (record.sale.tx_hash.clone(), record.sale.log_index);
        if !inner.activity_keys.insert(key) {
            return Ok(MatchOutcome::AlreadyApplied);
        }
        inner.activities.push(record.sale.clone());

        if let Some(id) = inner.ids.get(&record.sell_order_id).copied() {
            if let Some(order) = inner.orders.get_mut(&id) {
                if order.order_status == OrderStatus::Active {
                    order.order_status = OrderStatus::Filled;
                    order.quantity_remaining = 0;
                    order.taker = record.buyer.clone();
                }
            }
        }

        let counter_id = inner.ids.get(&record.counter_order_id).copied();
        let counter = match counter_id.and_then(|id| inner.orders.get_mut(&id)) {
            None => CounterOrderOutcome::Missing,
            Some(order) if order.order_status != OrderStatus::Active => {
                CounterOrderOutcome::AlreadyTerminal
            }
            Some(order) if order.quantity_remaining > 1 => {
                order.quantity_remaining -= 1;
                CounterOrderOutcome::Decremented {
                    remaining: order.quantity_remaining,
                }
            }
            Some(order) => {
                order.order_status = OrderStatus::Filled;
                order.quantity_remaining = 0;
                CounterOrderOutcome::Filled
            }
        };

        inner.owners.insert(
            (
                record.collection_address.to_lowercase(),
                record.token_id.clone(),
            ),
            record.buyer.to_lowercase(),
        );
        Ok(MatchOutcome::Applied { counter })
    }

    async fn query_collection_floor_prices(&self, now: i64) -> Result<Vec<FloorPrice>, StoreError> {
        let inner = self.lock();
        let mut floors: BTreeMap<String, rust_decimal::Decimal> = BTreeMap::new();
        for (_, o) in live_listings(&inner, now) {
            floors
                .entry(o.collection_address.clone())
                .and_modify(|p| *p = (*p).min(o.price))
                .or_insert(o.price);
        }
        Ok(floors
            .into_iter()
            .map(|(collection_address, price)| FloorPrice {
                collection_address,
                price,
                event_time: now,
            })
            .collect())
    }

    async fn persist_floor_prices(&self, prices: &[FloorPrice]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for p in prices {
            inner
                .floors
                .insert((p.collection_address.clone(), p.event_time), p.price);
        }
        Ok(())
    }

    async fn delete_floor_prices_before(&self, cutoff: i64) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let before = inner.floors.len();
        inner.floors.retain(|(_, time), _| *time >= cutoff);
        Ok((before - inner.floors.len()) as u64)
    }
}
