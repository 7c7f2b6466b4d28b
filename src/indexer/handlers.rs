use tracing::{debug, info, warn};

use crate::chain::events::{CancelEvent, LogMeta, MakeEvent, MatchEvent, Side};
use crate::chain::ChainClient;
use crate::core::model::{
    Activity, ActivityType, CounterOrderOutcome, ListingInfo, MatchOutcome, MatchRecord, Order,
    OrderStatus, TradeEvent, TradeEventType, ZERO_ADDRESS,
};
use crate::indexer::{BlockTimes, IndexerError, OrderbookIndexer};
use crate::queue::{self, DurableQueue};
use crate::store::OrderStore;

/// Resolves which side of a match sold the NFT. When the make order is a bid
/// the take order is the listing being bought, and the other way around.
pub fn plan_match(
    ev: &MatchEvent,
    meta: &LogMeta,
    currency: &str,
    event_time: i64,
) -> (MatchRecord, TradeEvent) {
    let (sell, counter, from, to, asset) = match ev.make.side {
        Side::Bid => (
            &ev.take_order_id,
            &ev.make_order_id,
            &ev.take.maker,
            &ev.make.maker,
            &ev.take,
        ),
        Side::List => (
            &ev.make_order_id,
            &ev.take_order_id,
            &ev.make.maker,
            &ev.take.maker,
            &ev.make,
        ),
    };

    let sale = Activity {
        activity_type: ActivityType::Sale,
        maker: ev.make.maker.clone(),
        taker: ev.take.maker.clone(),
        collection_address: asset.collection.clone(),
        token_id: asset.token_id.clone(),
        currency_address: currency.to_string(),
        price: ev.fill_price,
        block_number: meta.block_number as i64,
        tx_hash: meta.tx_hash.clone(),
        log_index: meta.log_index as i64,
        event_time,
    };
    let record = MatchRecord {
        sell_order_id: sell.clone(),
        counter_order_id: counter.clone(),
        buyer: to.clone(),
        collection_address: asset.collection.clone(),
        token_id: asset.token_id.clone(),
        sale,
    };
    let trade = TradeEvent::new(TradeEventType::Buy, asset.collection.clone())
        .order(sell.clone())
        .token(asset.token_id.clone())
        .price(ev.fill_price)
        .from_addr(from.clone())
        .to_addr(to.clone());
    (record, trade)
}

impl<C, S, Q> OrderbookIndexer<C, S, Q>
where
    C: ChainClient,
    S: OrderStore,
    Q: DurableQueue,
{
    /// Activity rows are history; a failed insert is logged and the order
    /// state still advances.
    async fn record_activity(&self, activity: &Activity) {
        if let Err(err) = self.store.insert_activity(activity).await {
            warn!(
                error = %err,
                tx_hash = %activity.tx_hash,
                log_index = activity.log_index,
                "failed to record activity"
            );
        }
    }

    pub(crate) async fn handle_make(
        &self,
        meta: &LogMeta,
        ev: MakeEvent,
        times: &mut BlockTimes,
    ) -> Result<(), IndexerError> {
        let event_time = times.get(&self.chain, meta.block_number).await?;
        let terms = ev.terms;
        let order_type = terms.order_type();
        let order = Order {
            order_id: ev.order_id,
            collection_address: terms.collection,
            token_id: terms.token_id,
            order_type,
            order_status: OrderStatus::Active,
            price: terms.price,
            currency_address: self.settings.currency_address.clone(),
            size: terms.amount,
            quantity_remaining: terms.amount,
            salt: terms.salt,
            maker: terms.maker,
            taker: ZERO_ADDRESS.to_string(),
            expire_time: terms.expiry,
            event_time,
        };

        let inserted = self.store.insert_order(&order).await?;
        self.record_activity(&Activity {
            activity_type: ActivityType::for_make(order_type),
            maker: order.maker.clone(),
            taker: ZERO_ADDRESS.to_string(),
            collection_address: order.collection_address.clone(),
            token_id: order.token_id.clone(),
            currency_address: order.currency_address.clone(),
            price: order.price,
            block_number: meta.block_number as i64,
            tx_hash: meta.tx_hash.clone(),
            log_index: meta.log_index as i64,
            event_time,
        })
        .await;

        if !inserted {
            debug!(order_id = %order.order_id, "order already indexed; re-announcing listing");
        }
        queue::push_listing(&self.queue, &self.settings.chain, &ListingInfo::from_order(&order))
            .await?;
        info!(
            order_id = %order.order_id,
            order_type = ?order_type,
            collection = %order.collection_address,
            "order made"
        );
        Ok(())
    }

    pub(crate) async fn handle_cancel(
        &self,
        meta: &LogMeta,
        ev: CancelEvent,
        times: &mut BlockTimes,
    ) -> Result<(), IndexerError> {
        let event_time = times.get(&self.chain, meta.block_number).await?;
        let cancelled = self.store.cancel_order(&ev.order_id).await?;
        let Some(order) = self.store.get_order(&ev.order_id).await? else {
            warn!(order_id = %ev.order_id, "cancel for unknown order");
            return Ok(());
        };
        if !cancelled && order.order_status != OrderStatus::Cancelled {
            debug!(
                order_id = %order.order_id,
                status = ?order.order_status,
                "cancel ignored for settled order"
            );
            return Ok(());
        }

        self.record_activity(&Activity {
            activity_type: ActivityType::for_cancel(order.order_type),
            maker: order.maker.clone(),
            taker: ZERO_ADDRESS.to_string(),
            collection_address: order.collection_address.clone(),
            token_id: order.token_id.clone(),
            currency_address: order.currency_address.clone(),
            price: order.price,
            block_number: meta.block_number as i64,
            tx_hash: meta.tx_hash.clone(),
            log_index: meta.log_index as i64,
            event_time,
        })
        .await;

        let trade = TradeEvent::new(TradeEventType::Cancel, order.collection_address.clone())
            .order(order.order_id.clone())
            .token(order.token_id.clone())
            .price(order.price);
        queue::push_trade_event(&self.queue, &self.settings.chain, &trade).await?;
        info!(order_id = %order.order_id, "order cancelled");
        Ok(())
    }

    pub(crate) async fn handle_match(
        &self,
        meta: &LogMeta,
        ev: MatchEvent,
        times: &mut BlockTimes,
    ) -> Result<(), IndexerError> {
        let event_time = times.get(&self.chain, meta.block_number).await?;
        let (record, trade) = plan_match(&ev, meta, &self.settings.currency_address, event_time);

        match self.store.apply_match(&record).await? {
            MatchOutcome::AlreadyApplied => {
                debug!(tx_hash = %meta.tx_hash, log_index = meta.log_index, "match already applied")
            }
            MatchOutcome::Applied { counter } => match counter {
                CounterOrderOutcome::Missing => {
                    debug!(order_id = %record.counter_order_id, "counter order not tracked")
                }
                CounterOrderOutcome::AlreadyTerminal => warn!(
                    order_id = %record.counter_order_id,
                    "counter order already settled"
                ),
                CounterOrderOutcome::Decremented { remaining } => {
                    debug!(order_id = %record.counter_order_id, remaining, "counter order partially filled")
                }
                CounterOrderOutcome::Filled => {}
            },
        }

        // Re-sent on replay too; the floor tracker treats a repeated Buy as a no-op.
        queue::push_trade_event(&self.queue, &self.settings.chain, &trade).await?;
        info!(
            sell_order_id = %record.sell_order_id,
            buyer = %record.buyer,
            price = %ev.fill_price,
            "orders matched"
        );
        Ok(())
    }
}
