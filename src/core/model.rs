#![forbid(unsafe_code)]

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Listing,
    CollectionBid,
    ItemBid,
}

impl OrderType {
    pub fn code(self) -> i16 {
        match self {
            OrderType::Listing => 1,
            OrderType::CollectionBid => 2,
            OrderType::ItemBid => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(OrderType::Listing),
            2 => Some(OrderType::CollectionBid),
            3 => Some(OrderType::ItemBid),
            _ => None,
        }
    }
}

/// `Active` is the only non-terminal state. Every transition out of it is
/// guarded in the store so `Filled`, `Cancelled` and `Expired` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Active,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn code(self) -> i16 {
        match self {
            OrderStatus::Active => 1,
            OrderStatus::Filled => 2,
            OrderStatus::Cancelled => 3,
            OrderStatus::Expired => 4,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(OrderStatus::Active),
            2 => Some(OrderStatus::Filled),
            3 => Some(OrderStatus::Cancelled),
            4 => Some(OrderStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Sale,
    Listing,
    ItemBid,
    CollectionBid,
    CancelListing,
    CancelItemBid,
    CancelCollectionBid,
}

impl ActivityType {
    pub fn code(self) -> i16 {
        match self {
            ActivityType::Sale => 1,
            ActivityType::Listing => 2,
            ActivityType::ItemBid => 3,
            ActivityType::CollectionBid => 4,
            ActivityType::CancelListing => 5,
            ActivityType::CancelItemBid => 6,
            ActivityType::CancelCollectionBid => 7,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(ActivityType::Sale),
            2 => Some(ActivityType::Listing),
            3 => Some(ActivityType::ItemBid),
            4 => Some(ActivityType::CollectionBid),
            5 => Some(ActivityType::CancelListing),
            6 => Some(ActivityType::CancelItemBid),
            7 => Some(ActivityType::CancelCollectionBid),
            _ => None,
        }
    }

    pub fn for_make(order_type: OrderType) -> Self {
        match order_type {
            OrderType::Listing => ActivityType::Listing,
            OrderType::ItemBid => ActivityType::ItemBid,
            OrderType::CollectionBid => ActivityType::CollectionBid,
        }
    }

    pub fn for_cancel(order_type: OrderType) -> Self {
        match order_type {
            OrderType::Listing => ActivityType::CancelListing,
            OrderType::ItemBid => ActivityType::CancelItemBid,
            OrderType::CollectionBid => ActivityType::CancelCollectionBid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub order_id: String,
    pub collection_address: String,
    pub token_id: String,
    pub order_type: OrderType,
    pub order_status: OrderStatus,
    pub price: Decimal,
    pub currency_address: String,
    pub size: i64,
    pub quantity_remaining: i64,
    pub salt: Decimal,
    pub maker: String,
    pub taker: String,
    pub expire_time: i64,
    pub event_time: i64,
}

/// Append-only history row. `(tx_hash, log_index)` identifies the chain log
/// that produced it and makes inserts conflict-ignoring on replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub activity_type: ActivityType,
    pub maker: String,
    pub taker: String,
    pub collection_address: String,
    pub token_id: String,
    pub currency_address: String,
    pub price: Decimal,
    pub block_number: i64,
    pub tx_hash: String,
    pub log_index: i64,
    pub event_time: i64,
}

/// Narrow projection of an `Active` order row, keyed by the table's primary key
/// so the startup reload can page in id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveOrder {
    pub id: i64,
    pub order_id: String,
    pub collection_address: String,
    pub token_id: String,
    pub order_type: OrderType,
    pub maker: String,
    pub price: Decimal,
    pub expire_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorPrice {
    pub collection_address: String,
    pub price: Decimal,
    pub event_time: i64,
}

/// Everything a match needs to apply in one store transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub sell_order_id: String,
    pub counter_order_id: String,
    pub buyer: String,
    pub collection_address: String,
    pub token_id: String,
    pub sale: Activity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOrderOutcome {
    Decremented { remaining: i64 },
    Filled,
    Missing,
    AlreadyTerminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The sale for this log was recorded by an earlier run.
    AlreadyApplied,
    Applied { counter: CounterOrderOutcome },
}

/// New-order hand-off from the indexer to the order manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingInfo {
    pub expire_in: i64,
    pub order_id: String,
    pub collection_addr: String,
    pub token_id: String,
    pub price: Decimal,
    pub maker: String,
    #[serde(default = "default_listing_order_type")]
    pub order_type: OrderType,
}

fn default_listing_order_type() -> OrderType {
    OrderType::Listing
}

impl ListingInfo {
    pub fn from_order(order: &Order) -> Self {
        Self {
            expire_in: order.expire_time,
            order_id: order.order_id.clone(),
            collection_addr: order.collection_address.clone(),
            token_id: order.token_id.clone(),
            price: order.price,
            maker: order.maker.clone(),
            order_type: order.order_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeEventType {
    Listing,
    Buy,
    Cancel,
    Expired,
    UpdateCollection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub event_type: TradeEventType,
    pub collection_addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl TradeEvent {
    pub fn new(event_type: TradeEventType, collection_addr: impl Into<String>) -> Self {
        Self {
            event_type,
            collection_addr: collection_addr.into(),
            order_id: None,
            token_id: None,
            price: None,
            from: None,
            to: None,
        }
    }

    pub fn order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn token(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }

    pub fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn from_addr(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn to_addr(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }
}
