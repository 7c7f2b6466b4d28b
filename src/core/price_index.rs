#![forbid(unsafe_code)]

use std::collections::HashMap;

use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub order_id: String,
    pub priority: Decimal,
    pub maker: String,
    pub token_id: String,
}

/// Bounded per-collection price index. `entries` stays sorted ascending by
/// price; `orders` maps every present order id to its price so lookups by id
/// land on the right run of equal prices.
#[derive(Debug, Clone)]
pub struct PriorityQueueMap {
    entries: Vec<Entry>,
    orders: HashMap<String, Decimal>,
    max_len: usize,
}

impl PriorityQueueMap {
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: Vec::new(),
            orders: HashMap::new(),
            max_len,
        }
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.orders.contains_key(order_id)
    }

    /// Evicts the highest-priced entry once the index has grown past
    /// `max_len`, then inserts in price order. Re-adding an id replaces it.
    pub fn add(&mut self, order_id: &str, price: Decimal, maker: &str, token_id: &str) {
        if self.orders.contains_key(order_id) {
            self.remove(order_id);
        }
        if self.entries.len() > self.max_len {
            if let Some(worst) = self.entries.pop() {
                self.orders.remove(&worst.order_id);
            }
        }

        let at = self.entries.partition_point(|e| e.priority <= price);
        self.entries.insert(
            at,
            Entry {
                order_id: order_id.to_string(),
                priority: price,
                maker: maker.to_lowercase(),
                token_id: token_id.to_lowercase(),
            },
        );
        self.orders.insert(order_id.to_string(), price);
    }

    pub fn min(&self) -> Option<&Entry> {
        self.entries.first()
    }

    pub fn max(&self) -> Option<&Entry> {
        self.entries.last()
    }

    pub fn min_price(&self) -> Decimal {
        self.min().map(|e| e.priority).unwrap_or(Decimal::ZERO)
    }

    pub fn max_price(&self) -> Decimal {
        self.max().map(|e| e.priority).unwrap_or(Decimal::ZERO)
    }

    pub fn remove(&mut self, order_id: &str) -> bool {
        let Some(price) = self.orders.remove(order_id) else {
            return false;
        };
        let start = self.entries.partition_point(|e| e.priority < price);
        let found = self.entries[start..]
            .iter()
            .take_while(|e| e.priority == price)
            .position(|e| e.order_id == order_id);
        if let Some(offset) = found {
            self.entries.remove(start + offset);
        }
        true
    }

    pub fn remove_maker_orders(&mut self, maker: &str, token_id: &str) -> usize {
        let maker = maker.to_lowercase();
        let token_id = token_id.to_lowercase();
        let before = self.entries.len();
        let orders = &mut self.orders;
        self.entries.retain(|e| {
            if e.maker == maker && e.token_id == token_id {
                orders.remove(&e.order_id);
                false
            } else {
                true
            }
        });
        before - self.entries.len()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
}
