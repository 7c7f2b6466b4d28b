#![forbid(unsafe_code)]

use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::core::model::{
    Activity, ActiveOrder, CounterOrderOutcome, FloorPrice, MatchOutcome, MatchRecord, Order,
    OrderStatus, OrderType,
};
use crate::core::unix_now;
use crate::store::{OrderStore, StoreError, WRITE_BATCH_SIZE, table_suffix};

const ORDER_COLUMNS: &str = "order_id, collection_address, token_id, order_type, order_status, \
     price, currency_address, size, quantity_remaining, salt, maker, taker, expire_time, event_time";

#[derive(Debug, Clone)]
struct Tables {
    order: String,
    activity: String,
    item: String,
    floor: String,
}

impl Tables {
    fn for_chain(chain: &str) -> Self {
        let suffix = table_suffix(chain);
        Self {
            order: format!("ob_order_{suffix}"),
            activity: format!("ob_activity_{suffix}"),
            item: format!("ob_item_{suffix}"),
            floor: format!("ob_collection_floor_price_{suffix}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
    tables: Tables,
}

impl PgOrderStore {
    pub fn new(pool: PgPool, chain: &str) -> Self {
        Self {
            pool,
            tables: Tables::for_chain(chain),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_i64(label: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Malformed(format!("{label} out of range: {value}")))
}

fn order_type_of(code: i16) -> Result<OrderType, StoreError> {
    OrderType::from_code(code).ok_or_else(|| StoreError::Malformed(format!("order_type {code}")))
}

fn row_to_order(r: &PgRow) -> Result<Order, StoreError> {
    let status: i16 = r.try_get("order_status")?;
    Ok(Order {
        order_id: r.try_get("order_id")?,
        collection_address: r.try_get("collection_address")?,
        token_id: r.try_get("token_id")?,
        order_type: order_type_of(r.try_get("order_type")?)?,
        order_status: OrderStatus::from_code(status)
            .ok_or_else(|| StoreError::Malformed(format!("order_status {status}")))?,
        price: r.try_get("price")?,
        currency_address: r.try_get("currency_address")?,
        size: r.try_get("size")?,
        quantity_remaining: r.try_get("quantity_remaining")?,
        salt: r.try_get("salt")?,
        maker: r.try_get("maker")?,
        taker: r.try_get("taker")?,
        expire_time: r.try_get("expire_time")?,
        event_time: r.try_get("event_time")?,
    })
}

fn row_to_active(r: &PgRow) -> Result<ActiveOrder, StoreError> {
    Ok(ActiveOrder {
        id: r.try_get("id")?,
        order_id: r.try_get("order_id")?,
        collection_address: r.try_get("collection_address")?,
        token_id: r.try_get("token_id")?,
        order_type: order_type_of(r.try_get("order_type")?)?,
        maker: r.try_get("maker")?,
        price: r.try_get("price")?,
        expire_time: r.try_get("expire_time")?,
    })
}

fn push_activity_insert<'a>(qb: &mut QueryBuilder<'a, Postgres>, table: &str, a: &'a Activity) {
    qb.push(format!(
        "INSERT INTO {table} (activity_type, maker, taker, collection_address, token_id, \
         currency_address, price, block_number, tx_hash, log_index, event_time) "
    ));
    qb.push_values(std::iter::once(a), |mut b, a| {
        b.push_bind(a.activity_type.code())
            .push_bind(&a.maker)
            .push_bind(&a.taker)
            .push_bind(&a.collection_address)
            .push_bind(&a.token_id)
            .push_bind(&a.currency_address)
            .push_bind(a.price)
            .push_bind(a.block_number)
            .push_bind(&a.tx_hash)
            .push_bind(a.log_index)
            .push_bind(a.event_time);
    });
    qb.push(" ON CONFLICT (tx_hash, log_index) DO NOTHING");
}

impl OrderStore for PgOrderStore {
    async fn last_indexed_block(&self, chain_id: i64, index_type: i32) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT last_indexed_block FROM ob_indexed_status WHERE chain_id = $1 AND index_type = $2",
        )
        .bind(chain_id)
        .bind(index_type)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Err(StoreError::MissingCheckpoint {
                chain_id,
                index_type,
            });
        };
        let block: i64 = row.try_get("last_indexed_block")?;
        u64::try_from(block)
            .map_err(|_| StoreError::Malformed(format!("negative checkpoint {block}")))
    }

    async fn set_last_indexed_block(
        &self,
        chain_id: i64,
        index_type: i32,
        block: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ob_indexed_status (chain_id, index_type, last_indexed_block, update_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (chain_id, index_type) DO UPDATE
            SET last_indexed_block = GREATEST(ob_indexed_status.last_indexed_block, EXCLUDED.last_indexed_block),
                update_time = EXCLUDED.update_time
            "#,
        )
        .bind(chain_id)
        .bind(index_type)
        .bind(to_i64("block", block)?)
        .bind(unix_now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<bool, StoreError> {
        let sql = format!(
            "INSERT INTO {} ({ORDER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (order_id) DO NOTHING",
            self.tables.order
        );
        let done = sqlx::query(&sql)
            .bind(&order.order_id)
            .bind(&order.collection_address)
            .bind(&order.token_id)
            .bind(order.order_type.code())
            .bind(order.order_status.code())
            .bind(order.price)
            .bind(&order.currency_address)
            .bind(order.size)
            .bind(order.quantity_remaining)
            .bind(order.salt)
            .bind(&order.maker)
            .bind(&order.taker)
            .bind(order.expire_time)
            .bind(order.event_time)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM {} WHERE order_id = $1",
            self.tables.order
        );
        let row = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_order).transpose()
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE {} SET order_status = $1 WHERE order_id = $2 AND order_status = $3",
            self.tables.order
        );
        let done = sqlx::query(&sql)
            .bind(OrderStatus::Cancelled.code())
            .bind(order_id)
            .bind(OrderStatus::Active.code())
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn expire_order(&self, order_id: &str) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE {} SET order_status = $1 WHERE order_id = $2 AND order_status = $3",
            self.tables.order
        );
        let done = sqlx::query(&sql)
            .bind(OrderStatus::Expired.code())
            .bind(order_id)
            .bind(OrderStatus::Active.code())
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn expire_orders(&self, ids: &[i64]) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE {} SET order_status = $1 WHERE id = ANY($2) AND order_status = $3",
            self.tables.order
        );
        let mut total = 0;
        for chunk in ids.chunks(WRITE_BATCH_SIZE) {
            let done = sqlx::query(&sql)
                .bind(OrderStatus::Expired.code())
                .bind(chunk)
                .bind(OrderStatus::Active.code())
                .execute(&self.pool)
                .await?;
            total += done.rows_affected();
        }
        Ok(total)
    }

    async fn active_orders_page(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<ActiveOrder>, StoreError> {
        let sql = format!(
            "SELECT id, order_id, collection_address, token_id, order_type, maker, price, expire_time \
             FROM {} WHERE order_status = $1 AND id > $2 ORDER BY id ASC LIMIT $3",
            self.tables.order
        );
        let rows = sqlx::query(&sql)
            .bind(OrderStatus::Active.code())
            .bind(after_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_active).collect()
    }

    async fn active_listings(
        &self,
        collection: &str,
        now: i64,
        limit: i64,
    ) -> Result<Vec<ActiveOrder>, StoreError> {
        let sql = format!(
            r#"
            SELECT o.id, o.order_id, o.collection_address, o.token_id, o.order_type, o.maker,
                   o.price, o.expire_time
            FROM {order} o
            LEFT JOIN {item} i
              ON i.collection_address = o.collection_address AND i.token_id = o.token_id
            WHERE o.collection_address = $1
              AND o.order_type = $2
              AND o.order_status = $3
              AND o.expire_time > $4
              AND (i.owner IS NULL OR i.owner = o.maker)
            ORDER BY o.price ASC, o.id ASC
            LIMIT $5
            "#,
            order = self.tables.order,
            item = self.tables.item,
        );
        let rows = sqlx::query(&sql)
            .bind(collection.to_lowercase())
            .bind(OrderType::Listing.code())
            .bind(OrderStatus::Active.code())
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_active).collect()
    }

    async fn insert_activity(&self, activity: &Activity) -> Result<bool, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_activity_insert(&mut qb, &self.tables.activity, activity);
        let done = qb.build().execute(&self.pool).await?;
        Ok(done.rows_affected() == 1)
    }

    async fn apply_match(&self, record: &MatchRecord) -> Result<MatchOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut qb = QueryBuilder::<Postgres>::new("");
        push_activity_insert(&mut qb, &self.tables.activity, &record.sale);
        let sale = qb.build().execute(&mut *tx).await?;
        if sale.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(MatchOutcome::AlreadyApplied);
        }

        let fill = format!(
            "UPDATE {} SET order_status = $1, quantity_remaining = 0, taker = $2 \
             WHERE order_id = $3 AND order_status = $4",
            self.tables.order
        );
        sqlx::query(&fill)
            .bind(OrderStatus::Filled.code())
            .bind(&record.buyer)
            .bind(&record.sell_order_id)
            .bind(OrderStatus::Active.code())
            .execute(&mut *tx)
            .await?;

        let lookup = format!(
            "SELECT quantity_remaining, order_status FROM {} WHERE order_id = $1 FOR UPDATE",
            self.tables.order
        );
        let counter_row = sqlx::query(&lookup)
            .bind(&record.counter_order_id)
            .fetch_optional(&mut *tx)
            .await?;
        let counter = match counter_row {
            None => CounterOrderOutcome::Missing,
            Some(row) => {
                let remaining: i64 = row.try_get("quantity_remaining")?;
                let status: i16 = row.try_get("order_status")?;
                if status != OrderStatus::Active.code() {
                    CounterOrderOutcome::AlreadyTerminal
                } else if remaining > 1 {
                    let sql = format!(
                        "UPDATE {} SET quantity_remaining = $1 WHERE order_id = $2",
                        self.tables.order
                    );
                    sqlx::query(&sql)
                        .bind(remaining - 1)
                        .bind(&record.counter_order_id)
                        .execute(&mut *tx)
                        .await?;
                    CounterOrderOutcome::Decremented {
                        remaining: remaining - 1,
                    }
                } else {
                    let sql = format!(
                        "UPDATE {} SET order_status = $1, quantity_remaining = 0 WHERE order_id = $2",
                        self.tables.order
                    );
                    sqlx::query(&sql)
                        .bind(OrderStatus::Filled.code())
                        .bind(&record.counter_order_id)
                        .execute(&mut *tx)
                        .await?;
                    CounterOrderOutcome::Filled
                }
            }
        };

        let owner = format!(
            "INSERT INTO {} (collection_address, token_id, owner, update_time) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (collection_address, token_id) DO UPDATE \
             SET owner = EXCLUDED.owner, update_time = EXCLUDED.update_time",
            self.tables.item
        );
        sqlx::query(&owner)
            .bind(record.collection_address.to_lowercase())
            .bind(&record.token_id)
            .bind(record.buyer.to_lowercase())
            .bind(record.sale.event_time)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(MatchOutcome::Applied { counter })
    }

    async fn query_collection_floor_prices(&self, now: i64) -> Result<Vec<FloorPrice>, StoreError> {
        let sql = format!(
            r#"
            SELECT o.collection_address, MIN(o.price) AS price
            FROM {order} o
            LEFT JOIN {item} i
              ON i.collection_address = o.collection_address AND i.token_id = o.token_id
            WHERE o.order_type = $1
              AND o.order_status = $2
              AND o.expire_time > $3
              AND (i.owner IS NULL OR i.owner = o.maker)
            GROUP BY o.collection_address
            "#,
            order = self.tables.order,
            item = self.tables.item,
        );
        let rows = sqlx::query(&sql)
            .bind(OrderType::Listing.code())
            .bind(OrderStatus::Active.code())
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| -> Result<FloorPrice, StoreError> {
                let price: Decimal = r.try_get("price")?;
                Ok(FloorPrice {
                    collection_address: r.try_get("collection_address")?,
                    price,
                    event_time: now,
                })
            })
            .collect()
    }

    async fn persist_floor_prices(&self, prices: &[FloorPrice]) -> Result<(), StoreError> {
        for chunk in prices.chunks(WRITE_BATCH_SIZE) {
            let mut qb = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {} (collection_address, price, event_time) ",
                self.tables.floor
            ));
            qb.push_values(chunk, |mut b, p| {
                b.push_bind(&p.collection_address)
                    .push_bind(p.price)
                    .push_bind(p.event_time);
            });
            qb.push(
                " ON CONFLICT (collection_address, event_time) DO UPDATE SET price = EXCLUDED.price",
            );
            qb.build().execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn delete_floor_prices_before(&self, cutoff: i64) -> Result<u64, StoreError> {
        let sql = format!("DELETE FROM {} WHERE event_time < $1", self.tables.floor);
        let done = sqlx::query(&sql).bind(cutoff).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }
}
