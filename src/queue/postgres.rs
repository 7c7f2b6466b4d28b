#![forbid(unsafe_code)]

use sqlx::{PgPool, Row};

use crate::queue::{DurableQueue, QueueError};

/// Queue on the `queue_messages` table. Concurrent consumers never receive
/// the same row because the pop skips locked rows.
#[derive(Debug, Clone)]
pub struct PgQueue {
    pool: PgPool,
}

impl PgQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DurableQueue for PgQueue {
    async fn push(&self, key: &str, payload: String) -> Result<(), QueueError> {
        sqlx::query("INSERT INTO queue_messages (queue_key, payload) VALUES ($1, $2)")
            .bind(key)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Option<String>, QueueError> {
        let row = sqlx::query(
            r#"
            DELETE FROM queue_messages
            WHERE id = (
                SELECT id FROM queue_messages
                WHERE queue_key = $1
                ORDER BY id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING payload
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("payload")))
    }
}
