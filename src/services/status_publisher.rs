use sqlx::SqlitePool;

use crate::db::repository::StatusRepository;
use crate::error::AppResult;

/// Publishes notification status transitions. Backed by an append-only
/// table standing in for a partitioned status topic — consumers replay it
/// the same way they'd replay a Kafka topic.
pub struct StatusPublisher {
    pool: SqlitePool,
}

impl StatusPublisher {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn publish(
        &self,
        notification_id: &str,
        status: &str,
        event_type: &str,
        channel: &str,
        user_id: &str,
    ) -> AppResult<()> {
        StatusRepository::append(&self.pool, notification_id, status, event_type, channel, user_id)
            .await?;
        Ok(())
    }
}
