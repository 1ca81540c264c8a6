use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::DomainEventRecord;
use crate::db::repository::DomainEventRepository;
use crate::error::AppResult;

/// Durable, replayable append-only log of domain events, partitioned by key
/// (here, the originating user id) so ordering is preserved per entity the
/// way a Kafka partition would preserve it.
pub struct EventLog {
    pool: SqlitePool,
}

impl EventLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        partition_key: &str,
        event_type: &str,
        payload: &str,
        occurred_at: DateTime<Utc>,
    ) -> AppResult<DomainEventRecord> {
        DomainEventRepository::append(&self.pool, partition_key, event_type, payload, occurred_at).await
    }

    pub async fn next_after_offset(
        &self,
        consumer_group: &str,
        partition_key: &str,
    ) -> AppResult<Option<DomainEventRecord>> {
        DomainEventRepository::next_after_offset(&self.pool, consumer_group, partition_key).await
    }

    pub async fn commit_offset(
        &self,
        consumer_group: &str,
        partition_key: &str,
        offset: i64,
    ) -> AppResult<()> {
        DomainEventRepository::commit_offset(&self.pool, consumer_group, partition_key, offset).await
    }

    pub async fn known_partition_keys(&self) -> AppResult<Vec<String>> {
        DomainEventRepository::known_partition_keys(&self.pool).await
    }

    /// Cheap reachability probe for the health endpoint.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
