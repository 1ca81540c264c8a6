use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::{ConsumerOffset, DomainEventRecord};
use crate::error::{AppError, AppResult};

/// Backing store for A4 (Domain Event Log): an append-only log plus
/// per-`(consumer_group, partition_key)` committed offsets, standing in for
/// a partitioned, replayable commit log.
pub struct DomainEventRepository;

impl DomainEventRepository {
    pub async fn append(
        pool: &SqlitePool,
        partition_key: &str,
        event_type: &str,
        payload: &str,
        occurred_at: DateTime<Utc>,
    ) -> AppResult<DomainEventRecord> {
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, DomainEventRecord>(
            r#"
            INSERT INTO domain_events (partition_key, event_type, payload, occurred_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING "offset", partition_key, event_type, payload, occurred_at, created_at
            "#,
        )
        .bind(partition_key)
        .bind(event_type)
        .bind(payload)
        .bind(occurred_at.naive_utc())
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Next unconsumed event for a partition key, strictly after the
    /// consumer group's committed offset — preserves per-partition-key
    /// ordering the way a Kafka consumer group would.
    pub async fn next_after_offset(
        pool: &SqlitePool,
        consumer_group: &str,
        partition_key: &str,
    ) -> AppResult<Option<DomainEventRecord>> {
        let committed = Self::committed_offset(pool, consumer_group, partition_key).await?;

        let row = sqlx::query_as::<_, DomainEventRecord>(
            r#"
            SELECT "offset", partition_key, event_type, payload, occurred_at, created_at
            FROM domain_events
            WHERE partition_key = ? AND "offset" > ?
            ORDER BY "offset" ASC
            LIMIT 1
            "#,
        )
        .bind(partition_key)
        .bind(committed)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn committed_offset(
        pool: &SqlitePool,
        consumer_group: &str,
        partition_key: &str,
    ) -> AppResult<i64> {
        let row: Option<ConsumerOffset> = sqlx::query_as(
            r#"
            SELECT consumer_group, partition_key, last_committed_offset
            FROM consumer_offsets WHERE consumer_group = ? AND partition_key = ?
            "#,
        )
        .bind(consumer_group)
        .bind(partition_key)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(|r| r.last_committed_offset).unwrap_or(0))
    }

    pub async fn commit_offset(
        pool: &SqlitePool,
        consumer_group: &str,
        partition_key: &str,
        offset: i64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO consumer_offsets (consumer_group, partition_key, last_committed_offset)
            VALUES (?, ?, ?)
            ON CONFLICT (consumer_group, partition_key)
            DO UPDATE SET last_committed_offset = excluded.last_committed_offset
            "#,
        )
        .bind(consumer_group)
        .bind(partition_key)
        .bind(offset)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// All partition keys known to the log, used by the event processor to
    /// round-robin poll without a real broker telling it which keys exist.
    pub async fn known_partition_keys(pool: &SqlitePool) -> AppResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT partition_key FROM domain_events")
                .fetch_all(pool)
                .await
                .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(|(k,)| k).collect())
    }
}
