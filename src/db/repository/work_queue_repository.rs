use chrono::{NaiveDateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::db::models::WorkItem;
use crate::error::{AppError, AppResult};

/// Backing store for A5 (Work Queue): a priority-ordered, optionally
/// delayed (`not_before`) queue of delivery tasks, claimed atomically via
/// the same single-statement `UPDATE ... WHERE id = (SELECT ...) RETURNING`
/// pattern the teacher uses for its notification retry queue.
pub struct WorkQueueRepository;

const PRIORITY_RANK_SQL: &str = "CASE priority \
    WHEN 'critical' THEN 0 \
    WHEN 'high' THEN 1 \
    WHEN 'normal' THEN 2 \
    WHEN 'low' THEN 3 \
    ELSE 4 END";

impl WorkQueueRepository {
    pub async fn enqueue(
        tx: &mut Transaction<'_, Sqlite>,
        notification_id: &str,
        priority: &str,
        not_before: Option<NaiveDateTime>,
    ) -> AppResult<WorkItem> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, WorkItem>(
            r#"
            INSERT INTO work_queue (id, notification_id, priority, status, not_before, created_at, claimed_at)
            VALUES (?, ?, ?, 'queued', ?, ?, NULL)
            RETURNING id, notification_id, priority, status, not_before, created_at, claimed_at
            "#,
        )
        .bind(id)
        .bind(notification_id)
        .bind(priority)
        .bind(not_before)
        .bind(now)
        .fetch_one(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Also usable outside a transaction (the sweeper enqueues standalone).
    pub async fn enqueue_standalone(
        pool: &SqlitePool,
        notification_id: &str,
        priority: &str,
        not_before: Option<NaiveDateTime>,
    ) -> AppResult<WorkItem> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, WorkItem>(
            r#"
            INSERT INTO work_queue (id, notification_id, priority, status, not_before, created_at, claimed_at)
            VALUES (?, ?, ?, 'queued', ?, ?, NULL)
            RETURNING id, notification_id, priority, status, not_before, created_at, claimed_at
            "#,
        )
        .bind(id)
        .bind(notification_id)
        .bind(priority)
        .bind(not_before)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Claim up to `limit` due work items, highest priority first, oldest
    /// first within a priority tier. Loops single-row atomic claims rather
    /// than holding one long transaction.
    pub async fn claim_due(pool: &SqlitePool, limit: i64) -> AppResult<Vec<WorkItem>> {
        let mut items = Vec::new();
        if limit <= 0 {
            return Ok(items);
        }

        for _ in 0..limit {
            let now = Utc::now().naive_utc();

            let query = format!(
                r#"
                UPDATE work_queue
                SET status = 'claimed', claimed_at = ?
                WHERE id = (
                    SELECT id FROM work_queue
                    WHERE status = 'queued'
                      AND (not_before IS NULL OR not_before <= CURRENT_TIMESTAMP)
                    ORDER BY {rank} ASC, created_at ASC
                    LIMIT 1
                )
                RETURNING id, notification_id, priority, status, not_before, created_at, claimed_at
                "#,
                rank = PRIORITY_RANK_SQL
            );

            let opt = sqlx::query_as::<_, WorkItem>(&query)
                .bind(now)
                .fetch_optional(pool)
                .await
                .map_err(AppError::Database)?;

            match opt {
                Some(item) => items.push(item),
                None => break,
            }
        }

        Ok(items)
    }

    pub async fn mark_done(pool: &SqlitePool, id: &str) -> AppResult<()> {
        sqlx::query("UPDATE work_queue SET status = 'done' WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// True if any live (queued or claimed) work item exists for a
    /// notification — used by the sweeper to avoid double-enqueuing.
    pub async fn has_live_item(pool: &SqlitePool, notification_id: &str) -> AppResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM work_queue WHERE notification_id = ? AND status IN ('queued', 'claimed') LIMIT 1",
        )
        .bind(notification_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.is_some())
    }
}
