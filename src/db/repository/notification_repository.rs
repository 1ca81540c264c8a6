use chrono::{NaiveDateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::db::models::{CreateNotification, Notification, STATUS_FAILED, STATUS_PENDING};
use crate::error::{AppError, AppResult};

/// Data access for the `notifications` table (C5 — the Notification Store).
///
/// The uniqueness constraint on `(source_event_id, channel)` is the durable
/// idempotency enforcement; `get_channels_for_event` is only an optimization
/// to avoid redundant render/insert work on redelivery.
pub struct NotificationRepository;

impl NotificationRepository {
    pub async fn create(
        tx: &mut Transaction<'_, Sqlite>,
        n: CreateNotification,
    ) -> AppResult<Notification> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let content_json = serde_json::to_string(&n.content)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("content serialize: {}", e)))?;

        let row = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (
                id, user_id, channel, priority, status,
                source_event_id, source_event_type, content,
                attempts, max_attempts, next_retry_at, created_at,
                delivered_at, failed_reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING
                id, user_id, channel, priority, status,
                source_event_id, source_event_type, content,
                attempts, max_attempts, next_retry_at, created_at,
                delivered_at, failed_reason
            "#,
        )
        .bind(&id)
        .bind(&n.user_id)
        .bind(&n.channel)
        .bind(&n.priority)
        .bind(STATUS_PENDING)
        .bind(&n.source_event_id)
        .bind(&n.source_event_type)
        .bind(content_json)
        .bind(0i32)
        .bind(n.max_attempts)
        .bind(n.next_retry_at)
        .bind(now)
        .bind::<Option<NaiveDateTime>>(None)
        .bind::<Option<String>>(None)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!(
                    "notification already exists for event {} channel {}",
                    n.source_event_id, n.channel
                ))
            }
            other => AppError::Database(other),
        })?;

        Ok(row)
    }

    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Notification>> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, channel, priority, status,
                   source_event_id, source_event_type, content,
                   attempts, max_attempts, next_retry_at, created_at,
                   delivered_at, failed_reason
            FROM notifications WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn get_channels_for_event(
        tx: &mut Transaction<'_, Sqlite>,
        source_event_id: &str,
    ) -> AppResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT channel FROM notifications WHERE source_event_id = ?")
                .bind(source_event_id)
                .fetch_all(&mut **tx)
                .await
                .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    /// Transition to `sending`. Used as the idempotency gate's commit point
    /// before a provider is ever invoked.
    pub async fn mark_sending(pool: &SqlitePool, id: &str) -> AppResult<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications SET status = 'sending' WHERE id = ?
            RETURNING
                id, user_id, channel, priority, status,
                source_event_id, source_event_type, content,
                attempts, max_attempts, next_retry_at, created_at,
                delivered_at, failed_reason
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn mark_delivered(pool: &SqlitePool, id: &str) -> AppResult<Notification> {
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications SET status = 'delivered', delivered_at = ? WHERE id = ?
            RETURNING
                id, user_id, channel, priority, status,
                source_event_id, source_event_type, content,
                attempts, max_attempts, next_retry_at, created_at,
                delivered_at, failed_reason
            "#,
        )
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Revert `sending` back to `pending` on a rate-limit denial. Does not
    /// touch `attempts` — a rate-limit denial is never counted as an attempt.
    pub async fn mark_pending(pool: &SqlitePool, id: &str) -> AppResult<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications SET status = 'pending' WHERE id = ?
            RETURNING
                id, user_id, channel, priority, status,
                source_event_id, source_event_type, content,
                attempts, max_attempts, next_retry_at, created_at,
                delivered_at, failed_reason
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Register a failed delivery attempt. Increments `attempts` and
    /// computes the resulting status server-side: `pending` with a
    /// `next_retry_at` if attempts remain, else `failed` with the reason.
    pub async fn register_failed_attempt(
        pool: &SqlitePool,
        id: &str,
        next_retry_at: NaiveDateTime,
        reason: &str,
    ) -> AppResult<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET
                attempts = attempts + 1,
                next_retry_at = ?,
                failed_reason = ?,
                status = CASE WHEN attempts + 1 >= max_attempts THEN 'failed' ELSE 'pending' END
            WHERE id = ?
            RETURNING
                id, user_id, channel, priority, status,
                source_event_id, source_event_type, content,
                attempts, max_attempts, next_retry_at, created_at,
                delivered_at, failed_reason
            "#,
        )
        .bind(next_retry_at)
        .bind(reason)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Force a terminal `failed` state regardless of remaining attempts —
    /// used when a provider reports a non-retryable outcome (e.g. invalid
    /// recipient) rather than a transient failure.
    pub async fn mark_failed_terminal(
        pool: &SqlitePool,
        id: &str,
        reason: &str,
    ) -> AppResult<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET attempts = attempts + 1, failed_reason = ?, status = 'failed'
            WHERE id = ?
            RETURNING
                id, user_id, channel, priority, status,
                source_event_id, source_event_type, content,
                attempts, max_attempts, next_retry_at, created_at,
                delivered_at, failed_reason
            "#,
        )
        .bind(reason)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Notifications eligible for a retry sweep: `pending`/`failed`,
    /// due, and not yet exhausted.
    pub async fn pending_retries(
        pool: &SqlitePool,
        now: NaiveDateTime,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, channel, priority, status,
                   source_event_id, source_event_type, content,
                   attempts, max_attempts, next_retry_at, created_at,
                   delivered_at, failed_reason
            FROM notifications
            WHERE status IN (?, ?)
              AND next_retry_at IS NOT NULL
              AND next_retry_at <= ?
              AND attempts < max_attempts
            ORDER BY next_retry_at ASC
            LIMIT ?
            "#,
        )
        .bind(STATUS_PENDING)
        .bind(STATUS_FAILED)
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Stale `pending` notifications older than `threshold_seconds` with no
    /// `next_retry_at` set — the orphan case the sweeper exists to repair
    /// (created, but the post-commit work-item enqueue never happened).
    pub async fn stale_pending_without_retry(
        pool: &SqlitePool,
        older_than: NaiveDateTime,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, channel, priority, status,
                   source_event_id, source_event_type, content,
                   attempts, max_attempts, next_retry_at, created_at,
                   delivered_at, failed_reason
            FROM notifications
            WHERE status = ?
              AND next_retry_at IS NULL
              AND created_at <= ?
            ORDER BY created_at ASC
            LIMIT ?
            "#,
        )
        .bind(STATUS_PENDING)
        .bind(older_than)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
