use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::NotificationStatusEvent;
use crate::error::{AppError, AppResult};

/// Backing store for C6 (Status Publisher): an append-only log of
/// notification status transitions, standing in for a partitioned status
/// topic with producer-side idempotence.
pub struct StatusRepository;

impl StatusRepository {
    pub async fn append(
        pool: &SqlitePool,
        notification_id: &str,
        status: &str,
        event_type: &str,
        channel: &str,
        user_id: &str,
    ) -> AppResult<NotificationStatusEvent> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, NotificationStatusEvent>(
            r#"
            INSERT INTO notification_status_log (id, notification_id, status, event_type, channel, user_id, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, notification_id, status, event_type, channel, user_id, published_at
            "#,
        )
        .bind(id)
        .bind(notification_id)
        .bind(status)
        .bind(event_type)
        .bind(channel)
        .bind(user_id)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
