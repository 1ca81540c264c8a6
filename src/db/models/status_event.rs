use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An append-only record of a notification status transition, the
/// SQLite-backed stand-in for a partitioned status topic. Downstream
/// consumers (out of scope here) are expected to deduplicate by
/// `(notification_id, status)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationStatusEvent {
    pub id: String,
    pub notification_id: String,
    pub status: String,
    pub event_type: String,
    pub channel: String,
    pub user_id: String,
    pub published_at: NaiveDateTime,
}
