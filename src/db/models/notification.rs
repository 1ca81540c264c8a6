use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const CHANNEL_EMAIL: &str = "email";
pub const CHANNEL_SMS: &str = "sms";
pub const CHANNEL_PUSH: &str = "push";
pub const ALL_CHANNELS: &[&str] = &[CHANNEL_EMAIL, CHANNEL_SMS, CHANNEL_PUSH];

pub const PRIORITY_LOW: &str = "low";
pub const PRIORITY_NORMAL: &str = "normal";
pub const PRIORITY_HIGH: &str = "high";
pub const PRIORITY_CRITICAL: &str = "critical";

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_SENDING: &str = "sending";
pub const STATUS_DELIVERED: &str = "delivered";
pub const STATUS_FAILED: &str = "failed";

/// One materialization of a domain event for one channel for one user.
///
/// `(source_event_id, channel)` is the idempotency key, enforced by a unique
/// index — the in-memory channel check in the event processor is an
/// optimization, not the source of truth.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub channel: String,
    pub priority: String,
    pub status: String,
    pub source_event_id: String,
    pub source_event_type: String,
    /// JSON-encoded `{body, subject?}` map.
    pub content: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub delivered_at: Option<NaiveDateTime>,
    pub failed_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationContent {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub user_id: String,
    pub channel: String,
    pub priority: String,
    pub source_event_id: String,
    pub source_event_type: String,
    pub content: NotificationContent,
    pub max_attempts: i32,
    pub next_retry_at: Option<NaiveDateTime>,
}
