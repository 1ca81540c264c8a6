use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Managed externally (seeded via migration); the core only reads these.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub id: String,
    pub event_type: String,
    pub channel: String,
    pub subject_template: Option<String>,
    pub body_template: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
