use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const WORK_STATUS_QUEUED: &str = "queued";
pub const WORK_STATUS_CLAIMED: &str = "claimed";
pub const WORK_STATUS_DONE: &str = "done";

/// A queued delivery task carrying a `notification_id`. This is the
/// SQLite-backed stand-in for a delayed-dispatch work-queue item (a real
/// deployment might instead push to Celery/SQS with an ETA); the delivery
/// engine claims rows from this table atomically.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub notification_id: String,
    pub priority: String,
    pub status: String,
    pub not_before: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub claimed_at: Option<NaiveDateTime>,
}
