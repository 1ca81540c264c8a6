use chrono::NaiveDateTime;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::db::models::WorkItem;
use crate::db::repository::WorkQueueRepository;
use crate::error::AppResult;

/// Priority-ordered queue of delivery work, standing in for Celery's
/// per-priority routing keys.
pub struct WorkQueue {
    pool: SqlitePool,
}

impl WorkQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        notification_id: &str,
        priority: &str,
        not_before: Option<NaiveDateTime>,
    ) -> AppResult<WorkItem> {
        WorkQueueRepository::enqueue(tx, notification_id, priority, not_before).await
    }

    pub async fn enqueue_standalone(
        &self,
        notification_id: &str,
        priority: &str,
        not_before: Option<NaiveDateTime>,
    ) -> AppResult<WorkItem> {
        WorkQueueRepository::enqueue_standalone(&self.pool, notification_id, priority, not_before).await
    }

    pub async fn claim_due(&self, limit: i64) -> AppResult<Vec<WorkItem>> {
        WorkQueueRepository::claim_due(&self.pool, limit).await
    }

    pub async fn mark_done(&self, id: &str) -> AppResult<()> {
        WorkQueueRepository::mark_done(&self.pool, id).await
    }

    pub async fn has_live_item(&self, notification_id: &str) -> AppResult<bool> {
        WorkQueueRepository::has_live_item(&self.pool, notification_id).await
    }
}
