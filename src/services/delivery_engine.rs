use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db::models::notification::{STATUS_DELIVERED, STATUS_FAILED};
use crate::db::models::{Notification, NotificationContent};
use crate::db::repository::NotificationRepository;
use crate::error::{AppError, AppResult};
use crate::services::providers::ProviderRegistry;
use crate::services::rate_limiter::RateLimit;
use crate::services::status_publisher::StatusPublisher;
use crate::services::work_queue::WorkQueue;

/// C8 — the per-notification state machine. One call to `process` handles
/// exactly one claimed work item end to end: idempotency gate, rate-limit
/// gate, provider call, and the success/failure/requeue transitions.
pub struct DeliveryEngine {
    pool: SqlitePool,
    providers: Arc<ProviderRegistry>,
    rate_limiter: Arc<dyn RateLimit>,
    work_queue: Arc<WorkQueue>,
    status_publisher: Arc<StatusPublisher>,
    config: Config,
}

impl DeliveryEngine {
    pub fn new(
        pool: SqlitePool,
        providers: Arc<ProviderRegistry>,
        rate_limiter: Arc<dyn RateLimit>,
        work_queue: Arc<WorkQueue>,
        status_publisher: Arc<StatusPublisher>,
        config: Config,
    ) -> Self {
        Self {
            pool,
            providers,
            rate_limiter,
            work_queue,
            status_publisher,
            config,
        }
    }

    pub async fn process(&self, notification_id: &str) -> AppResult<()> {
        let Some(notification) = NotificationRepository::get_by_id(&self.pool, notification_id).await? else {
            tracing::warn!(notification_id, "claimed work item has no notification, dropping");
            return Ok(());
        };

        // Idempotency gate: a notification already in a terminal state needs
        // no further work. This can legitimately happen if the same work
        // item was double-claimed before the queue mark-done landed.
        if notification.status == STATUS_DELIVERED || notification.status == STATUS_FAILED {
            return Ok(());
        }

        NotificationRepository::mark_sending(&self.pool, &notification.id).await?;

        if !self.rate_limiter.acquire(&notification.channel).await {
            NotificationRepository::mark_pending(&self.pool, &notification.id).await?;
            let not_before = Utc::now().naive_utc()
                + chrono::Duration::seconds(self.config.delivery.rate_limit_retry_seconds as i64);
            self.work_queue
                .enqueue_standalone(&notification.id, &notification.priority, Some(not_before))
                .await?;
            return Ok(());
        }

        let content: NotificationContent = serde_json::from_str(&notification.content)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("stored content corrupt: {}", e)))?;

        let provider = self.providers.get(&notification.channel)?;
        let timeout = Duration::from_secs(self.config.delivery.provider_timeout_seconds);
        let outcome = tokio::time::timeout(timeout, provider.send(&notification.user_id, &content)).await;

        match outcome {
            Ok(result) if result.success => {
                NotificationRepository::mark_delivered(&self.pool, &notification.id).await?;
                self.publish_status(&notification, STATUS_DELIVERED).await?;
            }
            Ok(result) => {
                self.handle_failure(&notification, result.details, result.retryable)
                    .await?;
            }
            Err(_) => {
                self.handle_failure(&notification, "provider call timed out".to_string(), true)
                    .await?;
            }
        }

        Ok(())
    }

    async fn handle_failure(
        &self,
        notification: &Notification,
        reason: String,
        retryable: bool,
    ) -> AppResult<()> {
        let next_attempt = notification.attempts + 1;

        if !retryable {
            NotificationRepository::mark_failed_terminal(&self.pool, &notification.id, &reason).await?;
            self.publish_status(notification, STATUS_FAILED).await?;
            return Ok(());
        }

        if next_attempt >= notification.max_attempts {
            let next_retry_at = Utc::now().naive_utc();
            NotificationRepository::register_failed_attempt(&self.pool, &notification.id, next_retry_at, &reason)
                .await?;
            self.publish_status(notification, STATUS_FAILED).await?;
            return Ok(());
        }

        let backoff = self.config.delivery.backoff_for_attempt(next_attempt as u32);
        let next_retry_at = Utc::now().naive_utc() + chrono::Duration::seconds(backoff as i64);

        NotificationRepository::register_failed_attempt(&self.pool, &notification.id, next_retry_at, &reason).await?;
        self.work_queue
            .enqueue_standalone(&notification.id, &notification.priority, Some(next_retry_at))
            .await?;

        Ok(())
    }

    async fn publish_status(&self, notification: &Notification, status: &str) -> AppResult<()> {
        self.status_publisher
            .publish(
                &notification.id,
                status,
                &notification.source_event_type,
                &notification.channel,
                &notification.user_id,
            )
            .await
    }
}
