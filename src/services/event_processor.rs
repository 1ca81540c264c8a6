use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::db::models::{CreateNotification, NotificationContent};
use crate::db::repository::{NotificationRepository, PreferenceRepository, TemplateRepository};
use crate::error::{AppError, AppResult};
use crate::events::{parse_event, DomainEvent, RawEvent};
use crate::services::priority::priority_for_event_type;
use crate::services::quiet_hours::calculate_eta;
use crate::services::renderer;
use crate::services::status_publisher::StatusPublisher;
use crate::services::work_queue::WorkQueue;

pub const CONSUMER_GROUP: &str = "event-processor";

/// C7 — consumes the domain event log, fans a single event out into zero or
/// more per-channel notifications, and enqueues delivery work for each one.
///
/// Mirrors the original handler's step order exactly: idempotency check,
/// preference lookup (creating defaults on first contact), template lookup,
/// per-channel render + quiet-hours scheduling + insert, all inside one
/// transaction; status events publish only after that transaction commits.
pub struct EventProcessor {
    pool: SqlitePool,
    work_queue: Arc<WorkQueue>,
    status_publisher: Arc<StatusPublisher>,
    config: Config,
}

impl EventProcessor {
    pub fn new(
        pool: SqlitePool,
        work_queue: Arc<WorkQueue>,
        status_publisher: Arc<StatusPublisher>,
        config: Config,
    ) -> Self {
        Self {
            pool,
            work_queue,
            status_publisher,
            config,
        }
    }

    /// Handle one raw event. Errors classified as non-retryable by
    /// `AppError::is_retryable` (unknown type, malformed payload) should be
    /// logged and committed past by the caller without counting toward the
    /// poison-pill threshold; everything else is retryable.
    pub async fn handle(&self, raw: RawEvent) -> AppResult<()> {
        let event = parse_event(raw)?;
        let priority = priority_for_event_type(event.event_type());
        let source_event_id = event.event_id().to_string();
        let user_id = event.user_id().to_string();
        let context = event.render_context();

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let existing_channels = NotificationRepository::get_channels_for_event(&mut tx, &source_event_id).await?;
        let preference = PreferenceRepository::get_or_create_default(&mut tx, &user_id).await?;
        let enabled: Vec<String> = preference.enabled_channels();
        let templates = TemplateRepository::active_templates_for_event(&self.pool, event.event_type()).await?;

        let now = chrono::Utc::now();
        let eta = calculate_eta(&preference, now);

        let mut created = Vec::new();

        for template in templates {
            if existing_channels.contains(&template.channel) {
                continue;
            }
            if !enabled.contains(&template.channel) {
                continue;
            }

            let body = match renderer::render(&template.body_template, &context) {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(
                        event_id = %source_event_id,
                        channel = %template.channel,
                        error = %e,
                        "template render failed, skipping channel"
                    );
                    continue;
                }
            };
            let subject = match &template.subject_template {
                Some(subject_template) => match renderer::render(subject_template, &context) {
                    Ok(s) => Some(s),
                    Err(e) => {
                        tracing::warn!(
                            event_id = %source_event_id,
                            channel = %template.channel,
                            error = %e,
                            "subject render failed, skipping channel"
                        );
                        continue;
                    }
                },
                None => None,
            };

            let not_before = if eta > now { Some(eta.naive_utc()) } else { None };

            let notification = NotificationRepository::create(
                &mut tx,
                CreateNotification {
                    user_id: user_id.clone(),
                    channel: template.channel.clone(),
                    priority: priority.to_string(),
                    source_event_id: source_event_id.clone(),
                    source_event_type: event.event_type().to_string(),
                    content: NotificationContent { body, subject },
                    max_attempts: self.config.delivery.max_attempts as i32,
                    next_retry_at: not_before,
                },
            )
            .await?;

            self.work_queue
                .enqueue(&mut tx, &notification.id, &notification.priority, not_before)
                .await?;

            created.push(notification);
        }

        tx.commit().await.map_err(AppError::Database)?;

        for notification in &created {
            self.status_publisher
                .publish(
                    &notification.id,
                    &notification.status,
                    event.event_type(),
                    &notification.channel,
                    &user_id,
                )
                .await?;
        }

        Ok(())
    }
}

/// Tracks consecutive non-retryable failures per partition key so a single
/// malformed or unparseable event stream doesn't spin the consumer forever.
/// Crossing the threshold is a signal to stop consuming that partition and
/// surface the condition, not to crash the whole processor.
#[derive(Debug, Default)]
pub struct PoisonPillTracker {
    consecutive_failures: u32,
}

impl PoisonPillTracker {
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    pub fn exceeded(&self, threshold: u32) -> bool {
        self.consecutive_failures >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poison_pill_tracker_resets_on_success() {
        let mut tracker = PoisonPillTracker::default();
        tracker.record_failure();
        tracker.record_failure();
        tracker.record_success();
        assert!(!tracker.exceeded(1));
    }

    #[test]
    fn poison_pill_tracker_trips_at_threshold() {
        let mut tracker = PoisonPillTracker::default();
        tracker.record_failure();
        tracker.record_failure();
        tracker.record_failure();
        assert!(tracker.exceeded(3));
    }
}
