//! End-to-end coverage of the event processor and delivery engine against an
//! in-process SQLite database. Mirrors the original `test_handler.py` /
//! `test_tasks.py` split: one fixture database per test, real repositories,
//! fakes only at the two external-system seams (the rate limiter store and
//! the provider transport).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use notification_pipeline::config::Config;
use notification_pipeline::db::models::notification::{
    STATUS_DELIVERED, STATUS_FAILED, STATUS_PENDING,
};
use notification_pipeline::db::models::{CreateNotification, NotificationContent};
use notification_pipeline::db::repository::NotificationRepository;
use notification_pipeline::events::{RawEvent, RawEventMetadata, ORDER_COMPLETED, PAYMENT_FAILED, USER_REGISTERED};
use notification_pipeline::services::delivery_engine::DeliveryEngine;
use notification_pipeline::services::event_processor::EventProcessor;
use notification_pipeline::services::providers::{DeliveryProvider, ProviderRegistry, ProviderResult};
use notification_pipeline::services::rate_limiter::RateLimit;
use notification_pipeline::services::status_publisher::StatusPublisher;
use notification_pipeline::services::work_queue::WorkQueue;

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    pool
}

async fn insert_preference(
    pool: &SqlitePool,
    user_id: &str,
    channels: &[&str],
    quiet_hours: Option<(&str, &str)>,
) {
    let channels_json = serde_json::to_string(channels).unwrap();
    let (start, end): (Option<NaiveTime>, Option<NaiveTime>) = match quiet_hours {
        Some((s, e)) => (
            Some(NaiveTime::parse_from_str(s, "%H:%M:%S").unwrap()),
            Some(NaiveTime::parse_from_str(e, "%H:%M:%S").unwrap()),
        ),
        None => (None, None),
    };

    sqlx::query(
        "INSERT INTO user_preferences (user_id, channels, quiet_hours_start, quiet_hours_end, timezone) \
         VALUES (?, ?, ?, ?, 'UTC')",
    )
    .bind(user_id)
    .bind(channels_json)
    .bind(start)
    .bind(end)
    .execute(pool)
    .await
    .unwrap();
}

fn raw_event(event_type: &str, payload: serde_json::Value) -> RawEvent {
    RawEvent {
        metadata: RawEventMetadata {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            occurred_at: Utc::now(),
            version: 1,
        },
        payload,
    }
}

async fn notification_channels(pool: &SqlitePool, source_event_id: &str) -> Vec<(String, String)> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT channel, status FROM notifications WHERE source_event_id = ? ORDER BY channel",
    )
    .bind(source_event_id)
    .fetch_all(pool)
    .await
    .unwrap();
    rows
}

/// Denies a fixed set of channels; everything else is allowed. No Redis
/// involved — the `RateLimit` trait is the seam `DeliveryEngine` depends on.
struct FakeRateLimiter {
    denied_channels: HashSet<String>,
}

impl FakeRateLimiter {
    fn allow_all() -> Self {
        Self {
            denied_channels: HashSet::new(),
        }
    }

    fn deny(channel: &str) -> Self {
        let mut denied_channels = HashSet::new();
        denied_channels.insert(channel.to_string());
        Self { denied_channels }
    }
}

#[async_trait]
impl RateLimit for FakeRateLimiter {
    async fn acquire(&self, channel: &str) -> bool {
        !self.denied_channels.contains(channel)
    }
}

/// Always fails with a retryable outcome, standing in for a provider having a
/// bad day (timeout, 5xx) rather than rejecting the message outright.
struct AlwaysFailsProvider;

#[async_trait]
impl DeliveryProvider for AlwaysFailsProvider {
    async fn send(&self, _recipient_user_id: &str, _content: &NotificationContent) -> ProviderResult {
        ProviderResult::failure("simulated provider outage")
    }
}

fn failing_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register("email", Box::new(AlwaysFailsProvider));
    registry.register("sms", Box::new(AlwaysFailsProvider));
    registry.register("push", Box::new(AlwaysFailsProvider));
    registry
}

/// Scenario 1: a single event produces pending notifications that the
/// delivery engine carries all the way to `delivered`.
#[tokio::test]
async fn happy_path_reaches_delivered() {
    let pool = test_pool().await;
    let config = Config::default();
    let work_queue = Arc::new(WorkQueue::new(pool.clone()));
    let status_publisher = Arc::new(StatusPublisher::new(pool.clone()));

    let processor = EventProcessor::new(pool.clone(), work_queue.clone(), status_publisher.clone(), config.clone());

    let user_id = Uuid::new_v4();
    let event = raw_event(
        ORDER_COMPLETED,
        serde_json::json!({"order_id": Uuid::new_v4(), "user_id": user_id, "total_amount": "42.00"}),
    );
    let source_event_id = event.metadata.event_id.to_string();

    processor.handle(event).await.expect("event processed");

    let rows = notification_channels(&pool, &source_event_id).await;
    assert_eq!(rows.len(), 2, "order.completed has email + push templates");
    assert!(rows.iter().all(|(_, status)| status == STATUS_PENDING));

    let engine = DeliveryEngine::new(
        pool.clone(),
        Arc::new(notification_pipeline::services::providers::default_registry()),
        Arc::new(FakeRateLimiter::allow_all()) as Arc<dyn RateLimit>,
        work_queue.clone(),
        status_publisher.clone(),
        config,
    );

    let claimed = work_queue.claim_due(10).await.unwrap();
    assert_eq!(claimed.len(), 2);
    for item in &claimed {
        engine.process(&item.notification_id).await.expect("delivery processed");
        work_queue.mark_done(&item.id).await.unwrap();
    }

    let rows = notification_channels(&pool, &source_event_id).await;
    assert!(rows.iter().all(|(_, status)| status == STATUS_DELIVERED));
}

/// Scenario 2: redelivering the identical event (same event id) must not
/// create duplicate notifications — the durable idempotency key is
/// `(source_event_id, channel)`.
#[tokio::test]
async fn idempotent_redelivery_skips_duplicates() {
    let pool = test_pool().await;
    let config = Config::default();
    let work_queue = Arc::new(WorkQueue::new(pool.clone()));
    let status_publisher = Arc::new(StatusPublisher::new(pool.clone()));
    let processor = EventProcessor::new(pool.clone(), work_queue.clone(), status_publisher.clone(), config);

    let event = raw_event(
        USER_REGISTERED,
        serde_json::json!({"user_id": Uuid::new_v4(), "email": "a@b.c"}),
    );
    let source_event_id = event.metadata.event_id.to_string();

    processor.handle(event.clone()).await.expect("first delivery processed");
    processor.handle(event).await.expect("redelivery processed");

    let rows = notification_channels(&pool, &source_event_id).await;
    assert_eq!(rows.len(), 1, "redelivery of the same event must not duplicate notifications");
}

/// Scenario 3: a user who has disabled a channel never gets a notification
/// materialized for it, even though an active template exists.
#[tokio::test]
async fn preference_filter_skips_disabled_channel() {
    let pool = test_pool().await;
    let config = Config::default();
    let work_queue = Arc::new(WorkQueue::new(pool.clone()));
    let status_publisher = Arc::new(StatusPublisher::new(pool.clone()));
    let processor = EventProcessor::new(pool.clone(), work_queue.clone(), status_publisher.clone(), config);

    let user_id = Uuid::new_v4();
    insert_preference(&pool, &user_id.to_string(), &["sms"], None).await;

    let event = raw_event(
        PAYMENT_FAILED,
        serde_json::json!({"payment_id": Uuid::new_v4(), "user_id": user_id, "reason": "card_declined"}),
    );
    let source_event_id = event.metadata.event_id.to_string();

    processor.handle(event).await.expect("event processed");

    let rows = notification_channels(&pool, &source_event_id).await;
    assert_eq!(rows, vec![("sms".to_string(), STATUS_PENDING.to_string())]);
}

/// Scenario 4: inside a quiet-hours window, the notification is created
/// `pending` with a future `next_retry_at` instead of being due immediately.
#[tokio::test]
async fn quiet_hours_defers_eta() {
    let pool = test_pool().await;
    let config = Config::default();
    let work_queue = Arc::new(WorkQueue::new(pool.clone()));
    let status_publisher = Arc::new(StatusPublisher::new(pool.clone()));
    let processor = EventProcessor::new(pool.clone(), work_queue.clone(), status_publisher.clone(), config);

    let user_id = Uuid::new_v4();
    // Covers all but the last second of the day, so "now" always falls
    // inside the window regardless of when this test runs.
    insert_preference(&pool, &user_id.to_string(), &["email", "sms", "push"], Some(("00:00:00", "23:59:59"))).await;

    let event = raw_event(
        USER_REGISTERED,
        serde_json::json!({"user_id": user_id, "email": "a@b.c"}),
    );
    let source_event_id = event.metadata.event_id.to_string();
    let before = Utc::now().naive_utc();

    processor.handle(event).await.expect("event processed");

    let notification = sqlx::query_as::<_, notification_pipeline::db::models::Notification>(
        "SELECT id, user_id, channel, priority, status, source_event_id, source_event_type, content, \
                attempts, max_attempts, next_retry_at, created_at, delivered_at, failed_reason \
         FROM notifications WHERE source_event_id = ?",
    )
    .bind(&source_event_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let next_retry_at = notification.next_retry_at.expect("quiet hours should set a future ETA");
    assert!(next_retry_at > before);
    assert!(work_queue.has_live_item(&notification.id).await.unwrap());
}

/// Scenario 5: a notification that keeps failing with a retryable outcome
/// backs off, then goes terminally `failed` once attempts are exhausted.
#[tokio::test]
async fn retry_exhaustion_marks_failed() {
    let pool = test_pool().await;
    let mut config = Config::default();
    config.delivery.max_attempts = 2;

    let work_queue = Arc::new(WorkQueue::new(pool.clone()));
    let status_publisher = Arc::new(StatusPublisher::new(pool.clone()));

    let mut tx = pool.begin().await.unwrap();
    let notification = NotificationRepository::create(
        &mut tx,
        CreateNotification {
            user_id: Uuid::new_v4().to_string(),
            channel: "email".to_string(),
            priority: "normal".to_string(),
            source_event_id: Uuid::new_v4().to_string(),
            source_event_type: USER_REGISTERED.to_string(),
            content: NotificationContent {
                body: "hello".to_string(),
                subject: None,
            },
            max_attempts: config.delivery.max_attempts as i32,
            next_retry_at: None,
        },
    )
    .await
    .unwrap();
    work_queue.enqueue(&mut tx, &notification.id, &notification.priority, None).await.unwrap();
    tx.commit().await.unwrap();

    let engine = DeliveryEngine::new(
        pool.clone(),
        Arc::new(failing_registry()),
        Arc::new(FakeRateLimiter::allow_all()) as Arc<dyn RateLimit>,
        work_queue.clone(),
        status_publisher.clone(),
        config,
    );

    engine.process(&notification.id).await.expect("first attempt processed");
    let after_first = NotificationRepository::get_by_id(&pool, &notification.id).await.unwrap().unwrap();
    assert_eq!(after_first.status, STATUS_PENDING);
    assert_eq!(after_first.attempts, 1);

    engine.process(&notification.id).await.expect("second attempt processed");
    let after_second = NotificationRepository::get_by_id(&pool, &notification.id).await.unwrap().unwrap();
    assert_eq!(after_second.status, STATUS_FAILED);
    assert_eq!(after_second.attempts, 2);
}

/// Scenario 6: a rate-limit denial requeues the notification to `pending`
/// with a fixed delay and does not count against `attempts`.
#[tokio::test]
async fn rate_limit_denial_reschedules_without_counting_attempt() {
    let pool = test_pool().await;
    let config = Config::default();
    let work_queue = Arc::new(WorkQueue::new(pool.clone()));
    let status_publisher = Arc::new(StatusPublisher::new(pool.clone()));

    let mut tx = pool.begin().await.unwrap();
    let notification = NotificationRepository::create(
        &mut tx,
        CreateNotification {
            user_id: Uuid::new_v4().to_string(),
            channel: "email".to_string(),
            priority: "normal".to_string(),
            source_event_id: Uuid::new_v4().to_string(),
            source_event_type: USER_REGISTERED.to_string(),
            content: NotificationContent {
                body: "hello".to_string(),
                subject: None,
            },
            max_attempts: config.delivery.max_attempts as i32,
            next_retry_at: None,
        },
    )
    .await
    .unwrap();
    work_queue.enqueue(&mut tx, &notification.id, &notification.priority, None).await.unwrap();
    tx.commit().await.unwrap();

    // Mirrors the real delivery worker loop: claim the item before handing
    // it to the engine, mark it done afterward regardless of outcome.
    let claimed = work_queue.claim_due(1).await.unwrap();
    assert_eq!(claimed.len(), 1);
    let claimed_item = &claimed[0];

    let engine = DeliveryEngine::new(
        pool.clone(),
        Arc::new(notification_pipeline::services::providers::default_registry()),
        Arc::new(FakeRateLimiter::deny("email")) as Arc<dyn RateLimit>,
        work_queue.clone(),
        status_publisher.clone(),
        config,
    );

    engine.process(&notification.id).await.expect("rate-limited attempt processed");
    work_queue.mark_done(&claimed_item.id).await.unwrap();

    let after = NotificationRepository::get_by_id(&pool, &notification.id).await.unwrap().unwrap();
    assert_eq!(after.status, STATUS_PENDING);
    assert_eq!(after.attempts, 0, "a rate-limit denial is never counted as an attempt");
    assert!(
        work_queue.has_live_item(&notification.id).await.unwrap(),
        "the denial must requeue a fresh work item, not just leave the old one"
    );
}
