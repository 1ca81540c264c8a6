//! Initialization helpers for the application:
//! - database connection + migrations
//! - background worker spawn helpers
//!
//! This module centralizes bits that used to live in `main.rs`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::db::repository::NotificationRepository;
use crate::events::{RawEvent, RawEventMetadata};
use crate::services::delivery_engine::DeliveryEngine;
use crate::services::event_processor::{EventProcessor, PoisonPillTracker, CONSUMER_GROUP};

/// Redact potentially sensitive information from a database URL before logging.
///
/// Strips everything before the final `@` (i.e. `user:pass@`) without
/// pulling in a full URL-parsing dependency for a single log line.
pub fn redact_db_url(db_url: &str) -> String {
    match db_url.rfind('@') {
        Some(at_pos) => format!("(redacted){}", &db_url[at_pos + 1..]),
        None => db_url.to_string(),
    }
}

/// Initialize SQLite database connection and run migrations.
///
/// Creates the parent directory for the database file (if applicable),
/// opens a connection pool using `create_if_missing(true)` and runs migrations.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Spawn background workers:
/// - event processor loop(s), fanning domain events out into notifications
/// - delivery engine worker loop(s), draining the work queue
/// - the pending-notification sweeper, repairing orphaned `pending` rows
///
/// Each worker listens for a shutdown notification via a
/// `tokio::sync::broadcast::Sender<()>`, checked both mid-loop (`try_recv`,
/// non-blocking) and during the inter-poll sleep (`tokio::select!`).
pub fn spawn_background_workers(
    state: Arc<crate::AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    for worker_index in 0..state.config.event_processor.concurrency {
        let mut shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let processor = EventProcessor::new(
                state.db.clone(),
                state.work_queue.clone(),
                state.status_publisher.clone(),
                state.config.clone(),
            );
            let mut trackers: std::collections::HashMap<String, PoisonPillTracker> =
                std::collections::HashMap::new();

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    tracing::info!(worker_index, "event processor worker shutting down");
                    return;
                }

                match poll_and_process_one(&state, &processor, &mut trackers).await {
                    Ok(true) => continue,
                    Ok(false) => {
                        tokio::select! {
                            _ = shutdown_rx.recv() => {
                                tracing::info!(worker_index, "event processor worker shutting down");
                                return;
                            }
                            _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {}
                        }
                    }
                    Err(e) => {
                        tracing::warn!(worker_index, error = ?e, "event processor poll failed");
                        tokio::select! {
                            _ = shutdown_rx.recv() => {
                                tracing::info!(worker_index, "event processor worker shutting down");
                                return;
                            }
                            _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {}
                        }
                    }
                }
            }
        }));
    }

    for worker_index in 0..state.config.delivery.worker_concurrency {
        let mut shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let engine = DeliveryEngine::new(
                state.db.clone(),
                state.provider_registry.clone(),
                state.rate_limiter.clone(),
                state.work_queue.clone(),
                state.status_publisher.clone(),
                state.config.clone(),
            );

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    tracing::info!(worker_index, "delivery worker shutting down");
                    return;
                }

                match state.work_queue.claim_due(1).await {
                    Ok(items) if items.is_empty() => {
                        tokio::select! {
                            _ = shutdown_rx.recv() => {
                                tracing::info!(worker_index, "delivery worker shutting down");
                                return;
                            }
                            _ = tokio::time::sleep(std::time::Duration::from_secs(
                                state.config.delivery.poll_interval_seconds,
                            )) => {}
                        }
                    }
                    Ok(items) => {
                        for item in items {
                            if let Err(e) = engine.process(&item.notification_id).await {
                                tracing::warn!(notification_id = %item.notification_id, error = ?e, "delivery attempt failed");
                            }
                            if let Err(e) = state.work_queue.mark_done(&item.id).await {
                                tracing::warn!(work_item_id = %item.id, error = ?e, "failed to mark work item done");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(worker_index, error = ?e, "failed to claim due work items");
                        tokio::select! {
                            _ = shutdown_rx.recv() => {
                                tracing::info!(worker_index, "delivery worker shutting down");
                                return;
                            }
                            _ = tokio::time::sleep(std::time::Duration::from_secs(
                                state.config.delivery.poll_interval_seconds,
                            )) => {}
                        }
                    }
                }
            }
        }));
    }

    {
        let mut shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    tracing::info!("pending notification sweeper shutting down");
                    return;
                }

                let threshold = chrono::Utc::now().naive_utc()
                    - chrono::Duration::seconds(state.config.delivery.sweeper_stale_threshold_seconds);

                match NotificationRepository::stale_pending_without_retry(&state.db, threshold, 100).await {
                    Ok(stale) => {
                        for notification in stale {
                            match state.work_queue.has_live_item(&notification.id).await {
                                Ok(true) => continue,
                                Ok(false) => {
                                    tracing::info!(
                                        notification_id = %notification.id,
                                        "re-enqueuing orphaned pending notification"
                                    );
                                    if let Err(e) = state
                                        .work_queue
                                        .enqueue_standalone(&notification.id, &notification.priority, None)
                                        .await
                                    {
                                        tracing::warn!(notification_id = %notification.id, error = ?e, "sweeper re-enqueue failed");
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(notification_id = %notification.id, error = ?e, "sweeper live-item check failed");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = ?e, "sweeper scan failed");
                    }
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("pending notification sweeper shutting down");
                        return;
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_secs(
                        state.config.delivery.sweeper_interval_seconds,
                    )) => {}
                }
            }
        }));
    }

    handles
}

/// Poll every known partition key once, process at most one event from the
/// first partition with something due. Returns `true` if an event was
/// processed (caller should poll again immediately), `false` if nothing was
/// due (caller should back off).
async fn poll_and_process_one(
    state: &Arc<crate::AppState>,
    processor: &EventProcessor,
    trackers: &mut std::collections::HashMap<String, PoisonPillTracker>,
) -> anyhow::Result<bool> {
    let partition_keys = state.event_log.known_partition_keys().await?;

    for partition_key in partition_keys {
        let Some(record) = state
            .event_log
            .next_after_offset(CONSUMER_GROUP, &partition_key)
            .await?
        else {
            continue;
        };

        let raw: RawEvent = RawEvent {
            metadata: RawEventMetadata {
                event_id: uuid::Uuid::new_v4(),
                event_type: record.event_type.clone(),
                occurred_at: chrono::DateTime::from_naive_utc_and_offset(record.occurred_at, chrono::Utc),
                version: 1,
            },
            payload: serde_json::from_str(&record.payload)
                .unwrap_or(serde_json::Value::Null),
        };

        let tracker = trackers.entry(partition_key.clone()).or_default();

        match processor.handle(raw).await {
            Ok(()) => {
                tracker.record_success();
                state
                    .event_log
                    .commit_offset(CONSUMER_GROUP, &partition_key, record.offset)
                    .await?;
                return Ok(true);
            }
            Err(e) if !e.is_retryable() => {
                tracing::warn!(
                    partition_key, offset = record.offset, error = ?e,
                    "non-retryable event processing error, committing past it"
                );
                state
                    .event_log
                    .commit_offset(CONSUMER_GROUP, &partition_key, record.offset)
                    .await?;
                return Ok(true);
            }
            Err(e) => {
                let failures = tracker.record_failure();
                tracing::warn!(
                    partition_key, offset = record.offset, failures,
                    error = ?e, "retryable event processing error"
                );
                if tracker.exceeded(state.config.event_processor.poison_pill_threshold) {
                    tracing::error!(
                        partition_key,
                        "poison pill threshold exceeded, skipping partition this cycle"
                    );
                }
                return Ok(false);
            }
        }
    }

    Ok(false)
}
