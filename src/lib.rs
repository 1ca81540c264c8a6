use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod routes;
pub mod services;

use config::Config;
use services::event_log::EventLog;
use services::providers::ProviderRegistry;
use services::rate_limiter::RateLimit;
use services::status_publisher::StatusPublisher;
use services::work_queue::WorkQueue;

/// Shared application state handed to every route and background worker.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub event_log: Arc<EventLog>,
    pub work_queue: Arc<WorkQueue>,
    pub provider_registry: Arc<ProviderRegistry>,
    pub rate_limiter: Arc<dyn RateLimit>,
    pub status_publisher: Arc<StatusPublisher>,
}
