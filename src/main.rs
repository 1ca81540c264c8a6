use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use axum::body::Body;
use http::{HeaderValue, StatusCode};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};

use notification_pipeline::config::Config;
use notification_pipeline::services::event_log::EventLog;
use notification_pipeline::services::init;
use notification_pipeline::services::providers::default_registry;
use notification_pipeline::services::rate_limiter::{RateLimit, RateLimiter};
use notification_pipeline::services::status_publisher::StatusPublisher;
use notification_pipeline::services::work_queue::WorkQueue;
use notification_pipeline::{routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notification_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting notification pipeline");

    // Initialize database
    let pool = init::init_db(&config).await?;

    // Initialize Redis-backed rate limiter
    let redis_client = redis::Client::open(config.redis.url.clone())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let rate_limiter: Arc<dyn RateLimit> = Arc::new(RateLimiter::new(redis_conn, config.rate_limit.clone()));

    let app_state = Arc::new(AppState {
        db: pool.clone(),
        config: config.clone(),
        event_log: Arc::new(EventLog::new(pool.clone())),
        work_queue: Arc::new(WorkQueue::new(pool.clone())),
        provider_registry: Arc::new(default_registry()),
        rate_limiter,
        status_publisher: Arc::new(StatusPublisher::new(pool.clone())),
    });

    // Spawn background workers (event processor, delivery engine, sweeper)
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let worker_handles = init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    // Build ingestion rate limiter with a custom error handler.
    // The error handler returns a proper 429 status and Retry-After header when limits are exceeded.
    let mut ingestion_builder = GovernorConfigBuilder::default();
    ingestion_builder.per_second(config.ingestion_rate_limit.per_second.into());
    ingestion_builder.burst_size(config.ingestion_rate_limit.burst.into());
    ingestion_builder.key_extractor(SmartIpKeyExtractor);
    ingestion_builder.error_handler(|error: GovernorError| -> http::Response<Body> {
        match error {
            GovernorError::TooManyRequests { wait_time, headers } => {
                // `wait_time` is provided as seconds
                let retry_after = wait_time;

                // Use the same error shape as `AppError::RateLimited -> IntoResponse`
                let body = serde_json::json!({
                    "error": {
                        "code": "RATE_LIMITED",
                        "message": "Rate limit exceeded",
                        "details": { "retry_after_seconds": retry_after }
                    }
                })
                .to_string();

                let mut resp = http::Response::new(Body::from(body));
                *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;

                // Ensure clients see JSON
                resp.headers_mut().insert(
                    http::header::CONTENT_TYPE,
                    http::HeaderValue::from_static("application/json"),
                );

                // Include any headers provided by the governor (e.g., X-RateLimit-* if enabled)
                if let Some(hmap) = headers {
                    for (name, value) in hmap.iter() {
                        resp.headers_mut().append(name.clone(), value.clone());
                    }
                }

                // Retry-After (seconds)
                resp.headers_mut().insert(
                    http::header::RETRY_AFTER,
                    http::HeaderValue::from_str(&retry_after.to_string()).unwrap(),
                );

                resp
            }
            GovernorError::UnableToExtractKey => {
                let body = serde_json::json!({
                    "error": {
                        "code": "INVALID_REQUEST",
                        "message": "Unable to determine client IP for rate limiting"
                    }
                })
                .to_string();

                let mut resp = http::Response::new(Body::from(body));
                *resp.status_mut() = StatusCode::BAD_REQUEST;
                resp.headers_mut().insert(
                    http::header::CONTENT_TYPE,
                    http::HeaderValue::from_static("application/json"),
                );
                resp
            }
            GovernorError::Other { code, msg, headers } => {
                let body = msg.unwrap_or_else(|| "Rate limiting error".to_string());
                let mut resp = http::Response::new(Body::from(body));
                let status = StatusCode::from_u16(code.as_u16())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                *resp.status_mut() = status;
                if let Some(hmap) = headers {
                    for (name, value) in hmap.iter() {
                        resp.headers_mut().append(name.clone(), value.clone());
                    }
                }
                resp
            }
        }
    });

    let ingestion_gov_conf = Arc::new(
        ingestion_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build ingestion governor config"))?,
    );

    // Background cleanup for ingestion limiter storage
    {
        let limiter = ingestion_gov_conf.limiter().clone();
        let interval = Duration::from_secs(60);
        std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            tracing::debug!("ingestion rate limiter size: {}", limiter.len());
            limiter.retain_recent();
        });
    }

    let ingestion_rate_layer = GovernorLayer {
        config: ingestion_gov_conf.clone(),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/", routes::events::router().layer(ingestion_rate_layer))
        // Add shared state
        .with_state(app_state.clone())
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(HeaderValue::from_static("*"))
                .allow_methods([http::Method::GET, http::Method::POST])
                .allow_headers([http::header::CONTENT_TYPE, http::header::ACCEPT]),
        );

    // Start server
    let host = config.server.host.clone();
    let port = config.server.port;
    let addr = format!("{}:{}", host, port);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    let _ = shutdown_tx.send(());
    for handle in worker_handles {
        let _ = handle.await;
    }

    Ok(())
}
