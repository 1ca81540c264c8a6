use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub rate_limit: RateLimitConfig,
    pub delivery: DeliveryConfig,
    pub event_processor: EventProcessorConfig,
    pub ingestion_rate_limit: IngestionRateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub email_per_minute: u32,
    pub sms_per_minute: u32,
    pub push_per_minute: u32,
    pub window_seconds: u64,
}

impl RateLimitConfig {
    /// Looks up the configured per-minute cap for a channel. Callers must
    /// already have validated the channel against the known set; an
    /// unrecognized channel here is a programmer error.
    pub fn limit_for_channel(&self, channel: &str) -> Option<u32> {
        match channel {
            "email" => Some(self.email_per_minute),
            "sms" => Some(self.sms_per_minute),
            "push" => Some(self.push_per_minute),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum attempts before a notification is marked permanently failed.
    pub max_attempts: u32,
    /// Exponential-ish backoff schedule in seconds, indexed by attempt number.
    pub retry_backoff_seconds: Vec<u64>,
    /// Fixed delay before retrying after a rate-limit denial (not counted as an attempt).
    pub rate_limit_retry_seconds: u64,
    /// Timeout applied to a single provider `send` call.
    pub provider_timeout_seconds: u64,
    /// Number of concurrent delivery workers.
    pub worker_concurrency: u32,
    /// How long the delivery worker sleeps when no work items are due.
    pub poll_interval_seconds: u64,
    /// Threshold (seconds) beyond which a still-`pending` notification with
    /// no live work item is re-enqueued by the sweeper.
    pub sweeper_stale_threshold_seconds: i64,
    /// How often the sweeper scans for orphaned pending notifications.
    pub sweeper_interval_seconds: u64,
}

impl DeliveryConfig {
    pub fn backoff_for_attempt(&self, attempt: u32) -> u64 {
        if self.retry_backoff_seconds.is_empty() {
            return 60;
        }
        let idx = (attempt.saturating_sub(1) as usize).min(self.retry_backoff_seconds.len() - 1);
        self.retry_backoff_seconds[idx]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventProcessorConfig {
    pub concurrency: u32,
    pub poison_pill_threshold: u32,
    pub default_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionRateLimitConfig {
    pub per_second: u32,
    pub burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("POSTGRES_URL")
                    .or_else(|_| env::var("DATABASE_URL"))
                    .unwrap_or_else(|_| "sqlite://data/notifications.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            },
            rate_limit: RateLimitConfig {
                email_per_minute: env::var("RATE_LIMIT_EMAIL_PER_MINUTE")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100),
                sms_per_minute: env::var("RATE_LIMIT_SMS_PER_MINUTE")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .unwrap_or(50),
                push_per_minute: env::var("RATE_LIMIT_PUSH_PER_MINUTE")
                    .unwrap_or_else(|_| "200".to_string())
                    .parse()
                    .unwrap_or(200),
                window_seconds: env::var("RATE_LIMIT_WINDOW_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            },
            delivery: DeliveryConfig {
                max_attempts: env::var("DELIVERY_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                retry_backoff_seconds: env::var("DELIVERY_RETRY_BACKOFF_SECONDS")
                    .ok()
                    .map(|raw| {
                        raw.split(',')
                            .filter_map(|s| s.trim().parse::<u64>().ok())
                            .collect::<Vec<_>>()
                    })
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| vec![60, 300, 900]),
                rate_limit_retry_seconds: env::var("DELIVERY_RATE_LIMIT_RETRY_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                provider_timeout_seconds: env::var("DELIVERY_PROVIDER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                worker_concurrency: env::var("DELIVERY_WORKER_CONCURRENCY")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                poll_interval_seconds: env::var("DELIVERY_POLL_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                sweeper_stale_threshold_seconds: env::var("SWEEPER_STALE_THRESHOLD_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                sweeper_interval_seconds: env::var("SWEEPER_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            },
            event_processor: EventProcessorConfig {
                concurrency: env::var("EVENT_PROCESSOR_CONCURRENCY")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .unwrap_or(1),
                poison_pill_threshold: env::var("POISON_PILL_THRESHOLD")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                default_ttl_seconds: env::var("EVENT_DEFAULT_TTL_SECONDS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86400),
            },
            ingestion_rate_limit: IngestionRateLimitConfig {
                per_second: env::var("RATE_LIMIT_INGESTION_PER_SECOND")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
                burst: env::var("RATE_LIMIT_INGESTION_BURST")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .unwrap_or(50),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/notifications.db".to_string(),
                max_connections: 10,
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".to_string(),
            },
            rate_limit: RateLimitConfig {
                email_per_minute: 100,
                sms_per_minute: 50,
                push_per_minute: 200,
                window_seconds: 60,
            },
            delivery: DeliveryConfig {
                max_attempts: 3,
                retry_backoff_seconds: vec![60, 300, 900],
                rate_limit_retry_seconds: 10,
                provider_timeout_seconds: 30,
                worker_concurrency: 10,
                poll_interval_seconds: 2,
                sweeper_stale_threshold_seconds: 300,
                sweeper_interval_seconds: 60,
            },
            event_processor: EventProcessorConfig {
                concurrency: 1,
                poison_pill_threshold: 3,
                default_ttl_seconds: 86400,
            },
            ingestion_rate_limit: IngestionRateLimitConfig {
                per_second: 20,
                burst: 50,
            },
        }
    }
}
