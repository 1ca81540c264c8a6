use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use uuid::Uuid;

use crate::config::RateLimitConfig;

/// Seam between the delivery engine and the concrete store backing it, so
/// tests can substitute a fake without a live Redis connection.
#[async_trait]
pub trait RateLimit: Send + Sync {
    async fn acquire(&self, channel: &str) -> bool;
}

/// Sliding-window rate limiter backed by a Redis sorted set, one atomic Lua
/// script per check so the remove-count-add sequence never races across
/// concurrent delivery workers.
const SCRIPT_SOURCE: &str = r#"
local key = KEYS[1]
local window_start = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local member = ARGV[4]
local ttl = tonumber(ARGV[5])

redis.call('ZREMRANGEBYSCORE', key, '-inf', window_start)
local count = redis.call('ZCARD', key)
if count >= limit then
    return 0
end
redis.call('ZADD', key, now, member)
redis.call('EXPIRE', key, ttl)
return 1
"#;

pub struct RateLimiter {
    conn: ConnectionManager,
    config: RateLimitConfig,
    script: Script,
    check_timeout: Duration,
}

impl RateLimiter {
    pub fn new(conn: ConnectionManager, config: RateLimitConfig) -> Self {
        Self {
            conn,
            config,
            script: Script::new(SCRIPT_SOURCE),
            check_timeout: Duration::from_secs(2),
        }
    }

    /// True if `channel` may send now, and records the attempt atomically
    /// when it does. Fails closed — any Redis error or timeout denies the
    /// request rather than letting an unbounded number of deliveries through
    /// while the rate limit store is unreachable.
    async fn acquire_inner(&self, channel: &str) -> bool {
        let Some(limit) = self.config.limit_for_channel(channel) else {
            return true;
        };

        let key = format!("ratelimit:{channel}");
        let now = now_unix_millis();
        let window_start = now - (self.config.window_seconds as f64 * 1000.0) as i64;
        let ttl = self.config.window_seconds + 1;
        let member = Uuid::new_v4().to_string();

        let mut conn = self.conn.clone();
        let result = tokio::time::timeout(
            self.check_timeout,
            self.script
                .key(key)
                .arg(window_start)
                .arg(limit)
                .arg(now)
                .arg(member)
                .arg(ttl)
                .invoke_async::<i64>(&mut conn),
        )
        .await;

        match result {
            Ok(Ok(allowed)) => allowed == 1,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, channel, "rate limiter store error, failing closed");
                false
            }
            Err(_) => {
                tracing::warn!(channel, "rate limiter check timed out, failing closed");
                false
            }
        }
    }
}

fn now_unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl RateLimit for RateLimiter {
    async fn acquire(&self, channel: &str) -> bool {
        self.acquire_inner(channel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_channel_always_allowed() {
        let config = RateLimitConfig {
            email_per_minute: 100,
            sms_per_minute: 50,
            push_per_minute: 200,
            window_seconds: 60,
        };
        assert_eq!(config.limit_for_channel("carrier-pigeon"), None);
    }
}
