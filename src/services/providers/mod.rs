pub mod email;
pub mod push;
pub mod sms;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::db::models::notification::{CHANNEL_EMAIL, CHANNEL_PUSH, CHANNEL_SMS};
use crate::db::models::NotificationContent;
use crate::error::{AppError, AppResult};

/// Outcome of one delivery attempt. Providers must never panic — any
/// failure, transient or not, is reported through this struct.
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub success: bool,
    pub details: String,
    /// Whether a failed attempt is worth retrying. Defaults to `true`: most
    /// provider failures (timeouts, 5xx, transient network errors) are
    /// retryable, and providers opt out explicitly for permanent rejections
    /// (invalid recipient, content rejected).
    pub retryable: bool,
}

impl ProviderResult {
    pub fn success(details: impl Into<String>) -> Self {
        Self {
            success: true,
            details: details.into(),
            retryable: true,
        }
    }

    pub fn failure(details: impl Into<String>) -> Self {
        Self {
            success: false,
            details: details.into(),
            retryable: true,
        }
    }

    pub fn permanent_failure(details: impl Into<String>) -> Self {
        Self {
            success: false,
            details: details.into(),
            retryable: false,
        }
    }
}

#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    async fn send(&self, recipient_user_id: &str, content: &NotificationContent) -> ProviderResult;
}

/// Channel -> provider lookup. An unknown channel is a loud, explicit error
/// rather than a silent no-op — the channel set is closed and validated far
/// upstream, so reaching an unregistered channel here means a provider was
/// never wired up for it.
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn DeliveryProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, channel: &str, provider: Box<dyn DeliveryProvider>) {
        self.providers.insert(channel.to_string(), provider);
    }

    pub fn get(&self, channel: &str) -> AppResult<&dyn DeliveryProvider> {
        self.providers
            .get(channel)
            .map(|p| p.as_ref())
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("no provider registered for channel {channel}")))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(CHANNEL_EMAIL, Box::new(email::EmailProvider::new()));
    registry.register(CHANNEL_SMS, Box::new(sms::SmsProvider::new()));
    registry.register(CHANNEL_PUSH, Box::new(push::PushProvider::new()));
    registry
}
