use async_trait::async_trait;

use crate::db::models::NotificationContent;

use super::{DeliveryProvider, ProviderResult};

/// Stub SMS provider: logs and always succeeds.
pub struct SmsProvider;

impl SmsProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SmsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryProvider for SmsProvider {
    async fn send(&self, recipient_user_id: &str, content: &NotificationContent) -> ProviderResult {
        tracing::info!(user_id = recipient_user_id, "sending sms notification");
        ProviderResult::success("sms dispatched")
    }
}
