use async_trait::async_trait;

use crate::db::models::NotificationContent;

use super::{DeliveryProvider, ProviderResult};

/// Stub push provider: logs and always succeeds.
pub struct PushProvider;

impl PushProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PushProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryProvider for PushProvider {
    async fn send(&self, recipient_user_id: &str, content: &NotificationContent) -> ProviderResult {
        tracing::info!(user_id = recipient_user_id, "sending push notification");
        ProviderResult::success("push dispatched")
    }
}
