use async_trait::async_trait;

use crate::db::models::NotificationContent;

use super::{DeliveryProvider, ProviderResult};

/// Stub email provider: logs and always succeeds. A real deployment swaps
/// this out for an SMTP or transactional-email-API client behind the same
/// `DeliveryProvider` trait.
pub struct EmailProvider;

impl EmailProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EmailProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryProvider for EmailProvider {
    async fn send(&self, recipient_user_id: &str, content: &NotificationContent) -> ProviderResult {
        tracing::info!(
            user_id = recipient_user_id,
            subject = content.subject.as_deref().unwrap_or(""),
            "sending email notification"
        );
        ProviderResult::success("email dispatched")
    }
}
