//! Typed domain events. Replaces the dynamic `dict[str, Any]` payload shape
//! of the source system with a closed discriminated union: parsing is
//! fallible and returns either a typed event or a classified error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub const USER_REGISTERED: &str = "user.registered";
pub const ORDER_COMPLETED: &str = "order.completed";
pub const PAYMENT_FAILED: &str = "payment.failed";

pub const ALL_EVENT_TYPES: &[&str] = &[USER_REGISTERED, ORDER_COMPLETED, PAYMENT_FAILED];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default = "Uuid::new_v4")]
    pub event_id: Uuid,
    pub event_type: String,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: i32,
}

fn default_version() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRegisteredPayload {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCompletedPayload {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub total_amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedPayload {
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
}

/// A raw event as received from the durable log, before type classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub metadata: RawEventMetadata,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEventMetadata {
    #[serde(default = "Uuid::new_v4")]
    pub event_id: Uuid,
    pub event_type: String,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: i32,
}

#[derive(Debug, Clone)]
pub enum DomainEvent {
    UserRegistered {
        metadata: EventMetadata,
        payload: UserRegisteredPayload,
    },
    OrderCompleted {
        metadata: EventMetadata,
        payload: OrderCompletedPayload,
    },
    PaymentFailed {
        metadata: EventMetadata,
        payload: PaymentFailedPayload,
    },
}

impl DomainEvent {
    pub fn event_id(&self) -> Uuid {
        match self {
            DomainEvent::UserRegistered { metadata, .. } => metadata.event_id,
            DomainEvent::OrderCompleted { metadata, .. } => metadata.event_id,
            DomainEvent::PaymentFailed { metadata, .. } => metadata.event_id,
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::UserRegistered { .. } => USER_REGISTERED,
            DomainEvent::OrderCompleted { .. } => ORDER_COMPLETED,
            DomainEvent::PaymentFailed { .. } => PAYMENT_FAILED,
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            DomainEvent::UserRegistered { payload, .. } => payload.user_id,
            DomainEvent::OrderCompleted { payload, .. } => payload.user_id,
            DomainEvent::PaymentFailed { payload, .. } => payload.user_id,
        }
    }

    /// Context map handed to the template renderer — every payload field,
    /// stringified, plus the common metadata fields templates may reference.
    pub fn render_context(&self) -> std::collections::BTreeMap<String, String> {
        let mut ctx = std::collections::BTreeMap::new();
        match self {
            DomainEvent::UserRegistered { payload, .. } => {
                ctx.insert("user_id".to_string(), payload.user_id.to_string());
                ctx.insert("email".to_string(), payload.email.clone());
            }
            DomainEvent::OrderCompleted { payload, .. } => {
                ctx.insert("user_id".to_string(), payload.user_id.to_string());
                ctx.insert("order_id".to_string(), payload.order_id.to_string());
                ctx.insert("total_amount".to_string(), payload.total_amount.clone());
            }
            DomainEvent::PaymentFailed { payload, .. } => {
                ctx.insert("user_id".to_string(), payload.user_id.to_string());
                ctx.insert("payment_id".to_string(), payload.payment_id.to_string());
                ctx.insert("reason".to_string(), payload.reason.clone());
            }
        }
        ctx
    }
}

/// Parse a raw event into a typed `DomainEvent`.
///
/// Unknown `event_type` values and payload shape mismatches are both
/// non-retryable: the caller should classify them the same way (commit past
/// the message, log, never redeliver).
pub fn parse_event(raw: RawEvent) -> Result<DomainEvent, AppError> {
    let metadata = EventMetadata {
        event_id: raw.metadata.event_id,
        event_type: raw.metadata.event_type.clone(),
        occurred_at: raw.metadata.occurred_at,
        version: raw.metadata.version,
    };

    match raw.metadata.event_type.as_str() {
        USER_REGISTERED => {
            let payload: UserRegisteredPayload =
                serde_json::from_value(raw.payload).map_err(|e| {
                    AppError::InvalidPayload(format!("user.registered: {}", e))
                })?;
            Ok(DomainEvent::UserRegistered { metadata, payload })
        }
        ORDER_COMPLETED => {
            let payload: OrderCompletedPayload =
                serde_json::from_value(raw.payload).map_err(|e| {
                    AppError::InvalidPayload(format!("order.completed: {}", e))
                })?;
            Ok(DomainEvent::OrderCompleted { metadata, payload })
        }
        PAYMENT_FAILED => {
            let payload: PaymentFailedPayload =
                serde_json::from_value(raw.payload).map_err(|e| {
                    AppError::InvalidPayload(format!("payment.failed: {}", e))
                })?;
            Ok(DomainEvent::PaymentFailed { metadata, payload })
        }
        other => Err(AppError::UnknownEventType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(event_type: &str, payload: serde_json::Value) -> RawEvent {
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

    #[test]
    fn parses_known_event_types() {
        let event = parse_event(raw(
            USER_REGISTERED,
            serde_json::json!({"user_id": Uuid::new_v4(), "email": "a@b.c"}),
        ))
        .unwrap();
        assert_eq!(event.event_type(), USER_REGISTERED);
    }

    #[test]
    fn rejects_unknown_event_type() {
        let err = parse_event(raw("widget.sprocketed", serde_json::json!({}))).unwrap_err();
        assert!(matches!(err, AppError::UnknownEventType(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn rejects_malformed_payload() {
        let err = parse_event(raw(ORDER_COMPLETED, serde_json::json!({"order_id": "not-a-uuid"})))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidPayload(_)));
        assert!(!err.is_retryable());
    }
}
