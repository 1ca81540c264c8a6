use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppErrorWithDetails};
use crate::events::{parse_event, RawEvent, RawEventMetadata, ALL_EVENT_TYPES};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/events", post(accept_event))
}

#[derive(Debug, Deserialize)]
pub struct IngestEventRequest {
    pub event_type: String,
    pub payload: Value,
}

#[derive(Debug, Serialize)]
struct AcceptedResponse {
    status: &'static str,
    event_id: Uuid,
}

fn sorted_supported_types() -> Vec<&'static str> {
    let mut supported: Vec<&'static str> = ALL_EVENT_TYPES.to_vec();
    supported.sort_unstable();
    supported
}

/// `POST /events` — ingest one domain event.
///
/// 202 on acceptance, 400 for a malformed body or a payload that fails
/// validation against its event type, 422 for an unrecognized `event_type`
/// (body includes the supported set so producers can self-correct), 503 if
/// the event log can't be written to. Validation runs through the same
/// `parse_event` the processor later uses, so a bad event is rejected here
/// instead of being silently dropped downstream.
async fn accept_event(
    State(state): State<Arc<AppState>>,
    body: Result<Json<IngestEventRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<(axum::http::StatusCode, Json<AcceptedResponse>), AppErrorWithDetails> {
    let Json(request) = body.map_err(|e| AppError::MalformedEvent(e.to_string()))?;

    let event_id = Uuid::new_v4();
    let occurred_at = chrono::Utc::now();

    let event = parse_event(RawEvent {
        metadata: RawEventMetadata {
            event_id,
            event_type: request.event_type.clone(),
            occurred_at,
            version: 1,
        },
        payload: request.payload.clone(),
    })
    .map_err(|e| match e {
        AppError::UnknownEventType(event_type) => AppError::UnknownEventType(event_type.clone())
            .with_details(serde_json::json!({ "supported": sorted_supported_types() })),
        AppError::InvalidPayload(reason) => {
            AppError::InvalidPayload(reason.clone()).with_details(serde_json::json!({ "details": reason }))
        }
        other => other.into(),
    })?;

    let payload_json = serde_json::to_string(&request.payload)
        .map_err(|e| AppError::MalformedEvent(e.to_string()))?;

    state
        .event_log
        .append(&event.user_id().to_string(), &request.event_type, &payload_json, occurred_at)
        .await
        .map_err(|e| AppError::EventLogUnavailable(e.to_string()))?;

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted",
            event_id,
        }),
    ))
}
