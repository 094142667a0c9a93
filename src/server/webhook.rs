use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde_json::json;
use tracing::{info, warn};

use super::SharedState;
use super::api::ApiError;
use crate::dispatcher::SubmitError;
use crate::events::{Event, classify};
use crate::github::{SIGNATURE_HEADER, verify_signature};

const EVENT_HEADER: &str = "X-GitHub-Event";
const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Announce a rejected delivery in chat when a channel is configured.
async fn alert(state: &SharedState, text: String) {
    let Some(slack) = &state.alerts else {
        return;
    };
    if let Err(err) = slack.send(&text).await {
        warn!("Slack notification failed: {:#}", err);
    }
}

/// Authenticate, classify and enqueue one delivery.
///
/// Everything slow happens on the dispatcher worker; this only answers
/// whether the delivery was accepted.
pub async fn receive(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if let Err(err) = verify_signature(&state.webhook_secret, &body, header(&headers, SIGNATURE_HEADER)) {
        warn!("Rejected webhook: {}", err);
        alert(&state, format!("Failed to validate payload: {}", err)).await;
        return Err(ApiError::Unauthorized(err.to_string()));
    }

    let event = match classify(header(&headers, EVENT_HEADER), &body) {
        Ok(event) => event,
        Err(err) => {
            warn!("Unparseable webhook: {}", err);
            alert(&state, format!("Failed to parse webhook: {}", err)).await;
            return Err(ApiError::BadRequest(err.to_string()));
        }
    };

    let delivery = header(&headers, DELIVERY_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if let Event::Ignored { kind, reason } = &event {
        info!(delivery = %delivery, kind = %kind, "Ignoring webhook: {}", reason);
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({"status": "ignored", "delivery": delivery, "reason": reason})),
        ));
    }

    info!(delivery = %delivery, kind = %event.kind(), branch = event.branch().unwrap_or("-"), "Queueing webhook");
    match state.dispatch.submit(delivery.clone(), event) {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(json!({"status": "queued", "delivery": delivery})),
        )),
        Err(err @ (SubmitError::Full | SubmitError::Closed)) => {
            warn!(delivery = %delivery, "Could not queue webhook: {}", err);
            Err(ApiError::Unavailable(err.to_string()))
        }
    }
}
