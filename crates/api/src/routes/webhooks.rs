//! Billing provider webhook endpoint
//!
//! One POST endpoint receives every provider notification. The raw
//! body is signature-verified before any parsing; an unverifiable
//! request is rejected with 400 and never touches the database.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;

use tenbill_billing::WebhookOutcome;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

const SIGNATURE_HEADER: &str = "paddle-signature";

#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub event_name: String,
}

/// Handle an incoming provider webhook
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<WebhookResponse>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::BadRequest(format!("missing {} header", SIGNATURE_HEADER))
        })?;

    let (event, event_id) = state.billing.webhooks.verify_event(&body, signature)?;
    let event_name = event.event_name().to_string();

    tracing::info!(
        event_id = %event_id,
        event_type = %event_name,
        tenant = %state.billing.tenant(),
        "Webhook received"
    );

    match state.billing.webhooks.handle_event(event).await? {
        WebhookOutcome::Processed => Ok(Json(WebhookResponse {
            status: "processed",
            event_name,
        })),
        WebhookOutcome::Ignored { reason } => {
            tracing::info!(
                event_id = %event_id,
                event_type = %event_name,
                reason = %reason,
                "Webhook acknowledged without processing"
            );
            Ok(Json(WebhookResponse {
                status: "ignored",
                event_name,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_response_shape_is_stable() {
        // Callers key off these field names; renames break them.
        let body = serde_json::to_value(WebhookResponse {
            status: "processed",
            event_name: "subscription.created".to_string(),
        })
        .unwrap();
        assert_eq!(body["status"], "processed");
        assert_eq!(body["event_name"], "subscription.created");
    }
}
