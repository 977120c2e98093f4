//! Checkout intent endpoint
//!
//! Called when the frontend opens the provider's checkout overlay.
//! Marks a pending intent for the buyer's email, which authorizes the
//! webhook pipeline to create a customer row for a subscription whose
//! external customer id is not yet known locally.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct OpenCheckoutRequest {
    pub email: String,
}

#[derive(Serialize)]
pub struct OpenCheckoutResponse {
    /// Existing customer id for prefilling the overlay, if any
    pub customer_id: Option<String>,
    pub pending: bool,
}

/// Register a checkout intent for an email
pub async fn open_checkout(
    State(state): State<AppState>,
    Json(request): Json<OpenCheckoutRequest>,
) -> ApiResult<Json<OpenCheckoutResponse>> {
    let email = request.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest("a valid email is required".to_string()));
    }

    state.billing.pending.mark(email);
    tracing::info!(tenant = %state.billing.tenant(), "Checkout intent marked");

    // Surface an existing customer id so the overlay can be prefilled
    let mut session = state.billing.session().await?;
    let customer_id = state
        .billing
        .customers
        .find_by_email(&mut session, email)
        .await?
        .map(|c| c.customer_id);

    Ok(Json(OpenCheckoutResponse {
        customer_id,
        pending: true,
    }))
}
