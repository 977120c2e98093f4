//! Subscription read endpoint

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use tenbill_shared::Subscription;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub email: String,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub customer_id: String,
    /// True when at least one subscription entitles the customer
    pub has_active: bool,
    pub subscriptions: Vec<Subscription>,
}

/// List the subscriptions of the customer behind an email, newest
/// first. Unknown email is a 404, not an empty list, so callers can
/// tell "no customer" from "customer without subscriptions".
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ListResponse>> {
    let email = params.email.trim();
    if email.is_empty() {
        return Err(ApiError::BadRequest("email is required".to_string()));
    }

    let mut session = state.billing.session().await?;
    let customer = state
        .billing
        .customers
        .find_by_email(&mut session, email)
        .await?
        .ok_or(ApiError::NotFound)?;

    let subscriptions = state
        .billing
        .subscriptions
        .list_for_customer(&mut session, &customer.customer_id)
        .await?;

    let has_active = subscriptions.iter().any(|s| s.status().is_active());

    Ok(Json(ListResponse {
        customer_id: customer.customer_id,
        has_active,
        subscriptions,
    }))
}
