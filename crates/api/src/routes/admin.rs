//! Admin cleanup endpoints
//!
//! Duplicate-collapse sweeps, guarded by a bearer token compared in
//! constant time. With no ADMIN_API_TOKEN configured the endpoints
//! are disabled entirely.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;
use subtle::ConstantTimeEq;

use tenbill_billing::CleanupReport;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Serialize)]
pub struct CleanupResponse {
    pub report: CleanupReport,
}

#[derive(Serialize)]
pub struct CrossTenantCleanupResponse {
    pub customers: CleanupReport,
    pub subscriptions: CleanupReport,
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let expected = state
        .config
        .admin_api_token
        .as_deref()
        .ok_or(ApiError::Forbidden)?;

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Collapse duplicate customers within this deployment's tenant
pub async fn cleanup_customers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<CleanupResponse>> {
    require_admin(&state, &headers)?;

    let mut session = state.billing.session().await?;
    let report = state
        .billing
        .cleanup
        .cleanup_duplicate_customers(&mut session)
        .await?;

    tracing::info!(
        tenant = %state.billing.tenant(),
        deleted = report.deleted,
        "Duplicate customer sweep finished"
    );
    Ok(Json(CleanupResponse { report }))
}

/// Collapse cross-tenant duplicates (customers and subscriptions)
/// across every tenant in the store
pub async fn cleanup_cross_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<CrossTenantCleanupResponse>> {
    require_admin(&state, &headers)?;

    let mut admin = state.billing.admin_session().await?;
    let customers = state
        .billing
        .cleanup
        .cleanup_cross_tenant_customers(&mut admin)
        .await?;
    let subscriptions = state
        .billing
        .cleanup
        .cleanup_cross_tenant_subscriptions(&mut admin)
        .await?;

    tracing::info!(
        customers_deleted = customers.deleted,
        subscriptions_deleted = subscriptions.deleted,
        "Cross-tenant sweep finished"
    );
    Ok(Json(CrossTenantCleanupResponse {
        customers,
        subscriptions,
    }))
}
