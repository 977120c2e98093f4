//! Login callback
//!
//! Completes the hosted-auth login and provisions billing state as a
//! side effect: every authenticated user gets a customer row in the
//! deployment's tenant. Provisioning failures are logged and swallowed
//! so a billing outage can never lock users out.

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use serde::Deserialize;

use tenbill_billing::CustomerIdentity;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    /// Post-login destination, relative to the public URL
    pub next: Option<String>,
}

/// Handle the auth provider redirect after login
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let next = sanitize_next(params.next.as_deref());
    let destination = format!("{}{}", state.config.public_url, next);

    let code = match params.code {
        Some(code) if !code.is_empty() => code,
        _ => {
            tracing::warn!("Login callback without auth code");
            return Redirect::to(&format!("{}/auth/error", state.config.public_url));
        }
    };

    let user = match state.auth.exchange_code(&code).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "Auth code exchange failed");
            return Redirect::to(&format!("{}/auth/error", state.config.public_url));
        }
    };

    ensure_customer_for_login(&state, &user.email).await;
    Redirect::to(&destination)
}

/// Reconcile the logged-in user against the customers table. Failure
/// here must not fail the login.
async fn ensure_customer_for_login(state: &AppState, email: &str) {
    let result = async {
        let mut session = state.billing.session().await?;
        state
            .billing
            .customers
            .ensure_customer(
                &mut session,
                CustomerIdentity::ByEmail {
                    email: email.to_string(),
                },
            )
            .await
    }
    .await;

    match result {
        Ok(customer) => {
            tracing::debug!(
                customer_id = %customer.customer_id,
                tenant = %customer.tenant_id,
                "Customer reconciled on login"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Customer reconciliation failed on login");
        }
    }
}

/// Only same-site relative paths are honored as redirect targets
fn sanitize_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/",
    }
}
