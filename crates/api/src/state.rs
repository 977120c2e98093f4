//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use tenbill_billing::BillingService;

use crate::{auth::AuthClient, config::Config};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub billing: Arc<BillingService>,
    pub auth: AuthClient,
}
