//! Tenbill Billing Core
//!
//! Tenant-scoped billing reconciliation: matches inbound provider
//! webhook events and authenticated logins to per-tenant customer and
//! subscription rows, with the store's unique constraints (not
//! application checks) as the concurrency backstop.

pub mod cleanup;
pub mod client;
pub mod customers;
pub mod error;
pub mod events;
pub mod pending;
pub mod subscriptions;
pub mod tenant;
pub mod webhooks;


use std::sync::Arc;

use sqlx::PgPool;

use tenbill_shared::TenantId;

pub use cleanup::{CleanupReport, CleanupService};
pub use client::{PaddleClient, PaddleConfig, PaddleEnvironment};
pub use customers::{CustomerIdentity, CustomerService};
pub use error::{BillingError, BillingResult};
pub use events::WebhookEvent;
pub use pending::PendingIntents;
pub use subscriptions::{SubscriptionService, SubscriptionWrite};
pub use tenant::{resolve_tenant, AdminSession, TenantSession};
pub use webhooks::{WebhookOutcome, WebhookService};

/// Aggregated billing services for one deployment (= one tenant)
#[derive(Clone)]
pub struct BillingService {
    pool: PgPool,
    tenant: TenantId,
    pub customers: CustomerService,
    pub subscriptions: SubscriptionService,
    pub cleanup: CleanupService,
    pub pending: Arc<PendingIntents>,
    pub webhooks: WebhookService,
}

impl BillingService {
    pub fn new(pool: PgPool, tenant: TenantId, provider: PaddleClient) -> Self {
        let webhook_secret = provider.config().webhook_secret.clone();
        let customers = CustomerService::new(provider);
        let subscriptions = SubscriptionService::new();
        let pending = Arc::new(PendingIntents::new());
        let webhooks = WebhookService::new(
            pool.clone(),
            tenant.clone(),
            webhook_secret,
            customers.clone(),
            subscriptions.clone(),
            Arc::clone(&pending),
        );

        Self {
            pool,
            tenant,
            customers,
            subscriptions,
            cleanup: CleanupService::new(),
            pending,
            webhooks,
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Bind a fresh tenant-scoped session for one logical operation
    pub async fn session(&self) -> BillingResult<TenantSession> {
        TenantSession::bind(&self.pool, self.tenant.clone()).await
    }

    /// Open a privileged cross-tenant session (cleanup sweeps only)
    pub async fn admin_session(&self) -> BillingResult<AdminSession> {
        AdminSession::open(&self.pool).await
    }
}
