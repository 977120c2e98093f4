//! Webhook verification and event processing
//!
//! Entry point for everything the billing provider pushes at us.
//! Verification is HMAC-SHA256 over `"{ts}:{body}"` against the shared
//! webhook secret, with the `ts=...;h1=...` header format. Processing
//! binds a tenant-scoped session (fail-closed: an unbound webhook
//! write could land in the wrong tenant), reconciles the owning
//! customer, and upserts subscription state.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use time::OffsetDateTime;

use tenbill_shared::{Customer, TenantId};

use crate::customers::{CustomerIdentity, CustomerService};
use crate::error::{BillingError, BillingResult};
use crate::events::{CustomerEventData, SubscriptionEventData, WebhookEvent};
use crate::pending::PendingIntents;
use crate::subscriptions::{SubscriptionService, SubscriptionWrite};
use crate::tenant::TenantSession;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed webhook, in seconds. Replays of
/// captured deliveries outside this window are rejected outright.
pub const SIGNATURE_MAX_AGE_SECS: i64 = 300;

/// Verify a `ts=...;h1=...` signature header against the raw body
pub fn verify_signature(body: &str, header: &str, secret: &str) -> BillingResult<()> {
    verify_signature_at(body, header, secret, OffsetDateTime::now_utc().unix_timestamp())
}

/// Verification with an explicit "now" so freshness is testable
pub fn verify_signature_at(
    body: &str,
    header: &str,
    secret: &str,
    now_unix: i64,
) -> BillingResult<()> {
    let mut ts: Option<i64> = None;
    let mut h1: Option<&str> = None;
    for part in header.split(';') {
        match part.trim().split_once('=') {
            Some(("ts", v)) => ts = v.parse().ok(),
            Some(("h1", v)) => h1 = Some(v),
            _ => {}
        }
    }

    let (ts, h1) = match (ts, h1) {
        (Some(ts), Some(h1)) => (ts, h1),
        _ => return Err(BillingError::WebhookSignatureInvalid),
    };

    // ts is attacker-controlled; keep the age arithmetic total even
    // for i64 extremes.
    let age = now_unix.saturating_sub(ts).saturating_abs();
    if age > SIGNATURE_MAX_AGE_SECS {
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let expected = hex::decode(h1).map_err(|_| BillingError::WebhookSignatureInvalid)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(format!("{}:{}", ts, body).as_bytes());
    // verify_slice is constant-time
    mac.verify_slice(&expected)
        .map_err(|_| BillingError::WebhookSignatureInvalid)
}

/// What processing decided about one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    /// Acknowledged but deliberately not processed
    Ignored { reason: String },
}

/// Webhook processing service
#[derive(Clone)]
pub struct WebhookService {
    pool: PgPool,
    tenant: TenantId,
    webhook_secret: String,
    customers: CustomerService,
    subscriptions: SubscriptionService,
    pending: Arc<PendingIntents>,
}

impl WebhookService {
    pub fn new(
        pool: PgPool,
        tenant: TenantId,
        webhook_secret: String,
        customers: CustomerService,
        subscriptions: SubscriptionService,
        pending: Arc<PendingIntents>,
    ) -> Self {
        Self {
            pool,
            tenant,
            webhook_secret,
            customers,
            subscriptions,
            pending,
        }
    }

    /// Verify the signature and parse the event
    pub fn verify_event(&self, body: &str, signature: &str) -> BillingResult<(WebhookEvent, String)> {
        verify_signature(body, signature, &self.webhook_secret)?;
        WebhookEvent::parse(body)
    }

    /// Process one verified event
    pub async fn handle_event(&self, event: WebhookEvent) -> BillingResult<WebhookOutcome> {
        match event {
            WebhookEvent::SubscriptionCreated(data) | WebhookEvent::SubscriptionUpdated(data) => {
                self.handle_subscription_event(data).await
            }
            WebhookEvent::CustomerCreated(data) => {
                self.handle_customer_event(data, false).await
            }
            WebhookEvent::CustomerUpdated(data) => {
                self.handle_customer_event(data, true).await
            }
            WebhookEvent::Unhandled { event_type } => {
                tracing::debug!(event_type = %event_type, "Ignoring unhandled webhook event type");
                Ok(WebhookOutcome::Ignored {
                    reason: format!("unhandled event type: {}", event_type),
                })
            }
        }
    }

    async fn handle_subscription_event(
        &self,
        data: SubscriptionEventData,
    ) -> BillingResult<WebhookOutcome> {
        let mut session = TenantSession::bind(&self.pool, self.tenant.clone()).await?;

        let customer = match self.resolve_subscription_owner(&mut session, &data).await? {
            Some(customer) => customer,
            None => {
                tracing::info!(
                    tenant = %self.tenant,
                    subscription_id = %data.id,
                    provider_customer_id = %data.customer_id,
                    "Dropping subscription event: customer unknown and no pending checkout intent"
                );
                return Ok(WebhookOutcome::Ignored {
                    reason: "no pending checkout intent for unknown customer".to_string(),
                });
            }
        };

        let write = SubscriptionWrite {
            subscription_id: data.id.clone(),
            status: data.status.clone(),
            price_id: data.price_id().to_string(),
            product_id: data.product_id().to_string(),
            scheduled_change: data.scheduled_change_at(),
        };
        self.subscriptions.upsert(&mut session, &customer, write).await?;

        self.pending.clear(&customer.email);
        Ok(WebhookOutcome::Processed)
    }

    /// Resolve which tenant-local customer owns a subscription event.
    ///
    /// Fast path: the external customer id is already known in this
    /// tenant. Otherwise fall back to the email (fetched from the
    /// provider), where an existing row wins with its stored id.
    /// A customer unknown by both id and email is only created when a
    /// pending checkout intent exists for the email, since the event may
    /// belong to a different deployment sharing the provider account.
    async fn resolve_subscription_owner(
        &self,
        session: &mut TenantSession,
        data: &SubscriptionEventData,
    ) -> BillingResult<Option<Customer>> {
        if let Some(customer) = self
            .customers
            .find_by_external_id(session, &data.customer_id)
            .await?
        {
            return Ok(Some(customer));
        }

        let email = self
            .customers
            .fetch_email_or_placeholder(&data.customer_id)
            .await;

        if let Some(customer) = self.customers.find_by_email(session, &email).await? {
            return Ok(Some(customer));
        }

        if !self.pending.is_pending(&email) {
            return Ok(None);
        }

        let customer = self
            .customers
            .ensure_customer(
                session,
                CustomerIdentity::ByExternalId {
                    customer_id: data.customer_id.clone(),
                    email: Some(email),
                },
            )
            .await?;
        Ok(Some(customer))
    }

    async fn handle_customer_event(
        &self,
        data: CustomerEventData,
        refresh_email: bool,
    ) -> BillingResult<WebhookOutcome> {
        let mut session = TenantSession::bind(&self.pool, self.tenant.clone()).await?;

        let customer = self
            .customers
            .ensure_customer(
                &mut session,
                CustomerIdentity::ByExternalId {
                    customer_id: data.id.clone(),
                    email: Some(data.email.clone()),
                },
            )
            .await?;

        // customer.updated may carry a new email for a row we already
        // hold; only refresh when the row is keyed by this external id
        // (a row matched by email keeps whatever the provider sent).
        if refresh_email && customer.customer_id == data.id && customer.email != data.email {
            self.customers
                .update_email(&mut session, &data.id, &data.email)
                .await?;
        }

        Ok(WebhookOutcome::Processed)
    }
}
