//! Customer reconciliation
//!
//! Matches an inbound identity (an authenticated email, or an
//! external billing-provider customer id) to exactly one customer
//! row in the session's tenant, creating the row when it is missing.
//! Webhook payloads never carry a tenant id, so this matching is the
//! only thing standing between an event and the wrong tenant's data.
//!
//! Concurrency contract: lookups and inserts race freely across
//! in-flight requests. The unique constraints on (tenant_id, email)
//! and (tenant_id, customer_id) are the exclusion mechanism; a 23505
//! on insert means someone else won the race and is handled by
//! re-reading, never surfaced to the caller.

use sqlx::PgConnection;
use uuid::Uuid;

use tenbill_shared::Customer;

use crate::client::PaddleClient;
use crate::error::{BillingError, BillingResult};
use crate::tenant::TenantSession;

/// How the caller identifies the customer to reconcile
#[derive(Debug, Clone)]
pub enum CustomerIdentity {
    /// Authentication path: a verified login email
    ByEmail { email: String },
    /// Webhook path: the provider's customer id, plus the email when
    /// the payload carried one
    ByExternalId {
        customer_id: String,
        email: Option<String>,
    },
}

/// One step of the resolution chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStep {
    /// Match on (tenant_id, customer_id)
    ExternalId,
    /// Match on (tenant_id, email)
    Email,
    /// Insert a new row
    Create,
}

/// The fixed lookup order for an identity
///
/// This order is a contract, not an implementation detail: external-id
/// match is unambiguous and always wins; an email match means an
/// earlier flow (usually first login) already created the row and that
/// row keeps its stored customer_id; creation is last.
pub fn resolution_order(identity: &CustomerIdentity) -> &'static [ResolutionStep] {
    match identity {
        CustomerIdentity::ByEmail { .. } => &[ResolutionStep::Email, ResolutionStep::Create],
        CustomerIdentity::ByExternalId { .. } => &[
            ResolutionStep::ExternalId,
            ResolutionStep::Email,
            ResolutionStep::Create,
        ],
    }
}

/// Generate an opaque customer id for rows created before any checkout
pub fn generate_customer_id() -> String {
    format!("ctm_{}", Uuid::new_v4().simple())
}

/// Synthesized email for a provider customer whose email could not be
/// fetched. Reconciliation proceeds rather than blocking on the
/// provider; a later customer.updated event repairs the address.
pub fn placeholder_email(customer_id: &str) -> String {
    format!("{}@placeholder.invalid", customer_id.to_lowercase())
}

/// Deterministic pick among duplicate rows: earliest created_at wins.
/// Duplicates are a prior invariant violation the cleanup sweep will
/// repair; the reconciler tolerates them without erroring the caller.
pub fn pick_earliest(mut rows: Vec<Customer>) -> Option<Customer> {
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    rows.into_iter().next()
}

/// Customer reconciliation service
#[derive(Clone)]
pub struct CustomerService {
    provider: PaddleClient,
}

impl CustomerService {
    pub fn new(provider: PaddleClient) -> Self {
        Self { provider }
    }

    /// Find or create exactly one customer row for this identity in
    /// the session's tenant
    pub async fn ensure_customer(
        &self,
        session: &mut TenantSession,
        identity: CustomerIdentity,
    ) -> BillingResult<Customer> {
        match identity {
            CustomerIdentity::ByEmail { email } => self.ensure_by_email(session, &email).await,
            CustomerIdentity::ByExternalId { customer_id, email } => {
                self.ensure_by_external_id(session, &customer_id, email).await
            }
        }
    }

    /// Authentication path: one row per (tenant, email)
    async fn ensure_by_email(
        &self,
        session: &mut TenantSession,
        email: &str,
    ) -> BillingResult<Customer> {
        if let Some(existing) = self.find_by_email(session, email).await? {
            return Ok(existing);
        }

        let customer_id = generate_customer_id();
        match insert_customer(session, &customer_id, email).await {
            Ok(customer) => {
                tracing::info!(
                    tenant = %session.tenant(),
                    customer_id = %customer.customer_id,
                    "Created customer record on login"
                );
                Ok(customer)
            }
            // Concurrent login for the same email won the insert race;
            // their row is the canonical one.
            Err(BillingError::DuplicateKey(_)) => self
                .find_by_email(session, email)
                .await?
                .ok_or_else(|| BillingError::CustomerNotFound(email.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Webhook path: external id first, then email, then create
    async fn ensure_by_external_id(
        &self,
        session: &mut TenantSession,
        customer_id: &str,
        email: Option<String>,
    ) -> BillingResult<Customer> {
        if let Some(existing) = self.find_by_external_id(session, customer_id).await? {
            return Ok(existing);
        }

        // The provider id is unknown in this tenant. The email decides
        // whether this maps onto a row created at login time.
        let email = match email {
            Some(e) => e,
            None => self.fetch_email_or_placeholder(customer_id).await,
        };

        if let Some(existing) = self.find_by_email(session, &email).await? {
            // Existing row wins: its stored customer_id (often a
            // generated ctm_ token) is never overwritten by the
            // external id.
            tracing::info!(
                tenant = %session.tenant(),
                customer_id = %existing.customer_id,
                external_id = %customer_id,
                "Matched provider customer to existing record by email"
            );
            return Ok(existing);
        }

        match insert_customer(session, customer_id, &email).await {
            Ok(customer) => {
                tracing::info!(
                    tenant = %session.tenant(),
                    customer_id = %customer.customer_id,
                    "Created customer record from provider event"
                );
                Ok(customer)
            }
            Err(BillingError::DuplicateKey(_)) => {
                // A concurrent delivery created the row between our
                // lookups; re-run the chain once to pick it up.
                if let Some(existing) = self.find_by_external_id(session, customer_id).await? {
                    return Ok(existing);
                }
                self.find_by_email(session, &email)
                    .await?
                    .ok_or_else(|| BillingError::CustomerNotFound(customer_id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Refresh the stored email for an external customer id
    /// (customer.updated events). Email and updated_at are the only
    /// mutable customer fields.
    pub async fn update_email(
        &self,
        session: &mut TenantSession,
        customer_id: &str,
        email: &str,
    ) -> BillingResult<Option<Customer>> {
        let tenant = session.tenant().to_string();
        let updated: Option<Customer> = sqlx::query_as(
            r#"
            UPDATE customers
            SET email = $1, updated_at = NOW()
            WHERE tenant_id = $2 AND customer_id = $3
            RETURNING customer_id, email, tenant_id, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(&tenant)
        .bind(customer_id)
        .fetch_optional(session.conn())
        .await?;

        if let Some(ref customer) = updated {
            session.check_tenant(&customer.tenant_id)?;
        }
        Ok(updated)
    }

    pub async fn find_by_external_id(
        &self,
        session: &mut TenantSession,
        customer_id: &str,
    ) -> BillingResult<Option<Customer>> {
        let tenant = session.tenant().to_string();
        let row: Option<Customer> = sqlx::query_as(
            r#"
            SELECT customer_id, email, tenant_id, created_at, updated_at
            FROM customers
            WHERE tenant_id = $1 AND customer_id = $2
            "#,
        )
        .bind(&tenant)
        .bind(customer_id)
        .fetch_optional(session.conn())
        .await?;

        if let Some(ref customer) = row {
            session.check_tenant(&customer.tenant_id)?;
        }
        Ok(row)
    }

    pub async fn find_by_email(
        &self,
        session: &mut TenantSession,
        email: &str,
    ) -> BillingResult<Option<Customer>> {
        let tenant = session.tenant().to_string();
        let rows: Vec<Customer> = sqlx::query_as(
            r#"
            SELECT customer_id, email, tenant_id, created_at, updated_at
            FROM customers
            WHERE tenant_id = $1 AND email = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(&tenant)
        .bind(email)
        .fetch_all(session.conn())
        .await?;

        if rows.len() > 1 {
            tracing::warn!(
                tenant = %session.tenant(),
                email = %email,
                count = rows.len(),
                "Duplicate customer rows for email; picking earliest (cleanup sweep will repair)"
            );
        }
        for customer in &rows {
            session.check_tenant(&customer.tenant_id)?;
        }
        Ok(pick_earliest(rows))
    }

    /// Resolve a provider customer's email, degrading to a placeholder
    /// when the provider call fails (an upstream lookup failure is
    /// non-fatal for reconciliation)
    pub async fn fetch_email_or_placeholder(&self, customer_id: &str) -> String {
        match self.provider.get_customer(customer_id).await {
            Ok(provider_customer) => provider_customer.email,
            Err(e) => {
                tracing::warn!(
                    customer_id = %customer_id,
                    error = %e,
                    "Provider customer lookup failed; using placeholder email"
                );
                placeholder_email(customer_id)
            }
        }
    }
}

async fn insert_customer(
    session: &mut TenantSession,
    customer_id: &str,
    email: &str,
) -> BillingResult<Customer> {
    let tenant = session.tenant().to_string();
    let conn: &mut PgConnection = session.conn();
    let customer: Customer = sqlx::query_as(
        r#"
        INSERT INTO customers (customer_id, email, tenant_id)
        VALUES ($1, $2, $3)
        RETURNING customer_id, email, tenant_id, created_at, updated_at
        "#,
    )
    .bind(customer_id)
    .bind(email)
    .bind(&tenant)
    .fetch_one(conn)
    .await?;
    Ok(customer)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use time::OffsetDateTime;

    fn customer(id: &str, email: &str, created_unix: i64) -> Customer {
        let at = OffsetDateTime::from_unix_timestamp(created_unix).unwrap();
        Customer {
            customer_id: id.to_string(),
            email: email.to_string(),
            tenant_id: "default".to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_resolution_order_is_fixed() {
        let auth = CustomerIdentity::ByEmail {
            email: "a@x.com".to_string(),
        };
        assert_eq!(
            resolution_order(&auth),
            &[ResolutionStep::Email, ResolutionStep::Create]
        );

        let webhook = CustomerIdentity::ByExternalId {
            customer_id: "cus_1".to_string(),
            email: None,
        };
        assert_eq!(
            resolution_order(&webhook),
            &[
                ResolutionStep::ExternalId,
                ResolutionStep::Email,
                ResolutionStep::Create
            ]
        );
    }

    #[test]
    fn test_pick_earliest_is_deterministic() {
        let rows = vec![
            customer("ctm_b", "a@x.com", 200),
            customer("ctm_a", "a@x.com", 100),
            customer("ctm_c", "a@x.com", 300),
        ];
        let picked = pick_earliest(rows).unwrap();
        assert_eq!(picked.customer_id, "ctm_a");

        assert!(pick_earliest(vec![]).is_none());
    }

    #[test]
    fn test_generated_customer_id_shape() {
        let id = generate_customer_id();
        assert!(id.starts_with("ctm_"));
        assert!(id.len() > 10);
        assert_ne!(id, generate_customer_id());
    }

    #[test]
    fn test_placeholder_email() {
        assert_eq!(placeholder_email("CUS_42"), "cus_42@placeholder.invalid");
    }
}
