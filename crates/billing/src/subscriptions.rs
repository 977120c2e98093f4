//! Subscription state mirroring
//!
//! Webhook deliveries for one subscription id may arrive duplicated,
//! concurrent, or out of order (updated-before-created). The single
//! atomic upsert on (tenant_id, subscription_id) is the only ordering
//! mechanism: whichever delivery lands last wins on the mutable
//! fields, and there is never a window where two rows exist.

use time::OffsetDateTime;

use tenbill_shared::{Customer, Subscription, SubscriptionStatus};

use crate::error::{BillingError, BillingResult};
use crate::tenant::TenantSession;

/// Canonical form of a provider-reported status string
///
/// Providers are inconsistent about case and padding across event
/// versions; rows always store the lowercase trimmed form so that
/// status comparisons and the `Subscription::status` accessor see
/// one spelling per state.
fn normalize_status(raw: &str) -> SubscriptionStatus {
    SubscriptionStatus::from(raw.trim().to_ascii_lowercase().as_str())
}

/// Fields written by a subscription event
#[derive(Debug, Clone)]
pub struct SubscriptionWrite {
    pub subscription_id: String,
    pub status: String,
    pub price_id: String,
    pub product_id: String,
    pub scheduled_change: Option<OffsetDateTime>,
}

/// Subscription persistence service
#[derive(Clone, Default)]
pub struct SubscriptionService;

impl SubscriptionService {
    pub fn new() -> Self {
        Self
    }

    /// Idempotently insert or update the row for this subscription id
    ///
    /// Deliberately NOT a read-then-write: concurrent redeliveries
    /// would race the check. subscription_id, customer_id, tenant_id
    /// and created_at are fixed at first insert; later events only
    /// touch status/price/product/scheduled_change/updated_at.
    pub async fn upsert(
        &self,
        session: &mut TenantSession,
        customer: &Customer,
        write: SubscriptionWrite,
    ) -> BillingResult<Subscription> {
        // The customer row must belong to this session's tenant; an
        // upsert against a foreign customer would cross tenants.
        session.check_tenant(&customer.tenant_id)?;

        let status = normalize_status(&write.status);
        let tenant = session.tenant().to_string();
        let result: Result<Subscription, sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO subscriptions (
                subscription_id, subscription_status, price_id, product_id,
                scheduled_change, customer_id, tenant_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, subscription_id) DO UPDATE SET
                subscription_status = EXCLUDED.subscription_status,
                price_id = EXCLUDED.price_id,
                product_id = EXCLUDED.product_id,
                scheduled_change = EXCLUDED.scheduled_change,
                updated_at = NOW()
            RETURNING subscription_id, subscription_status, price_id, product_id,
                      scheduled_change, customer_id, tenant_id, created_at, updated_at
            "#,
        )
        .bind(&write.subscription_id)
        .bind(status.as_str())
        .bind(&write.price_id)
        .bind(&write.product_id)
        .bind(write.scheduled_change)
        .bind(&customer.customer_id)
        .bind(&tenant)
        .fetch_one(session.conn())
        .await;

        match result {
            Ok(subscription) => {
                tracing::info!(
                    tenant = %session.tenant(),
                    subscription_id = %subscription.subscription_id,
                    status = %subscription.subscription_status,
                    customer_id = %subscription.customer_id,
                    "Upserted subscription"
                );
                Ok(subscription)
            }
            Err(e) => {
                tracing::error!(
                    tenant = %session.tenant(),
                    subscription_id = %write.subscription_id,
                    status = %write.status,
                    price_id = %write.price_id,
                    product_id = %write.product_id,
                    customer_id = %customer.customer_id,
                    error = %e,
                    "Subscription write failed"
                );
                Err(BillingError::from(e))
            }
        }
    }

    /// Tenant-scoped subscriptions for one customer, newest first
    pub async fn list_for_customer(
        &self,
        session: &mut TenantSession,
        customer_id: &str,
    ) -> BillingResult<Vec<Subscription>> {
        let tenant = session.tenant().to_string();
        let rows: Vec<Subscription> = sqlx::query_as(
            r#"
            SELECT subscription_id, subscription_status, price_id, product_id,
                   scheduled_change, customer_id, tenant_id, created_at, updated_at
            FROM subscriptions
            WHERE tenant_id = $1 AND customer_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(&tenant)
        .bind(customer_id)
        .fetch_all(session.conn())
        .await?;

        for subscription in &rows {
            session.check_tenant(&subscription.tenant_id)?;
        }
        Ok(rows)
    }

    pub async fn get(
        &self,
        session: &mut TenantSession,
        subscription_id: &str,
    ) -> BillingResult<Option<Subscription>> {
        let tenant = session.tenant().to_string();
        let row: Option<Subscription> = sqlx::query_as(
            r#"
            SELECT subscription_id, subscription_status, price_id, product_id,
                   scheduled_change, customer_id, tenant_id, created_at, updated_at
            FROM subscriptions
            WHERE tenant_id = $1 AND subscription_id = $2
            "#,
        )
        .bind(&tenant)
        .bind(subscription_id)
        .fetch_optional(session.conn())
        .await?;

        if let Some(ref subscription) = row {
            session.check_tenant(&subscription.tenant_id)?;
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenbill_shared::KnownStatus;

    #[test]
    fn test_normalize_status_canonicalizes_known_states() {
        assert_eq!(
            normalize_status("ACTIVE"),
            SubscriptionStatus::Known(KnownStatus::Active)
        );
        assert_eq!(normalize_status("  Past_Due ").as_str(), "past_due");
        assert_eq!(normalize_status("trialing").as_str(), "trialing");
    }

    #[test]
    fn test_normalize_status_passes_unknown_states_through() {
        // Unrecognized statuses still persist; only case and padding
        // get touched.
        assert_eq!(normalize_status(" Incomplete ").as_str(), "incomplete");
        assert!(!normalize_status("incomplete").is_active());
    }
}
