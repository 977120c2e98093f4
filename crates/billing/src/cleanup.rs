//! Duplicate-cleanup sweeps
//!
//! Compensating control for historical code paths that created
//! customer/subscription rows without the tenant-scoped uniqueness
//! backstop. Each sweep groups rows by their natural key, keeps the
//! earliest-created row of each group, deletes the rest, and reports
//! a structured action log for audit. Safe to run repeatedly: a
//! second run finds nothing and deletes zero.
//!
//! The grouping/keep-earliest planning is pure so it can be tested
//! without a database; only the surrounding fetch and delete touch
//! the store.

use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::BillingResult;
use crate::tenant::{AdminSession, TenantSession};

/// A row referenced by a cleanup action
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RowRef {
    pub tenant_id: String,
    /// customer_id or subscription_id depending on the sweep
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One collapsed duplicate group
#[derive(Debug, Clone, Serialize)]
pub struct CleanupAction {
    /// The natural key the group shared (email or subscription id)
    pub key: String,
    pub kept: RowRef,
    pub deleted: Vec<RowRef>,
}

/// Result of one sweep run
#[derive(Debug, Clone, Serialize, Default)]
pub struct CleanupReport {
    pub deleted: u64,
    pub actions: Vec<CleanupAction>,
}

/// Plan which rows to delete: for every key with more than one row,
/// keep the earliest created_at, delete the rest. Groups with a single
/// row produce no action; the sole survivor is never deleted.
pub fn plan_keep_earliest(rows: Vec<(String, RowRef)>) -> Vec<CleanupAction> {
    let mut groups: BTreeMap<String, Vec<RowRef>> = BTreeMap::new();
    for (key, row) in rows {
        groups.entry(key).or_default().push(row);
    }

    let mut actions = Vec::new();
    for (key, mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let kept = members.remove(0);
        actions.push(CleanupAction {
            key,
            kept,
            deleted: members,
        });
    }
    actions
}

/// Duplicate-cleanup service
#[derive(Clone, Default)]
pub struct CleanupService;

impl CleanupService {
    pub fn new() -> Self {
        Self
    }

    /// Collapse duplicate customers (same email) within one tenant
    pub async fn cleanup_duplicate_customers(
        &self,
        session: &mut TenantSession,
    ) -> BillingResult<CleanupReport> {
        let tenant = session.tenant().to_string();
        let rows: Vec<(String, String, OffsetDateTime)> = sqlx::query_as(
            r#"
            SELECT email, customer_id, created_at
            FROM customers
            WHERE tenant_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(&tenant)
        .fetch_all(session.conn())
        .await?;

        let keyed = rows
            .into_iter()
            .map(|(email, customer_id, created_at)| {
                (
                    email,
                    RowRef {
                        tenant_id: tenant.clone(),
                        id: customer_id,
                        created_at,
                    },
                )
            })
            .collect();

        let actions = plan_keep_earliest(keyed);
        let mut deleted = 0u64;
        for action in &actions {
            for row in &action.deleted {
                let result = sqlx::query(
                    "DELETE FROM customers WHERE tenant_id = $1 AND customer_id = $2",
                )
                .bind(&row.tenant_id)
                .bind(&row.id)
                .execute(session.conn())
                .await?;
                deleted += result.rows_affected();
            }
            tracing::info!(
                tenant = %tenant,
                email = %action.key,
                kept = %action.kept.id,
                deleted = action.deleted.len(),
                "Collapsed duplicate customer rows"
            );
        }

        Ok(CleanupReport { deleted, actions })
    }

    /// Collapse customers sharing an email across all tenants
    /// (privileged: requires an admin session)
    pub async fn cleanup_cross_tenant_customers(
        &self,
        session: &mut AdminSession,
    ) -> BillingResult<CleanupReport> {
        let rows: Vec<(String, String, String, OffsetDateTime)> = sqlx::query_as(
            r#"
            SELECT email, tenant_id, customer_id, created_at
            FROM customers
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(session.conn())
        .await?;

        let keyed = rows
            .into_iter()
            .map(|(email, tenant_id, customer_id, created_at)| {
                (
                    email,
                    RowRef {
                        tenant_id,
                        id: customer_id,
                        created_at,
                    },
                )
            })
            .collect();

        let actions = plan_keep_earliest(keyed);
        let mut deleted = 0u64;
        for action in &actions {
            for row in &action.deleted {
                let result = sqlx::query(
                    "DELETE FROM customers WHERE tenant_id = $1 AND customer_id = $2",
                )
                .bind(&row.tenant_id)
                .bind(&row.id)
                .execute(session.conn())
                .await?;
                deleted += result.rows_affected();
            }
            tracing::info!(
                email = %action.key,
                kept_tenant = %action.kept.tenant_id,
                kept = %action.kept.id,
                deleted = action.deleted.len(),
                "Collapsed cross-tenant duplicate customer rows"
            );
        }

        Ok(CleanupReport { deleted, actions })
    }

    /// Collapse subscription rows whose external id leaked across
    /// tenants (privileged: requires an admin session)
    pub async fn cleanup_cross_tenant_subscriptions(
        &self,
        session: &mut AdminSession,
    ) -> BillingResult<CleanupReport> {
        let rows: Vec<(String, String, OffsetDateTime)> = sqlx::query_as(
            r#"
            SELECT subscription_id, tenant_id, created_at
            FROM subscriptions
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(session.conn())
        .await?;

        let keyed = rows
            .into_iter()
            .map(|(subscription_id, tenant_id, created_at)| {
                (
                    subscription_id.clone(),
                    RowRef {
                        tenant_id,
                        id: subscription_id,
                        created_at,
                    },
                )
            })
            .collect();

        let actions = plan_keep_earliest(keyed);
        let mut deleted = 0u64;
        for action in &actions {
            for row in &action.deleted {
                let result = sqlx::query(
                    "DELETE FROM subscriptions WHERE tenant_id = $1 AND subscription_id = $2",
                )
                .bind(&row.tenant_id)
                .bind(&row.id)
                .execute(session.conn())
                .await?;
                deleted += result.rows_affected();
            }
            tracing::info!(
                subscription_id = %action.key,
                kept_tenant = %action.kept.tenant_id,
                deleted = action.deleted.len(),
                "Collapsed cross-tenant duplicate subscription rows"
            );
        }

        Ok(CleanupReport { deleted, actions })
    }
}
