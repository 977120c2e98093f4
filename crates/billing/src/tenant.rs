//! Tenant resolution and session binding
//!
//! All customer/subscription access happens through one of two session
//! types. `TenantSession` binds a tenant id into the database session
//! so row-level security scopes every query on that connection;
//! `AdminSession` is the deliberately separate privileged handle the
//! cross-tenant repair sweeps use. Request-scoped code takes a
//! `TenantSession` and cannot accidentally reach for the admin path.

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};

use tenbill_shared::TenantId;

use crate::error::{BillingError, BillingResult};

/// Derive the active tenant id for this process
///
/// One process serves one tenant; the value comes from deployment
/// configuration and falls back to "default" when unset. Callers
/// resolve per logical operation rather than caching, so a future
/// request-derived resolver can slot in behind the same call.
pub fn resolve_tenant(configured: Option<&str>) -> TenantId {
    match configured {
        Some(id) if !id.is_empty() => TenantId::new(id),
        _ => TenantId::default(),
    }
}

/// A database session scoped to one tenant
///
/// Holds a dedicated pooled connection: `set_current_tenant` sets a
/// session-local GUC, so the binding only covers queries issued on
/// this same connection.
pub struct TenantSession {
    conn: PoolConnection<Postgres>,
    tenant: TenantId,
}

impl TenantSession {
    /// Acquire a connection and bind the tenant id into it
    ///
    /// Webhook and reconciliation paths treat failure as fatal for the
    /// operation: proceeding unbound risks writing to the wrong tenant
    /// or having the isolation policy silently drop the write.
    pub async fn bind(pool: &PgPool, tenant: TenantId) -> BillingResult<Self> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| BillingError::TenantBindingFailed {
                tenant: tenant.to_string(),
                source: e,
            })?;

        sqlx::query("SELECT set_current_tenant($1)")
            .bind(tenant.as_str())
            .execute(&mut *conn)
            .await
            .map_err(|e| BillingError::TenantBindingFailed {
                tenant: tenant.to_string(),
                source: e,
            })?;

        tracing::debug!(tenant = %tenant, "Bound tenant to database session");

        Ok(Self { conn, tenant })
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Verify a row came back from this session's tenant
    ///
    /// The webhook and admin paths sometimes run on privileged
    /// connections where the isolation policy alone cannot be relied
    /// on; a mismatch here means the policy was bypassed and the
    /// operation must abort before any write.
    pub fn check_tenant(&self, row_tenant: &str) -> BillingResult<()> {
        if row_tenant != self.tenant.as_str() {
            return Err(BillingError::CrossTenantViolation {
                expected: self.tenant.to_string(),
                actual: row_tenant.to_string(),
            });
        }
        Ok(())
    }
}

/// A privileged database session that sees all tenants
///
/// Only the duplicate-cleanup sweeps open one of these.
pub struct AdminSession {
    conn: PoolConnection<Postgres>,
}

impl AdminSession {
    pub async fn open(pool: &PgPool) -> BillingResult<Self> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| BillingError::TenantBindingFailed {
                tenant: "<admin>".to_string(),
                source: e,
            })?;

        sqlx::query("SELECT set_admin_session()")
            .execute(&mut *conn)
            .await
            .map_err(|e| BillingError::TenantBindingFailed {
                tenant: "<admin>".to_string(),
                source: e,
            })?;

        tracing::debug!("Opened admin (cross-tenant) database session");

        Ok(Self { conn })
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_tenant_fallback() {
        assert_eq!(resolve_tenant(None).as_str(), "default");
        assert_eq!(resolve_tenant(Some("")).as_str(), "default");
        assert_eq!(resolve_tenant(Some("tenant1")).as_str(), "tenant1");
    }
}
