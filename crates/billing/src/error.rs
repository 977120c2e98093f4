//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Failed to bind tenant '{tenant}' to database session: {source}")]
    TenantBindingFailed {
        tenant: String,
        #[source]
        source: sqlx::Error,
    },

    /// A lookup scoped to one tenant returned a row belonging to
    /// another. Fatal: abort before any write.
    #[error("Cross-tenant invariant violation: expected tenant '{expected}', row belongs to '{actual}'")]
    CrossTenantViolation { expected: String, actual: String },

    /// Unique-constraint violation on insert. Recoverable inside the
    /// reconciler (re-read and treat as found); callers should never
    /// see it surface.
    #[error("Duplicate key on insert: {0}")]
    DuplicateKey(String),

    #[error("Billing provider API error: {0}")]
    UpstreamApi(String),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Webhook payload invalid: {0}")]
    WebhookPayloadInvalid(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            // PostgreSQL unique violation
            if db_err.code().as_deref() == Some("23505") {
                return BillingError::DuplicateKey(db_err.to_string());
            }
        }
        BillingError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        BillingError::UpstreamApi(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_sqlx_error_maps_to_database() {
        let err = BillingError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, BillingError::Database(_)));
    }
}
