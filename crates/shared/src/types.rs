//! Common types used across the tenancy-billing platform

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Tenant ID wrapper
///
/// One process serves exactly one tenant; the id partitions every row
/// in the customers/subscriptions tables. It is read from deployment
/// configuration at startup and never changes at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub const DEFAULT: &'static str = "default";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Subscription status as reported by the billing provider
///
/// Stored as lowercase text. `Other` passes through provider statuses
/// this build doesn't know about; the webhook path must never reject
/// an event over an unrecognized status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", untagged)]
pub enum SubscriptionStatus {
    Known(KnownStatus),
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownStatus {
    Active,
    Trialing,
    PastDue,
    Paused,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(KnownStatus::Active) => "active",
            Self::Known(KnownStatus::Trialing) => "trialing",
            Self::Known(KnownStatus::PastDue) => "past_due",
            Self::Known(KnownStatus::Paused) => "paused",
            Self::Known(KnownStatus::Canceled) => "canceled",
            Self::Other(s) => s,
        }
    }

    /// Whether this status entitles the customer to the product
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Known(KnownStatus::Active) | Self::Known(KnownStatus::Trialing)
        )
    }
}

impl From<&str> for SubscriptionStatus {
    fn from(s: &str) -> Self {
        match s {
            "active" => Self::Known(KnownStatus::Active),
            "trialing" => Self::Known(KnownStatus::Trialing),
            "past_due" => Self::Known(KnownStatus::PastDue),
            "paused" => Self::Known(KnownStatus::Paused),
            "canceled" => Self::Known(KnownStatus::Canceled),
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Rows
// =============================================================================

/// One billing identity within one tenant
///
/// At most one row per (tenant_id, email) and per (tenant_id,
/// customer_id); both are unique constraints in the schema, not just
/// application-level checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Customer {
    /// External billing-provider id, or a generated `ctm_` token for
    /// customers created on first login before any checkout
    pub customer_id: String,
    pub email: String,
    pub tenant_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Local mirror of one billing-provider subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: String,
    pub subscription_status: String,
    pub price_id: String,
    pub product_id: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub scheduled_change: Option<OffsetDateTime>,
    pub customer_id: String,
    pub tenant_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from(self.subscription_status.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_default() {
        assert_eq!(TenantId::default().as_str(), "default");
        assert_eq!(TenantId::new("acme").to_string(), "acme");
    }

    #[test]
    fn test_subscription_status_round_trip() {
        for s in ["active", "trialing", "past_due", "paused", "canceled"] {
            assert_eq!(SubscriptionStatus::from(s).as_str(), s);
        }
        // Unknown provider statuses pass through unchanged
        let other = SubscriptionStatus::from("incomplete");
        assert_eq!(other.as_str(), "incomplete");
        assert!(!other.is_active());
    }

    #[test]
    fn test_status_is_active() {
        assert!(SubscriptionStatus::from("active").is_active());
        assert!(SubscriptionStatus::from("trialing").is_active());
        assert!(!SubscriptionStatus::from("canceled").is_active());
        assert!(!SubscriptionStatus::from("paused").is_active());
    }
}
