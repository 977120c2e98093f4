//! Webhook event types
//!
//! Tagged event envelope as delivered by the billing provider. Only
//! the four lifecycle events the reconciliation flow cares about get
//! typed payloads; everything else is carried as `Unhandled` so the
//! endpoint can acknowledge it without processing.

use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};

/// Raw envelope shared by every provider event
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    event_id: String,
    event_type: String,
    data: serde_json::Value,
}

/// Payload of a subscription lifecycle event
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionEventData {
    /// External subscription id (stable across created/updated)
    pub id: String,
    pub status: String,
    pub customer_id: String,
    #[serde(default)]
    pub items: Vec<SubscriptionItem>,
    #[serde(default)]
    pub scheduled_change: Option<ScheduledChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub price: Option<ItemPrice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemPrice {
    pub id: String,
    #[serde(default)]
    pub product_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledChange {
    #[serde(default)]
    pub action: String,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub effective_at: Option<OffsetDateTime>,
}

impl SubscriptionEventData {
    /// Price id of the first line item; empty when the payload has none
    pub fn price_id(&self) -> &str {
        self.items
            .first()
            .and_then(|i| i.price.as_ref())
            .map(|p| p.id.as_str())
            .unwrap_or("")
    }

    /// Product id of the first line item; empty when the payload has none
    pub fn product_id(&self) -> &str {
        self.items
            .first()
            .and_then(|i| i.price.as_ref())
            .map(|p| p.product_id.as_str())
            .unwrap_or("")
    }

    pub fn scheduled_change_at(&self) -> Option<OffsetDateTime> {
        self.scheduled_change.as_ref().and_then(|c| c.effective_at)
    }
}

/// Payload of a customer lifecycle event
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerEventData {
    /// External customer id
    pub id: String,
    pub email: String,
}

/// A verified, parsed webhook event
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    SubscriptionCreated(SubscriptionEventData),
    SubscriptionUpdated(SubscriptionEventData),
    CustomerCreated(CustomerEventData),
    CustomerUpdated(CustomerEventData),
    /// Recognized envelope, event type this core doesn't process
    Unhandled { event_type: String },
}

impl WebhookEvent {
    /// Parse a raw (already signature-verified) webhook body
    pub fn parse(raw: &str) -> BillingResult<(Self, String)> {
        let envelope: Envelope = serde_json::from_str(raw)
            .map_err(|e| BillingError::WebhookPayloadInvalid(e.to_string()))?;

        let event = match envelope.event_type.as_str() {
            "subscription.created" => Self::SubscriptionCreated(parse_data(envelope.data)?),
            "subscription.updated" => Self::SubscriptionUpdated(parse_data(envelope.data)?),
            "customer.created" => Self::CustomerCreated(parse_data(envelope.data)?),
            "customer.updated" => Self::CustomerUpdated(parse_data(envelope.data)?),
            other => Self::Unhandled {
                event_type: other.to_string(),
            },
        };

        Ok((event, envelope.event_id))
    }

    /// Provider-side event name, for logs and the webhook response
    pub fn event_name(&self) -> &str {
        match self {
            Self::SubscriptionCreated(_) => "subscription.created",
            Self::SubscriptionUpdated(_) => "subscription.updated",
            Self::CustomerCreated(_) => "customer.created",
            Self::CustomerUpdated(_) => "customer.updated",
            Self::Unhandled { event_type } => event_type,
        }
    }
}

fn parse_data<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> BillingResult<T> {
    serde_json::from_value(data).map_err(|e| BillingError::WebhookPayloadInvalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const SUBSCRIPTION_CREATED: &str = r#"{
        "event_id": "evt_01",
        "event_type": "subscription.created",
        "occurred_at": "2024-03-01T12:00:00Z",
        "data": {
            "id": "sub_7",
            "status": "active",
            "customer_id": "cus_42",
            "items": [
                {"price": {"id": "pri_1", "product_id": "prod_1"}}
            ],
            "scheduled_change": null
        }
    }"#;

    const CUSTOMER_CREATED: &str = r#"{
        "event_id": "evt_02",
        "event_type": "customer.created",
        "data": {"id": "cus_42", "email": "u@x.com"}
    }"#;

    #[test]
    fn test_parse_subscription_created() {
        let (event, event_id) = WebhookEvent::parse(SUBSCRIPTION_CREATED).unwrap();
        assert_eq!(event_id, "evt_01");
        match event {
            WebhookEvent::SubscriptionCreated(data) => {
                assert_eq!(data.id, "sub_7");
                assert_eq!(data.status, "active");
                assert_eq!(data.customer_id, "cus_42");
                assert_eq!(data.price_id(), "pri_1");
                assert_eq!(data.product_id(), "prod_1");
                assert!(data.scheduled_change_at().is_none());
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_parse_customer_created() {
        let (event, _) = WebhookEvent::parse(CUSTOMER_CREATED).unwrap();
        match event {
            WebhookEvent::CustomerCreated(data) => {
                assert_eq!(data.id, "cus_42");
                assert_eq!(data.email, "u@x.com");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_parse_scheduled_change() {
        let raw = r#"{
            "event_type": "subscription.updated",
            "data": {
                "id": "sub_9",
                "status": "active",
                "customer_id": "cus_1",
                "items": [],
                "scheduled_change": {"action": "cancel", "effective_at": "2024-06-01T00:00:00Z"}
            }
        }"#;
        let (event, event_id) = WebhookEvent::parse(raw).unwrap();
        assert_eq!(event_id, "");
        match event {
            WebhookEvent::SubscriptionUpdated(data) => {
                let at = data.scheduled_change_at().unwrap();
                assert_eq!(at.year(), 2024);
                // Payload without items still parses; ids come back empty
                assert_eq!(data.price_id(), "");
                assert_eq!(data.product_id(), "");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_type_is_unhandled() {
        let raw = r#"{"event_type": "transaction.completed", "data": {}}"#;
        let (event, _) = WebhookEvent::parse(raw).unwrap();
        assert_eq!(event.event_name(), "transaction.completed");
        assert!(matches!(event, WebhookEvent::Unhandled { .. }));
    }

    #[test]
    fn test_garbage_body_is_payload_error() {
        let err = WebhookEvent::parse("not json").unwrap_err();
        assert!(matches!(err, BillingError::WebhookPayloadInvalid(_)));
    }

    #[test]
    fn test_missing_required_field_is_payload_error() {
        // subscription event without a customer_id cannot be reconciled
        let raw = r#"{"event_type": "subscription.created", "data": {"id": "sub_1", "status": "active"}}"#;
        let err = WebhookEvent::parse(raw).unwrap_err();
        assert!(matches!(err, BillingError::WebhookPayloadInvalid(_)));
    }
}
