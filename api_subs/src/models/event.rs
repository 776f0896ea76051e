use common::error::{AppError, Res};
use serde::Deserialize;
use serde_json::Value;

/// Event types the provider sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    CheckoutCompleted,
    PaymentSucceeded,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCancelled,
    Unknown(Option<String>),
}

impl EventKind {
    pub fn from_type(event_type: Option<&str>) -> Self {
        match event_type {
            Some("checkout.completed") | Some("checkout.session.completed") => {
                EventKind::CheckoutCompleted
            }
            Some("payment.succeeded") => EventKind::PaymentSucceeded,
            Some("subscription.created") => EventKind::SubscriptionCreated,
            Some("subscription.updated") => EventKind::SubscriptionUpdated,
            Some("subscription.cancelled") | Some("subscription.canceled") => {
                EventKind::SubscriptionCancelled
            }
            other => EventKind::Unknown(other.map(str::to_string)),
        }
    }
}

/// Envelope as delivered. Integrations disagree on field names, so both
/// spellings are read and resolved in `WebhookEvent::parse`.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    id: Option<String>,
    #[serde(rename = "eventType")]
    event_type: Option<String>,
    #[serde(rename = "type")]
    legacy_type: Option<String>,
    object: Option<Value>,
    data: Option<Value>,
}

/// Normalised webhook event handed to the handlers.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: Option<String>,
    pub kind: EventKind,
    pub data: Value,
}

impl WebhookEvent {
    pub fn parse(body: &str) -> Res<Self> {
        let raw: RawEnvelope = serde_json::from_str(body)
            .map_err(|e| AppError::MalformedPayload(format!("Invalid webhook envelope: {}", e)))?;

        let event_type = raw.event_type.or(raw.legacy_type);
        let data = raw
            .object
            .filter(|value| !value.is_null())
            .or(raw.data)
            .unwrap_or(Value::Null);

        Ok(WebhookEvent {
            id: raw.id,
            kind: EventKind::from_type(event_type.as_deref()),
            data,
        })
    }
}
