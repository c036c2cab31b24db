//! Inbound payment gateway events and their audit journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Envelope of an event delivered by the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// Gateway-assigned event id (stable across redeliveries)
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: GatewayEventData,
    #[serde(default)]
    pub created: Option<i64>,
}

/// Event data container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEventData {
    pub object: serde_json::Value,
}

/// Event types the reconciliation engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEventKind {
    CheckoutCompleted,
    CheckoutExpired,
    /// Anything else. Acknowledged, never an error.
    Unhandled,
}

impl GatewayEventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                Self::CheckoutCompleted
            }
            "checkout.session.expired" | "checkout.session.async_payment_failed" => {
                Self::CheckoutExpired
            }
            _ => Self::Unhandled,
        }
    }
}

/// Metadata echoed back by the gateway. Values arrive as strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub credits: Option<String>,
}

impl CheckoutMetadata {
    pub fn credits(&self) -> Option<i64> {
        self.credits.as_deref().and_then(|c| c.trim().parse().ok())
    }
}

/// Checkout session object nested in checkout events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionObject {
    /// Session id, the correlation key for local records
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: CheckoutMetadata,
}

impl CheckoutSessionObject {
    /// False while an asynchronous payment method is still processing.
    pub fn payment_settled(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            None | Some("paid") | Some("no_payment_required")
        )
    }
}

impl GatewayEvent {
    /// Parses the nested object as a checkout session.
    pub fn checkout_session(&self) -> Result<CheckoutSessionObject, DomainError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            DomainError::ValidationError(format!("malformed checkout session: {}", e))
        })
    }
}

/// What processing a gateway event amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// A state transition was applied.
    Applied,
    /// The record was already in the target state.
    Duplicate,
    /// Event type not handled, or payment still processing.
    #[default]
    Ignored,
    /// No local record matched the session.
    UnknownRecord,
    Failed,
}

impl AsRef<str> for EventOutcome {
    fn as_ref(&self) -> &str {
        match self {
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
            Self::UnknownRecord => "unknown_record",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for EventOutcome {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "applied" => Ok(Self::Applied),
            "duplicate" => Ok(Self::Duplicate),
            "ignored" => Ok(Self::Ignored),
            "unknown_record" => Ok(Self::UnknownRecord),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown event outcome: {}",
                other
            ))),
        }
    }
}

/// Audit journal entry for a received gateway event, keyed by event id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEventRecord {
    pub event_id: String,
    pub event_type: String,
    pub session_id: Option<String>,
    pub outcome: EventOutcome,
    pub received_at: DateTime<Utc>,
    pub attempts: i32,
    pub last_error: Option<String>,
}

impl GatewayEventRecord {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        session_id: Option<String>,
        outcome: EventOutcome,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            session_id,
            outcome,
            received_at,
            attempts: 1,
            last_error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(
            GatewayEventKind::from_type("checkout.session.completed"),
            GatewayEventKind::CheckoutCompleted
        );
        assert_eq!(
            GatewayEventKind::from_type("checkout.session.async_payment_failed"),
            GatewayEventKind::CheckoutExpired
        );
        assert_eq!(
            GatewayEventKind::from_type("invoice.paid"),
            GatewayEventKind::Unhandled
        );
    }

    #[test]
    fn test_parse_checkout_session() {
        let raw = r#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_1",
                "payment_intent": "pi_1",
                "payment_status": "paid",
                "metadata": {"record_id": "abc", "purpose": "credit_purchase", "credits": "175"}
            }}
        }"#;
        let event: GatewayEvent = serde_json::from_str(raw).unwrap();
        let session = event.checkout_session().unwrap();

        assert_eq!(session.id, "cs_1");
        assert_eq!(session.payment_intent.as_deref(), Some("pi_1"));
        assert_eq!(session.metadata.credits(), Some(175));
        assert!(session.payment_settled());
    }

    #[test]
    fn test_unpaid_session_is_not_settled() {
        let session: CheckoutSessionObject =
            serde_json::from_str(r#"{"id": "cs_2", "payment_status": "unpaid"}"#).unwrap();
        assert!(!session.payment_settled());
        assert!(session.metadata.record_id.is_none());
    }

    #[test]
    fn test_session_without_id_is_rejected() {
        let event: GatewayEvent = serde_json::from_str(
            r#"{"id": "evt_3", "type": "checkout.session.expired", "data": {"object": {}}}"#,
        )
        .unwrap();
        assert!(event.checkout_session().is_err());
    }
}
