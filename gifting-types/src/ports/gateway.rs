//! Payment gateway port.
//!
//! The gateway hosts checkout sessions. Implementations can be HTTP clients,
//! fakes in tests, etc.

use crate::domain::{Money, Purpose};

/// Error type for gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway unreachable: {0}")]
    Unreachable(String),

    #[error("Gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),
}

/// What to open a checkout session for.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    /// Local record id, echoed back in webhook metadata
    pub record_id: String,
    pub purpose: Purpose,
    pub amount: Money,
    /// Credits bought, for credit purchases
    pub credits: Option<i64>,
    pub description: String,
}

/// A checkout session opened by the gateway.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub checkout_url: String,
}

/// Port trait for payment gateways.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted checkout session.
    async fn create_checkout_session(
        &self,
        req: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;
}
