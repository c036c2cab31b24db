//! HTTP payment gateway client.
//!
//! Opens hosted checkout sessions with a form-encoded POST to
//! `{base_url}/checkout/sessions`, authenticated with the gateway secret key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use gifting_types::{CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway};

/// Settings for [`HttpPaymentGateway`].
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub api_key: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Client-level timeout; the service applies its own bound as well.
    pub timeout: Duration,
}

/// Session as returned by the gateway.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Payment gateway reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    settings: GatewaySettings,
}

impl HttpPaymentGateway {
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        Ok(Self { client, settings })
    }

    fn form_params(&self, req: &CheckoutSessionRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("mode", "payment".to_string()),
            ("success_url", self.settings.success_url.clone()),
            ("cancel_url", self.settings.cancel_url.clone()),
            ("client_reference_id", req.record_id.clone()),
            (
                "line_items[0][price_data][currency]",
                req.amount.currency().gateway_code().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                req.description.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                req.amount.amount().to_string(),
            ),
            ("line_items[0][quantity]", "1".to_string()),
            ("metadata[record_id]", req.record_id.clone()),
            ("metadata[purpose]", req.purpose.to_string()),
        ];

        if let Some(credits) = req.credits {
            params.push(("metadata[credits]", credits.to_string()));
        }

        params
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self, req), fields(record_id = %req.record_id, purpose = %req.purpose))]
    async fn create_checkout_session(
        &self,
        req: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let url = format!(
            "{}/checkout/sessions",
            self.settings.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(url)
            .basic_auth(&self.settings.api_key, Option::<&str>::None)
            .form(&self.form_params(&req))
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => status.to_string(),
            };
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        let checkout_url = session
            .url
            .ok_or_else(|| GatewayError::MalformedResponse("session without url".into()))?;

        tracing::debug!(session_id = %session.id, "Gateway opened checkout session");

        Ok(CheckoutSession {
            session_id: session.id,
            checkout_url,
        })
    }
}
