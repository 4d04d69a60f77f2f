//! Stripe Checkout over its REST API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;

use super::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, SessionStatus};
use crate::config::StripeConfig;

/// Stripe Checkout client.
#[derive(Clone)]
pub struct StripeGateway {
    inner: Arc<StripeGatewayInner>,
}

struct StripeGatewayInner {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

impl StripeGateway {
    /// Build a client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unavailable` if the HTTP client cannot be built.
    pub fn new(config: &StripeConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(StripeGatewayInner {
                client,
                api_base: config.api_base.trim_end_matches('/').to_owned(),
                secret_key: config.secret_key.clone(),
                currency: config.currency.clone(),
            }),
        })
    }

    /// Form fields for `POST /v1/checkout/sessions`.
    fn session_form(&self, request: &CheckoutRequest) -> Result<Vec<(String, String)>, GatewayError> {
        let mut form = vec![
            ("mode".to_owned(), "payment".to_owned()),
            ("payment_method_types[0]".to_owned(), "card".to_owned()),
            ("success_url".to_owned(), request.success_url.clone()),
            ("cancel_url".to_owned(), request.cancel_url.clone()),
            (
                "metadata[userId]".to_owned(),
                request.metadata.user_id.to_string(),
            ),
            (
                "metadata[orderId]".to_owned(),
                request.metadata.order_id.to_string(),
            ),
            (
                "metadata[totalAmount]".to_owned(),
                request.metadata.total_amount.to_string(),
            ),
        ];

        for (i, line) in request.line_items.iter().enumerate() {
            let unit_amount = line.unit_price.to_minor_units().ok_or_else(|| {
                GatewayError::Malformed(format!("unit price out of range: {}", line.unit_price))
            })?;
            let prefix = format!("line_items[{i}]");
            form.extend([
                (
                    format!("{prefix}[price_data][currency]"),
                    self.inner.currency.clone(),
                ),
                (
                    format!("{prefix}[price_data][product_data][name]"),
                    line.name.clone(),
                ),
                (
                    format!("{prefix}[price_data][unit_amount]"),
                    unit_amount.to_string(),
                ),
                (format!("{prefix}[quantity]"), line.quantity.to_string()),
            ]);
        }

        Ok(form)
    }

    async fn parse(response: reqwest::Response) -> Result<SessionResponse, GatewayError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Stripe returned non-success status"
            );
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Stripe session response");
            GatewayError::Malformed(e.to_string())
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip_all, fields(order_id = %request.metadata.order_id))]
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let form = self.session_form(request)?;
        let response = self
            .inner
            .client
            .post(format!("{}/v1/checkout/sessions", self.inner.api_base))
            .bearer_auth(self.inner.secret_key.expose_secret())
            .form(&form)
            .send()
            .await?;

        let session = Self::parse(response).await?;
        let redirect_url = session
            .url
            .ok_or_else(|| GatewayError::Malformed("session has no url".to_owned()))?;

        tracing::info!(session_id = %session.id, "Created checkout session");
        Ok(CheckoutSession {
            session_id: session.id,
            redirect_url,
        })
    }

    #[instrument(skip(self))]
    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, GatewayError> {
        let response = self
            .inner
            .client
            .get(format!(
                "{}/v1/checkout/sessions/{session_id}",
                self.inner.api_base
            ))
            .bearer_auth(self.inner.secret_key.expose_secret())
            .send()
            .await?;

        let session = Self::parse(response).await?;
        Ok(SessionStatus {
            paid: session.payment_status.as_deref() == Some("paid"),
        })
    }
}
