//! Hosted checkout gateway.
//!
//! The order workflow talks to the payment provider through the two-call
//! [`PaymentGateway`] trait: open a checkout session, later ask whether it was
//! paid. [`StripeGateway`] is the production implementation. With the
//! `testing` feature, `testing::RecordingGateway` records calls for tests.

mod stripe;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use threadline_core::{OrderId, Price, UserId};

pub use stripe::StripeGateway;

/// Errors talking to the payment provider.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Timeout or connection failure.
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with a non-success status.
    #[error("payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The provider's response could not be understood.
    #[error("malformed payment provider response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

/// One line on the hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutLineItem {
    pub name: String,
    pub unit_price: Price,
    pub quantity: u32,
}

impl CheckoutLineItem {
    #[must_use]
    pub fn total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Identifiers attached to the session so it can be traced back to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub total_amount: Price,
}

/// Everything needed to open a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub line_items: Vec<CheckoutLineItem>,
    /// May contain the provider's `{CHECKOUT_SESSION_ID}` placeholder.
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: CheckoutMetadata,
}

/// A created checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    /// Where to send the shopper.
    pub redirect_url: String,
}

/// Payment state of a checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub paid: bool,
}

/// A hosted checkout provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, GatewayError>;
}
