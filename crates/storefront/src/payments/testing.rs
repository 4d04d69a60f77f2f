//! In-process gateway for tests.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, SessionStatus};

#[derive(Default)]
struct Recorded {
    requests: Vec<CheckoutRequest>,
    paid: Vec<String>,
    status_calls: usize,
    fail_create: bool,
}

/// Records checkout requests and answers status queries from a paid set.
///
/// Session ids are `cs_test_{n}`; the redirect URL is the request's success
/// URL with the placeholder filled in, which is what the shopper would land on
/// after paying.
#[derive(Default)]
pub struct RecordingGateway {
    state: Mutex<Recorded>,
}

impl RecordingGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Recorded> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a session as paid.
    pub fn mark_paid(&self, session_id: &str) {
        self.state().paid.push(session_id.to_owned());
    }

    /// Make subsequent `create_session` calls fail as if the provider were down.
    pub fn fail_create(&self, fail: bool) {
        self.state().fail_create = fail;
    }

    /// Requests passed to `create_session`, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.state().requests.clone()
    }

    #[must_use]
    pub fn status_calls(&self) -> usize {
        self.state().status_calls
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let mut state = self.state();
        if state.fail_create {
            return Err(GatewayError::Unavailable("connection refused".to_owned()));
        }
        state.requests.push(request.clone());
        let session_id = format!("cs_test_{}", state.requests.len());
        let redirect_url = request
            .success_url
            .replace("{CHECKOUT_SESSION_ID}", &session_id);
        Ok(CheckoutSession {
            session_id,
            redirect_url,
        })
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, GatewayError> {
        let mut state = self.state();
        state.status_calls += 1;
        Ok(SessionStatus {
            paid: state.paid.iter().any(|id| id == session_id),
        })
    }
}
