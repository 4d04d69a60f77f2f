//! HTTP middleware stack for the storefront API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. CORS (storefront origin only)
//! 3. `TraceLayer` (request span with status and latency)
//! 4. Request ID (`x-request-id`, recorded on the span)
//! 5. Session layer (tower-sessions, `tl_session` cookie)
//! 6. Rate limiting on credential routes (governor)
//!
//! Authentication is enforced per handler with the [`RequireAuth`] and
//! [`RequireAdmin`] extractors.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use auth::{RequireAdmin, RequireAuth, clear_current_user, set_current_user};
pub use rate_limit::auth_rate_limiter;
pub use request_id::request_id_middleware;
pub use session::create_session_layer;
