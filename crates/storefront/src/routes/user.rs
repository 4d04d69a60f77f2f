//! Account route handlers.

use axum::extract::State;
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::extract::JsonBody;
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::response::Envelope;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Create an account. Does not log in.
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> Result<Envelope> {
    let user = state
        .auth()
        .register(&request.name, &request.email, &request.password)
        .await?;
    Ok(Envelope::created(
        "User registered successfully",
        json!({ "user": user }),
    ))
}

/// Verify credentials and store the user in the session.
#[instrument(skip(state, session, request), fields(email = %request.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Envelope> {
    let user = state.auth().login(&request.email, &request.password).await?;

    set_current_user(&session, &CurrentUser::from(&user))
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Envelope::ok(
        "Login successful",
        json!({ "user": user }),
    ))
}

/// End the session. Succeeds for anonymous sessions too.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<Envelope> {
    clear_current_user(&session)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    clear_sentry_user();
    Ok(Envelope::message("Logged out successfully"))
}

#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn profile(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Envelope> {
    let user = state.auth().get_user(current.id).await?;
    Ok(Envelope::ok(
        "User profile fetched",
        json!({ "user": user }),
    ))
}

