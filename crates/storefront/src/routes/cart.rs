//! Cart route handlers. Every route requires a logged-in user.

use axum::extract::State;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use threadline_core::ProductId;

use crate::error::Result;
use crate::extract::{JsonBody, PathParams};
use crate::middleware::RequireAuth;
use crate::models::LineInput;
use crate::response::Envelope;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BulkAddRequest {
    #[serde(default)]
    pub products: Vec<LineInput>,
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    JsonBody(input): JsonBody<LineInput>,
) -> Result<Envelope> {
    let cart = state.carts().add_line(user.id, &input).await?;
    Ok(Envelope::ok("Product added to cart", json!({ "cart": cart })))
}

#[instrument(skip(state, user, request), fields(user_id = %user.id))]
pub async fn bulk_add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    JsonBody(request): JsonBody<BulkAddRequest>,
) -> Result<Envelope> {
    let outcome = state
        .carts()
        .bulk_add_lines(user.id, &request.products)
        .await?;
    let message = if outcome.skipped.is_empty() {
        "Products added to cart"
    } else {
        "Some products could not be added to cart"
    };
    Ok(Envelope::ok(
        message,
        json!({ "cart": outcome.cart, "skipped": outcome.skipped }),
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Envelope> {
    let cart = state.carts().get_cart(user.id).await?;
    Ok(Envelope::ok("Cart fetched successfully", json!({ "cart": cart })))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    JsonBody(input): JsonBody<LineInput>,
) -> Result<Envelope> {
    let cart = state.carts().update_line(user.id, &input).await?;
    Ok(Envelope::ok("Cart updated", json!({ "cart": cart })))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    PathParams((product_id, size)): PathParams<(ProductId, String)>,
) -> Result<Envelope> {
    let cart = state
        .carts()
        .remove_line(user.id, product_id, size.trim())
        .await?;
    Ok(Envelope::ok(
        "Product removed from cart",
        json!({ "cart": cart }),
    ))
}
