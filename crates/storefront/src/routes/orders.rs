//! Order route handlers.

use axum::extract::State;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use threadline_core::{OrderId, OrderStatus};

use crate::error::{Result, add_breadcrumb};
use crate::extract::{JsonBody, PathParams};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::PlaceOrder;
use crate::response::Envelope;
use crate::state::AppState;

/// Body of `POST /order/verify`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub order_id: OrderId,
    #[serde(alias = "session_id")]
    pub session_id: String,
}

/// Body of `PUT /order/{orderId}`.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

#[instrument(skip(state, user, request), fields(user_id = %user.id))]
pub async fn place_cod(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    JsonBody(request): JsonBody<PlaceOrder>,
) -> Result<Envelope> {
    let order = state.orders().place_cod(user.id, request).await?;
    add_breadcrumb(
        "checkout",
        "Placed COD order",
        Some(&[("order_id", order.id.to_string().as_str())]),
    );
    Ok(Envelope::created(
        "Order created successfully",
        json!({ "order": order }),
    ))
}

#[instrument(skip(state, user, request), fields(user_id = %user.id))]
pub async fn place_online(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    JsonBody(request): JsonBody<PlaceOrder>,
) -> Result<Envelope> {
    let checkout = state.orders().place_online(user.id, request).await?;
    add_breadcrumb(
        "checkout",
        "Opened checkout session",
        Some(&[("order_id", checkout.order_id.to_string().as_str())]),
    );
    Ok(Envelope::ok(
        "Stripe checkout session created",
        json!({ "url": checkout.redirect_url, "orderId": checkout.order_id }),
    ))
}

#[instrument(skip(state, user, request), fields(user_id = %user.id, order_id = %request.order_id))]
pub async fn verify(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    JsonBody(request): JsonBody<VerifyRequest>,
) -> Result<Envelope> {
    let order = state
        .orders()
        .verify_payment(user.id, request.order_id, &request.session_id)
        .await?;
    Ok(Envelope::ok("Payment Verified", json!({ "order": order })))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn user_orders(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Envelope> {
    let orders = state.orders().user_orders(user.id).await?;
    let message = if orders.is_empty() {
        "No orders found for this user"
    } else {
        "Orders fetched successfully"
    };
    Ok(Envelope::ok(
        message,
        json!({ "count": orders.len(), "orders": orders }),
    ))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Envelope> {
    let orders = state.orders().all_orders().await?;
    Ok(Envelope::ok(
        "Orders fetched successfully",
        json!({ "count": orders.len(), "orders": orders }),
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    PathParams(order_id): PathParams<OrderId>,
) -> Result<Envelope> {
    let order = state.orders().get_order(&user, order_id).await?;
    Ok(Envelope::ok("Order fetched successfully", json!({ "order": order })))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParams(order_id): PathParams<OrderId>,
    JsonBody(update): JsonBody<StatusUpdate>,
) -> Result<Envelope> {
    let order = state
        .orders()
        .update_status(order_id, update.status)
        .await?;
    Ok(Envelope::ok("Order status updated", json!({ "order": order })))
}
