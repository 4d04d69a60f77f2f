//! Checkout, payment verification and order management over HTTP.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use serde_json::json;

use threadline_integration_tests::{CLIENT_ORIGIN, TestApp, checkout_body, send};

#[tokio::test]
async fn test_cod_order_reserves_stock_and_clears_cart() {
    let app = TestApp::spawn().await;
    let tee = app.seed_product("Pocket Tee", 100, &[("M", 5)]).await;
    let client = app.customer("cod@example.com").await;

    send(
        client
            .post(app.url("/cart/add"))
            .json(&json!({ "productId": tee, "size": "M", "quantity": 3 })),
    )
    .await;

    let (status, body) = send(
        client
            .post(app.url("/order/cod"))
            .json(&checkout_body(&[(tee, "M", 3)], 300, 20, "cod")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Order created successfully");
    assert_eq!(body["order"]["status"], "Placed");
    assert_eq!(body["order"]["payment"], false);
    assert_eq!(body["order"]["paymentMethod"], "cod");

    assert_eq!(app.store.stock(tee, "M"), Some(2));

    let (_, cart) = send(client.get(app.url("/cart"))).await;
    assert!(cart["cart"]["items"].as_array().unwrap().is_empty());

    let (_, orders) = send(client.get(app.url("/order/user-orders"))).await;
    assert_eq!(orders["count"], 1);
    assert_eq!(orders["orders"][0]["products"][0]["product"]["name"], "Pocket Tee");
}

#[tokio::test]
async fn test_cod_order_rejected_when_stock_is_short() {
    let app = TestApp::spawn().await;
    let tee = app.seed_product("Pocket Tee", 100, &[("M", 2)]).await;
    let client = app.customer("short@example.com").await;

    let (status, body) = send(
        client
            .post(app.url("/order/cod"))
            .json(&checkout_body(&[(tee, "M", 3)], 300, 0, "cod")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let unavailable = body["unavailableProducts"].as_array().unwrap();
    assert_eq!(unavailable.len(), 1);
    assert_eq!(app.store.stock(tee, "M"), Some(2));

    let (_, orders) = send(client.get(app.url("/order/user-orders"))).await;
    assert_eq!(orders["count"], 0);
    assert_eq!(orders["message"], "No orders found for this user");
}

#[tokio::test]
async fn test_online_checkout_then_verify() {
    let app = TestApp::spawn().await;
    let tee = app.seed_product("Pocket Tee", 50, &[("M", 5)]).await;
    let client = app.customer("online@example.com").await;

    let (status, body) = send(
        client
            .post(app.url("/order/online"))
            .json(&checkout_body(&[(tee, "M", 2)], 100, 50, "online")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Stripe checkout session created");

    let redirect = url::Url::parse(body["url"].as_str().unwrap()).unwrap();
    assert!(redirect.as_str().starts_with(CLIENT_ORIGIN));
    let params: std::collections::HashMap<String, String> =
        redirect.query_pairs().into_owned().collect();
    let order_id: i64 = params["orderId"].parse().unwrap();
    let session_id = params["session_id"].clone();
    assert_eq!(body["orderId"], order_id);

    let verify = json!({ "orderId": order_id, "session_id": session_id });

    // Not paid yet.
    let (status, body) = send(client.post(app.url("/order/verify")).json(&verify)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Payment not completed or failed");

    app.gateway.mark_paid(&session_id);

    let (status, body) = send(client.post(app.url("/order/verify")).json(&verify)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment Verified");
    assert_eq!(body["order"]["payment"], true);
    assert_eq!(body["order"]["status"], "Placed");

    // Verifying again is a no-op.
    let calls = app.gateway.status_calls();
    let (status, _) = send(client.post(app.url("/order/verify")).json(&verify)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.gateway.status_calls(), calls);

    // Online orders do not touch stock unless configured to.
    assert_eq!(app.store.stock(tee, "M"), Some(5));
}

#[tokio::test]
async fn test_verify_rejects_other_users_orders() {
    let app = TestApp::spawn().await;
    let tee = app.seed_product("Pocket Tee", 50, &[("M", 5)]).await;
    let owner = app.customer("owner@example.com").await;
    let other = app.customer("other@example.com").await;

    let (_, body) = send(
        owner
            .post(app.url("/order/online"))
            .json(&checkout_body(&[(tee, "M", 1)], 50, 0, "online")),
    )
    .await;
    let order_id = body["orderId"].as_i64().unwrap();
    app.gateway.mark_paid("cs_test_1");

    let (status, _) = send(
        other
            .post(app.url("/order/verify"))
            .json(&json!({ "orderId": order_id, "sessionId": "cs_test_1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(other.get(app.url(&format!("/order/{order_id}")))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gateway_outage_is_reported_and_order_cancelled() {
    let app = TestApp::spawn().await;
    let tee = app.seed_product("Pocket Tee", 50, &[("M", 5)]).await;
    let client = app.customer("outage@example.com").await;
    app.gateway.fail_create(true);

    let (status, body) = send(
        client
            .post(app.url("/order/online"))
            .json(&checkout_body(&[(tee, "M", 1)], 50, 0, "online")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["message"], "Payment provider error");

    let (_, orders) = send(client.get(app.url("/order/user-orders"))).await;
    assert_eq!(orders["orders"][0]["status"], "Cancelled");
}

#[tokio::test]
async fn test_admin_cancels_cod_order_and_restores_stock() {
    let app = TestApp::spawn().await;
    let tee = app.seed_product("Pocket Tee", 100, &[("M", 5)]).await;
    let shopper = app.customer("buyer@example.com").await;
    let admin = app.admin("ops@example.com").await;

    let (_, body) = send(
        shopper
            .post(app.url("/order/cod"))
            .json(&checkout_body(&[(tee, "M", 2)], 200, 0, "cod")),
    )
    .await;
    let order_id = body["order"]["id"].as_i64().unwrap();
    assert_eq!(app.store.stock(tee, "M"), Some(3));

    let (status, _) = send(shopper.get(app.url("/order"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(admin.get(app.url("/order"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = send(
        admin
            .put(app.url(&format!("/order/{order_id}")))
            .json(&json!({ "status": "Cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "Cancelled");
    assert_eq!(app.store.stock(tee, "M"), Some(5));

    let (status, _) = send(
        admin
            .put(app.url(&format!("/order/{order_id}")))
            .json(&json!({ "status": "Shipped" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.store.stock(tee, "M"), Some(5));
}
