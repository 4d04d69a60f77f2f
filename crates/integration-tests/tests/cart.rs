//! Cart flows over HTTP.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use serde_json::json;

use threadline_integration_tests::{TestApp, send};

#[tokio::test]
async fn test_cart_requires_login() {
    let app = TestApp::spawn().await;
    let (status, body) = send(TestApp::client().get(app.url("/cart"))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authorized, please log in");
}

#[tokio::test]
async fn test_add_merges_update_and_remove() {
    let app = TestApp::spawn().await;
    let tee = app.seed_product("Pocket Tee", 120, &[("M", 5), ("L", 1)]).await;
    let client = app.customer("cart@example.com").await;

    for _ in 0..2 {
        let (status, _) = send(
            client
                .post(app.url("/cart/add"))
                .json(&json!({ "productId": tee, "size": "M", "quantity": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = send(client.get(app.url("/cart"))).await;
    let items = body["cart"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 4);
    assert_eq!(items[0]["product"]["name"], "Pocket Tee");

    // Only one L in stock.
    let (status, body) = send(
        client
            .post(app.url("/cart/add"))
            .json(&json!({ "productId": tee, "size": "L", "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = send(
        client
            .put(app.url("/cart/update"))
            .json(&json!({ "productId": tee, "size": "M", "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cart"]["items"][0]["quantity"], 1);

    let (status, body) = send(client.delete(app.url(&format!("/cart/remove/{tee}/M")))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["cart"]["items"].as_array().unwrap().is_empty());

    // Stock is untouched by cart operations.
    assert_eq!(app.store.stock(tee, "M"), Some(5));
}

#[tokio::test]
async fn test_bulk_add_reports_skipped_lines() {
    let app = TestApp::spawn().await;
    let tee = app.seed_product("Pocket Tee", 120, &[("M", 5)]).await;
    let client = app.customer("bulk@example.com").await;

    let (status, body) = send(client.post(app.url("/cart/bulk-add")).json(&json!({
        "products": [
            { "productId": tee, "size": "M", "quantity": 2 },
            { "productId": tee, "size": "XL", "quantity": 1 },
            { "productId": 404, "size": "M", "quantity": 1 }
        ]
    })))
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cart"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["skipped"].as_array().unwrap().len(), 2);

    let (status, _) = send(
        client
            .post(app.url("/cart/bulk-add"))
            .json(&json!({ "products": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
