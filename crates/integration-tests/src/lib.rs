//! Integration test harness for the Threadline storefront.
//!
//! [`TestApp::spawn`] serves the real router on an ephemeral port, backed by
//! the in-memory repositories, an in-memory session store and the recording
//! payment gateway. Tests talk to it over HTTP with `reqwest`, one cookie jar
//! per shopper.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p threadline-integration-tests
//! ```
//!
//! The credential routes are rate limited per client IP (burst of 5), and
//! every request here comes from loopback, so each test spawns its own app and
//! keeps to a handful of register/login calls.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use threadline_core::{Email, Price, ProductId, UserRole};
use threadline_storefront::db::{MemoryStore, ProductRepository, Repositories, UserRepository};
use threadline_storefront::middleware::create_session_layer;
use threadline_storefront::models::{NewProduct, SizeStock};
use threadline_storefront::payments::testing::RecordingGateway;
use threadline_storefront::services::CheckoutSettings;
use threadline_storefront::state::AppState;

/// Origin the checkout redirect URLs are built from.
pub const CLIENT_ORIGIN: &str = "http://shop.test";

/// Password used for every account created by the harness.
pub const PASSWORD: &str = "correct-horse-battery";

/// A running storefront plus handles on its backing stores.
pub struct TestApp {
    pub base_url: String,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<RecordingGateway>,
}

impl TestApp {
    /// Spawn with stock reserved only for COD orders.
    pub async fn spawn() -> Self {
        Self::spawn_with(false).await
    }

    /// Spawn, choosing whether verified online orders reserve stock.
    pub async fn spawn_with(reserve_on_verify: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingGateway::new());
        let state = AppState::with_repositories(
            Repositories::in_memory(&store),
            gateway.clone(),
            CheckoutSettings {
                client_origin: CLIENT_ORIGIN.to_owned(),
                reserve_on_verify,
            },
        );

        let session_layer = create_session_layer(tower_sessions::MemoryStore::default(), false);
        let app = threadline_storefront::app(state, session_layer);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            store,
            gateway,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// A fresh client with its own cookie jar.
    #[must_use]
    pub fn client() -> Client {
        Client::builder().cookie_store(true).build().unwrap()
    }

    /// Insert a product directly into the store.
    pub async fn seed_product(&self, name: &str, price: u32, sizes: &[(&str, u32)]) -> ProductId {
        let product = NewProduct {
            name: name.to_owned(),
            description: format!("{name} description"),
            price: Price::from_units(price),
            category: "Men".to_owned(),
            sub_category: "Topwear".to_owned(),
            images: vec!["https://cdn.shop.test/item.jpg".to_owned()],
            sizes: sizes
                .iter()
                .map(|(size, quantity)| SizeStock {
                    size: (*size).to_owned(),
                    quantity: *quantity,
                })
                .collect(),
        };
        ProductRepository::create(self.store.as_ref(), &product)
            .await
            .unwrap()
            .id
    }

    /// Register and log in a customer. Uses two credential requests.
    pub async fn customer(&self, email: &str) -> Client {
        let client = Self::client();
        self.register(&client, email).await;
        self.login(&client, email).await;
        client
    }

    /// Register, promote to admin, then log in. Uses two credential requests.
    pub async fn admin(&self, email: &str) -> Client {
        let client = Self::client();
        self.register(&client, email).await;
        UserRepository::set_role(
            self.store.as_ref(),
            &Email::parse(email).unwrap(),
            UserRole::Admin,
        )
        .await
        .unwrap()
        .unwrap();
        self.login(&client, email).await;
        client
    }

    async fn register(&self, client: &Client, email: &str) {
        let response = client
            .post(self.url("/user/register"))
            .json(&json!({ "name": "Test Shopper", "email": email, "password": PASSWORD }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    async fn login(&self, client: &Client, email: &str) {
        let response = client
            .post(self.url("/user/login"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

/// Send a request and decode the JSON envelope.
pub async fn send(request: reqwest::RequestBuilder) -> (StatusCode, Value) {
    let response = request.send().await.unwrap();
    let status = response.status();
    let body = response.json::<Value>().await.unwrap();
    (status, body)
}

/// A well-formed checkout body for `lines` with the given totals.
#[must_use]
pub fn checkout_body(
    lines: &[(ProductId, &str, i64)],
    amount: u32,
    delivery_fee: u32,
    payment_method: &str,
) -> Value {
    let products: Vec<Value> = lines
        .iter()
        .map(|(product_id, size, quantity)| {
            json!({ "productId": product_id, "size": size, "quantity": quantity })
        })
        .collect();
    json!({
        "products": products,
        "amount": amount,
        "deliveryFee": delivery_fee,
        "totalAmount": amount + delivery_fee,
        "paymentMethod": payment_method,
        "deliveryData": {
            "fullName": "Rina Hartono",
            "phone": "+62 812 0000 0000",
            "email": "rina@example.com",
            "street": "Jl. Melati 12",
            "city": "Bandung",
            "state": "Jawa Barat",
            "zipCode": "40115",
            "country": "Indonesia"
        }
    })
}
