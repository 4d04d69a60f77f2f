//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness
//! GET    /health/ready                    - Readiness (database ping)
//!
//! # Accounts
//! POST   /user/register                   - Create account (rate limited)
//! POST   /user/login                      - Start session (rate limited)
//! DELETE /user/logout                     - End session
//! GET    /user/profile                    - Current user (auth)
//!
//! # Catalog
//! GET    /product                         - Listing (search, filter, sort, paginate)
//! GET    /product/{id}                    - Detail
//! POST   /product                         - Create (admin)
//! PUT    /product/{id}                    - Partial update (admin)
//! DELETE /product/{id}                    - Delete (admin)
//!
//! # Cart (auth)
//! POST   /cart/add                        - Add or merge one line
//! POST   /cart/bulk-add                   - Add many lines, skipping bad ones
//! GET    /cart                            - Cart with summaries and totals
//! PUT    /cart/update                     - Set quantity (<= 0 removes)
//! DELETE /cart/remove/{productId}/{size}  - Remove one line
//!
//! # Orders
//! POST   /order/cod                       - Cash-on-delivery checkout (auth)
//! POST   /order/online                    - Hosted checkout session (auth)
//! POST   /order/stripe                    - Alias of /order/online
//! POST   /order/verify                    - Confirm online payment (auth)
//! GET    /order/user-orders               - Own orders (auth)
//! GET    /order                           - All orders (admin)
//! GET    /order/{orderId}                 - One order (owner or admin)
//! PUT    /order/{orderId}                 - Change status (admin)
//! ```

pub mod cart;
pub mod health;
pub mod orders;
pub mod products;
pub mod user;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::middleware::auth_rate_limiter;
use crate::state::AppState;

/// Create the account routes router.
pub fn user_routes() -> Router<AppState> {
    let credentials = Router::new()
        .route("/register", post(user::register))
        .route("/login", post(user::login))
        .layer(auth_rate_limiter());

    Router::new()
        .merge(credentials)
        .route("/logout", delete(user::logout))
        .route("/profile", get(user::profile))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::destroy),
        )
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/bulk-add", post(cart::bulk_add))
        .route("/update", put(cart::update))
        .route("/remove/{product_id}/{size}", delete(cart::remove))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/cod", post(orders::place_cod))
        .route("/online", post(orders::place_online))
        .route("/stripe", post(orders::place_online))
        .route("/verify", post(orders::verify))
        .route("/user-orders", get(orders::user_orders))
        .route("/{order_id}", get(orders::show).put(orders::update_status))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/user", user_routes())
        .nest("/product", product_routes())
        .nest("/cart", cart_routes())
        .nest("/order", order_routes())
}
