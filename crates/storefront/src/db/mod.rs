//! Database operations for the storefront.
//!
//! # Database: `threadline`
//!
//! ## Tables
//!
//! - `storefront.user` / `storefront.user_password` - Accounts and Argon2 hashes
//! - `storefront.product` / `storefront.product_size` - Catalog and per-size stock
//! - `storefront.cart_line` - One row per (user, product, size)
//! - `storefront.order` / `storefront.order_line` - Orders and line snapshots
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! # Seams
//!
//! Every table group sits behind an `async_trait` repository so services can be
//! exercised against [`MemoryStore`] in tests. [`Repositories::postgres`] wires
//! the `sqlx` implementations used in production.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p threadline-cli -- migrate
//! ```

pub mod carts;
pub mod inventory;
pub mod memory;
pub mod orders;
pub mod products;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use threadline_core::{Email, LineItem, OrderId, OrderStatus, ProductId, UserId, UserRole};

use crate::models::{
    Availability, NewOrder, NewProduct, Order, Product, ProductQuery, Reservation, User,
};

pub use carts::PgCarts;
pub use inventory::PgInventory;
pub use memory::MemoryStore;
pub use orders::PgOrders;
pub use products::PgProducts;
pub use users::PgUsers;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in database is invalid or corrupted.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// Unique constraint violation.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

// =============================================================================
// Repository traits
// =============================================================================

/// Catalog persistence.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Load several products; missing ids are simply absent from the result.
    async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// One page of products plus the total number of matches.
    async fn list(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64), RepositoryError>;

    async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError>;

    /// Replace a product's fields and size list. `None` if it does not exist.
    async fn update(
        &self,
        id: ProductId,
        product: &NewProduct,
    ) -> Result<Option<Product>, RepositoryError>;

    /// Delete a product, returning what was deleted.
    async fn delete(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
}

/// Authority over per-size stock.
///
/// `reserve` is all-or-nothing and never drives a quantity below zero, even
/// under concurrent callers.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Read-only check of every line, in input order.
    async fn check_availability(
        &self,
        items: &[LineItem],
    ) -> Result<Vec<Availability>, RepositoryError>;

    /// Decrement stock for every line or for none of them.
    async fn reserve(&self, items: &[LineItem]) -> Result<Reservation, RepositoryError>;

    /// Return stock for previously reserved lines. Vanished products are skipped.
    async fn release(&self, items: &[LineItem]) -> Result<(), RepositoryError>;
}

/// Per-user cart lines keyed by (product, size).
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Lines in insertion order.
    async fn lines(&self, user_id: UserId) -> Result<Vec<LineItem>, RepositoryError>;

    /// Insert a line or add its quantity to the existing (product, size) line.
    async fn add_line(&self, user_id: UserId, line: &LineItem) -> Result<(), RepositoryError>;

    /// Replace the quantity of an existing line. Returns `false` if there is no such line.
    async fn set_quantity(
        &self,
        user_id: UserId,
        line: &LineItem,
    ) -> Result<bool, RepositoryError>;

    /// Delete a line. Returns `false` if there was no such line.
    async fn remove_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        size: &str,
    ) -> Result<bool, RepositoryError>;

    /// Remove every line. Idempotent.
    async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError>;
}

/// Order persistence. State changes are conditional updates so concurrent
/// callers cannot both win the same transition.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// A user's orders, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Every order, newest first.
    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError>;

    async fn set_checkout_session(
        &self,
        id: OrderId,
        session_id: &str,
    ) -> Result<(), RepositoryError>;

    /// `Unpaid` + unpaid -> `Placed` + paid. `None` if the order was not in that state.
    async fn mark_paid(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Move from `from` to `to`. `None` if the current status is not `from`.
    async fn transition(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Clear `stock_reserved` if set. Returns whether this call cleared it.
    async fn take_stock_reservation(&self, id: OrderId) -> Result<bool, RepositoryError>;

    async fn set_stock_reserved(&self, id: OrderId, reserved: bool)
    -> Result<(), RepositoryError>;
}

/// Account persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a user and their password hash together.
    ///
    /// Returns `RepositoryError::Conflict` if the email is taken.
    async fn create_with_password(
        &self,
        name: &str,
        email: &Email,
        password_hash: &str,
    ) -> Result<User, RepositoryError>;

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// A user together with their password hash.
    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;

    async fn set_role(&self, email: &Email, role: UserRole)
    -> Result<Option<User>, RepositoryError>;
}

// =============================================================================
// Wiring
// =============================================================================

/// The full set of repositories handed to services.
#[derive(Clone)]
pub struct Repositories {
    pub products: Arc<dyn ProductRepository>,
    pub inventory: Arc<dyn InventoryLedger>,
    pub carts: Arc<dyn CartRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Repositories {
    /// `sqlx` repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            products: Arc::new(PgProducts::new(pool.clone())),
            inventory: Arc::new(PgInventory::new(pool.clone())),
            carts: Arc::new(PgCarts::new(pool.clone())),
            orders: Arc::new(PgOrders::new(pool.clone())),
            users: Arc::new(PgUsers::new(pool.clone())),
        }
    }

    /// Repositories backed by one shared [`MemoryStore`].
    #[must_use]
    pub fn in_memory(store: &Arc<MemoryStore>) -> Self {
        Self {
            products: store.clone(),
            inventory: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
            users: store.clone(),
        }
    }
}

/// Map a unique violation to `Conflict`, everything else to `Database`.
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(err)
}

/// Convert a stored `INTEGER` count into `u32`.
pub(crate) fn stored_count(value: i32, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {column}: {value}")))
}

/// Bind a quantity as `INTEGER`; values beyond `i32::MAX` can never be satisfied.
pub(crate) fn bind_quantity(quantity: u32) -> i32 {
    i32::try_from(quantity).unwrap_or(i32::MAX)
}
