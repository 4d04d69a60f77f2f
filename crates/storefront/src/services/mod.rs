//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Registration and password login
//! - `cart` - Cart lines validated against live stock
//! - `catalog` - Product listing and admin maintenance
//! - `orders` - Checkout (COD and hosted payment), verification, fulfilment
//!
//! Services borrow repository trait objects from [`crate::state::AppState`] and
//! are constructed per request.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod orders;

pub use auth::{AuthError, AuthService};
pub use cart::{CartError, CartService};
pub use catalog::{CatalogError, CatalogService};
pub use orders::{CheckoutSettings, OnlineCheckout, OrderError, OrderWorkflow};
