//! Domain models for storefront.

pub mod cart;
pub mod inventory;
pub mod order;
pub mod product;
pub mod session;
pub mod user;

pub use cart::{BulkAddOutcome, CartLineView, CartView, LineInput, SkippedLine};
pub use inventory::{
    Availability, AvailableItem, Reservation, UnavailableItem, UnavailableReason,
};
pub use order::{DeliveryData, NewOrder, Order, OrderLine, PlaceOrder};
pub use product::{
    NewProduct, Pagination, Product, ProductPage, ProductPatch, ProductQuery, ProductSummary,
    SizeStock, SortKey, SortOrder,
};
pub use session::{CurrentUser, keys as session_keys};
pub use user::User;
