//! Checkout and order lifecycle.
//!
//! # Payment paths
//!
//! - **COD**: availability check, all-or-nothing reservation, order persisted
//!   as `Placed`, cart cleared.
//! - **Online**: availability check, order persisted as `Unpaid` with no
//!   reservation, hosted checkout session opened. The cart is cleared only by
//!   the verification call that moves the order to `Placed`.
//!
//! Stock for online orders is not decremented unless
//! [`CheckoutSettings::reserve_on_verify`] is enabled.

use thiserror::Error;
use tracing::instrument;

use threadline_core::{LineItem, OrderId, OrderStatus, PaymentMethod, Price, ProductId, UserId};

use crate::db::{Repositories, RepositoryError};
use crate::models::inventory::partition;
use crate::models::{
    AvailableItem, CurrentUser, NewOrder, Order, PlaceOrder, Reservation, UnavailableItem,
};
use crate::payments::{
    CheckoutLineItem, CheckoutMetadata, CheckoutRequest, GatewayError, PaymentGateway,
};

/// Errors from the order workflow.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{0}")]
    Validation(String),

    /// At least one line cannot be satisfied; nothing was changed.
    #[error("Some products are unavailable")]
    Unavailable(Vec<UnavailableItem>),

    #[error("Order not found")]
    NotFound,

    /// The gateway reports the session as unpaid.
    #[error("Payment not completed or failed")]
    PaymentIncomplete,

    /// The order is not in a state that allows the request.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Checkout knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Storefront origin used for gateway redirects.
    pub client_origin: String,
    /// Reserve stock when an online payment is verified.
    pub reserve_on_verify: bool,
}

/// Result of starting an online checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineCheckout {
    pub order_id: OrderId,
    pub redirect_url: String,
}

/// Validated checkout request.
struct Checkout {
    items: Vec<LineItem>,
    amount: Price,
    delivery_fee: Price,
    total_amount: Price,
}

/// Orchestrates carts, inventory, orders and the payment gateway.
pub struct OrderWorkflow<'a> {
    repos: &'a Repositories,
    gateway: &'a dyn PaymentGateway,
    settings: &'a CheckoutSettings,
}

impl<'a> OrderWorkflow<'a> {
    #[must_use]
    pub const fn new(
        repos: &'a Repositories,
        gateway: &'a dyn PaymentGateway,
        settings: &'a CheckoutSettings,
    ) -> Self {
        Self {
            repos,
            gateway,
            settings,
        }
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Place a cash-on-delivery order.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed request, `Unavailable` when any line cannot
    /// be satisfied (inventory untouched), or a repository failure (any
    /// reservation already made is released first).
    #[instrument(skip(self, request), fields(lines = request.products.len()))]
    pub async fn place_cod(&self, user_id: UserId, request: PlaceOrder) -> Result<Order, OrderError> {
        let checkout = validate(&request, PaymentMethod::Cod)?;
        self.check_available(&checkout.items).await?;

        if let Reservation::Rejected(items) = self.repos.inventory.reserve(&checkout.items).await? {
            tracing::info!(rejected = items.len(), "COD reservation rejected");
            return Err(OrderError::Unavailable(items));
        }

        let new_order = NewOrder {
            user_id,
            items: checkout.items.clone(),
            amount: checkout.amount,
            delivery_fee: checkout.delivery_fee,
            total_amount: checkout.total_amount,
            delivery_data: request.delivery_data,
            payment_method: PaymentMethod::Cod,
            payment: false,
            status: OrderStatus::Placed,
            stock_reserved: true,
        };

        let order = match self.repos.orders.create(&new_order).await {
            Ok(order) => order,
            Err(e) => {
                if let Err(release_err) = self.repos.inventory.release(&checkout.items).await {
                    tracing::error!(
                        error = %release_err,
                        "Failed to release stock after order insert failed"
                    );
                }
                return Err(e.into());
            }
        };

        self.clear_cart(user_id).await;
        tracing::info!(order_id = %order.id, "COD order placed");
        Ok(order)
    }

    /// Create an unpaid order and open a hosted checkout session for it.
    ///
    /// # Errors
    ///
    /// `Validation`, `Unavailable`, `Gateway`, or a repository failure while
    /// saving the session. The order is cancelled in the last two cases.
    #[instrument(skip(self, request), fields(lines = request.products.len()))]
    pub async fn place_online(
        &self,
        user_id: UserId,
        request: PlaceOrder,
    ) -> Result<OnlineCheckout, OrderError> {
        let checkout = validate(&request, PaymentMethod::Online)?;
        let available = self.check_available(&checkout.items).await?;

        let order = self
            .repos
            .orders
            .create(&NewOrder {
                user_id,
                items: checkout.items,
                amount: checkout.amount,
                delivery_fee: checkout.delivery_fee,
                total_amount: checkout.total_amount,
                delivery_data: request.delivery_data,
                payment_method: PaymentMethod::Online,
                payment: false,
                status: OrderStatus::Unpaid,
                stock_reserved: false,
            })
            .await?;

        let origin = self.settings.client_origin.trim_end_matches('/');
        let checkout_request = CheckoutRequest {
            line_items: checkout_lines(&available, checkout.delivery_fee),
            success_url: format!(
                "{origin}/success?orderId={}&session_id={{CHECKOUT_SESSION_ID}}",
                order.id
            ),
            cancel_url: format!("{origin}/cart"),
            metadata: CheckoutMetadata {
                user_id,
                order_id: order.id,
                total_amount: checkout.total_amount,
            },
        };

        let session = match self.gateway.create_session(&checkout_request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "Checkout session failed, cancelling order");
                self.cancel_unpaid(order.id).await;
                return Err(e.into());
            }
        };

        // Without a stored session id the order can never be verified.
        if let Err(e) = self
            .repos
            .orders
            .set_checkout_session(order.id, &session.session_id)
            .await
        {
            tracing::warn!(order_id = %order.id, error = %e, "Saving checkout session failed, cancelling order");
            self.cancel_unpaid(order.id).await;
            return Err(e.into());
        }

        tracing::info!(order_id = %order.id, "Online order awaiting payment");
        Ok(OnlineCheckout {
            order_id: order.id,
            redirect_url: session.redirect_url,
        })
    }

    /// Confirm an online payment with the gateway and mark the order paid.
    ///
    /// Only the call that performs the `Unpaid -> Placed` transition clears
    /// the cart; repeated calls return the paid order unchanged.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing or foreign order, `Validation` for a COD order
    /// or mismatched session, `PaymentIncomplete`, `Conflict` for a cancelled
    /// order, or `Gateway`.
    #[instrument(skip(self, session_id))]
    pub async fn verify_payment(
        &self,
        user_id: UserId,
        order_id: OrderId,
        session_id: &str,
    ) -> Result<Order, OrderError> {
        let order = self
            .repos
            .orders
            .get(order_id)
            .await?
            .filter(|order| order.user_id == user_id)
            .ok_or(OrderError::NotFound)?;

        if order.payment_method != PaymentMethod::Online {
            return Err(OrderError::Validation(
                "Order was not placed for online payment".to_owned(),
            ));
        }
        if order.checkout_session_id.as_deref() != Some(session_id) {
            return Err(OrderError::Validation(
                "Checkout session does not belong to this order".to_owned(),
            ));
        }
        if order.payment {
            return Ok(order);
        }
        if order.status == OrderStatus::Cancelled {
            return Err(OrderError::Conflict("Order has been cancelled".to_owned()));
        }

        if !self.gateway.session_status(session_id).await?.paid {
            return Err(OrderError::PaymentIncomplete);
        }

        let Some(mut order) = self.repos.orders.mark_paid(order_id).await? else {
            // Lost the race to another verification, or the order changed.
            let current = self
                .repos
                .orders
                .get(order_id)
                .await?
                .ok_or(OrderError::NotFound)?;
            if current.payment {
                return Ok(current);
            }
            return Err(OrderError::Conflict(format!(
                "Order is {} and cannot be marked paid",
                current.status
            )));
        };

        if self.settings.reserve_on_verify {
            self.reserve_paid_order(&mut order).await;
        }

        self.clear_cart(user_id).await;
        tracing::info!(order_id = %order.id, "Payment verified");
        Ok(order)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// A user's orders, newest first, with product summaries.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn user_orders(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        let orders = self.repos.orders.list_for_user(user_id).await?;
        self.with_products(orders).await
    }

    /// Every order, newest first, with product summaries.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn all_orders(&self) -> Result<Vec<Order>, OrderError> {
        let orders = self.repos.orders.list_all().await?;
        self.with_products(orders).await
    }

    /// One order, visible to its owner and to admins.
    ///
    /// # Errors
    ///
    /// `NotFound` if missing or owned by another customer.
    pub async fn get_order(&self, viewer: &CurrentUser, id: OrderId) -> Result<Order, OrderError> {
        let order = self
            .repos
            .orders
            .get(id)
            .await?
            .filter(|order| viewer.is_admin() || order.user_id == viewer.id)
            .ok_or(OrderError::NotFound)?;
        let mut orders = self.with_products(vec![order]).await?;
        orders.pop().ok_or(OrderError::NotFound)
    }

    // =========================================================================
    // Fulfilment
    // =========================================================================

    /// Move an order to `next`, releasing reserved stock on cancellation.
    ///
    /// Setting the current status again is a no-op, except that re-cancelling
    /// an order that still holds stock retries the release.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `Conflict` for a transition the lifecycle does not allow.
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: OrderId, next: OrderStatus) -> Result<Order, OrderError> {
        let order = self.repos.orders.get(id).await?.ok_or(OrderError::NotFound)?;

        let mut order = if order.status == next {
            order
        } else {
            if !order.status.can_transition_to(next) {
                return Err(OrderError::Conflict(format!(
                    "Cannot change order status from {} to {next}",
                    order.status
                )));
            }
            self.repos
                .orders
                .transition(id, order.status, next)
                .await?
                .ok_or_else(|| {
                    OrderError::Conflict("Order status changed concurrently".to_owned())
                })?
        };

        if next == OrderStatus::Cancelled && order.stock_reserved {
            self.release_stock(&mut order).await?;
        }

        tracing::info!(order_id = %id, status = %order.status, "Order status updated");
        Ok(order)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn check_available(&self, items: &[LineItem]) -> Result<Vec<AvailableItem>, OrderError> {
        let results = self.repos.inventory.check_availability(items).await?;
        partition(results).map_err(OrderError::Unavailable)
    }

    async fn cancel_unpaid(&self, id: OrderId) {
        if let Err(e) = self
            .repos
            .orders
            .transition(id, OrderStatus::Unpaid, OrderStatus::Cancelled)
            .await
        {
            tracing::error!(order_id = %id, error = %e, "Failed to cancel unpaid order");
        }
    }

    async fn clear_cart(&self, user_id: UserId) {
        if let Err(e) = self.repos.carts.clear(user_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to clear cart after order");
        }
    }

    /// The payment is already recorded, so failures here are logged for
    /// manual follow-up rather than returned.
    async fn reserve_paid_order(&self, order: &mut Order) {
        match self.repos.inventory.reserve(&order.line_items()).await {
            Ok(Reservation::Reserved) => {
                if let Err(e) = self.repos.orders.set_stock_reserved(order.id, true).await {
                    tracing::error!(
                        order_id = %order.id,
                        error = %e,
                        "Stock reserved but flag not saved, needs manual follow-up"
                    );
                    return;
                }
                order.stock_reserved = true;
            }
            Ok(Reservation::Rejected(items)) => {
                tracing::error!(
                    order_id = %order.id,
                    unavailable = ?items,
                    "Paid order could not reserve stock, needs manual follow-up"
                );
            }
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    error = %e,
                    "Paid order reservation failed, needs manual follow-up"
                );
            }
        }
    }

    /// Release stock exactly once; the flag is restored if the release fails.
    async fn release_stock(&self, order: &mut Order) -> Result<(), OrderError> {
        if !self.repos.orders.take_stock_reservation(order.id).await? {
            order.stock_reserved = false;
            return Ok(());
        }
        if let Err(e) = self.repos.inventory.release(&order.line_items()).await {
            if let Err(restore_err) = self.repos.orders.set_stock_reserved(order.id, true).await {
                tracing::error!(order_id = %order.id, error = %restore_err, "Failed to restore stock flag");
            }
            return Err(e.into());
        }
        order.stock_reserved = false;
        tracing::info!(order_id = %order.id, "Released stock for cancelled order");
        Ok(())
    }

    async fn with_products(&self, mut orders: Vec<Order>) -> Result<Vec<Order>, OrderError> {
        let mut ids: Vec<ProductId> = orders
            .iter()
            .flat_map(|order| order.items.iter().map(|line| line.item.product_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(orders);
        }

        let products = self.repos.products.get_many(&ids).await?;
        for line in orders.iter_mut().flat_map(|order| order.items.iter_mut()) {
            line.product = products
                .iter()
                .find(|p| p.id == line.item.product_id)
                .map(crate::models::Product::summary);
        }
        Ok(orders)
    }
}

/// Shape checks shared by both payment paths.
fn validate(request: &PlaceOrder, method: PaymentMethod) -> Result<Checkout, OrderError> {
    let requested: PaymentMethod = request.payment_method.trim().parse().map_err(|_| {
        OrderError::Validation(format!("Invalid payment method: {}", request.payment_method))
    })?;
    if requested != method {
        return Err(OrderError::Validation(format!(
            "Payment method must be {method}"
        )));
    }

    if request.products.is_empty() {
        return Err(OrderError::Validation("No products in order".to_owned()));
    }
    let items = request
        .products
        .iter()
        .map(|input| input.validate().map_err(OrderError::Validation))
        .collect::<Result<Vec<_>, _>>()?;

    for (field, value) in [
        ("amount", request.amount),
        ("deliveryFee", request.delivery_fee),
        ("totalAmount", request.total_amount),
    ] {
        if !value.is_storable() {
            return Err(OrderError::Validation(format!(
                "{field} must have at most two decimal places and be below 10000000000"
            )));
        }
    }

    if request.amount + request.delivery_fee != request.total_amount {
        return Err(OrderError::Validation(
            "Total amount must equal amount plus delivery fee".to_owned(),
        ));
    }

    let missing = request.delivery_data.missing_fields();
    if !missing.is_empty() {
        return Err(OrderError::Validation(format!(
            "Missing delivery fields: {}",
            missing.join(", ")
        )));
    }

    Ok(Checkout {
        items,
        amount: request.amount,
        delivery_fee: request.delivery_fee,
        total_amount: request.total_amount,
    })
}

/// Gateway lines: one per product line, plus the delivery fee if any.
fn checkout_lines(available: &[AvailableItem], delivery_fee: Price) -> Vec<CheckoutLineItem> {
    let mut lines: Vec<CheckoutLineItem> = available
        .iter()
        .map(|item| CheckoutLineItem {
            name: item.name.clone(),
            unit_price: item.unit_price,
            quantity: item.line.quantity,
        })
        .collect();
    if delivery_fee.is_positive() {
        lines.push(CheckoutLineItem {
            name: "Delivery Fee".to_owned(),
            unit_price: delivery_fee,
            quantity: 1,
        });
    }
    lines
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use threadline_core::{Email, UserRole};

    use super::*;
    use crate::db::{
        CartRepository, InventoryLedger, MemoryStore, OrderRepository, ProductRepository,
    };
    use crate::models::{
        Availability, DeliveryData, LineInput, NewProduct, SizeStock, UnavailableReason,
    };
    use crate::payments::testing::RecordingGateway;

    const ORIGIN: &str = "https://shop.example.com";

    struct Harness {
        store: Arc<MemoryStore>,
        repos: Repositories,
        gateway: RecordingGateway,
        settings: CheckoutSettings,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            Self {
                repos: Repositories::in_memory(&store),
                store,
                gateway: RecordingGateway::new(),
                settings: CheckoutSettings {
                    client_origin: ORIGIN.to_owned(),
                    reserve_on_verify: false,
                },
            }
        }

        fn workflow(&self) -> OrderWorkflow<'_> {
            OrderWorkflow::new(&self.repos, &self.gateway, &self.settings)
        }

        async fn product(&self, name: &str, price: u32, stock: u32) -> ProductId {
            ProductRepository::create(
                self.store.as_ref(),
                &NewProduct {
                    name: name.to_owned(),
                    description: format!("{name} description"),
                    price: Price::from_units(price),
                    category: "Women".to_owned(),
                    sub_category: "Topwear".to_owned(),
                    images: vec![],
                    sizes: vec![SizeStock {
                        size: "M".to_owned(),
                        quantity: stock,
                    }],
                },
            )
            .await
            .unwrap()
            .id
        }

        async fn cart_line(&self, user: UserId, product_id: ProductId, quantity: u32) {
            CartRepository::add_line(
                self.store.as_ref(),
                user,
                &LineItem::new(product_id, "M", quantity).unwrap(),
            )
            .await
            .unwrap();
        }
    }

    fn delivery() -> DeliveryData {
        DeliveryData {
            full_name: "Sari Dewi".to_owned(),
            phone: "+62 812 0000 0000".to_owned(),
            email: "sari@example.com".to_owned(),
            street: Some("Jl. Merdeka 1".to_owned()),
            city: "Jakarta".to_owned(),
            state: "DKI Jakarta".to_owned(),
            zip_code: Some("10110".to_owned()),
            country: Some("Indonesia".to_owned()),
        }
    }

    fn request(method: &str, lines: &[(ProductId, i64)], amount: u32, fee: u32) -> PlaceOrder {
        PlaceOrder {
            products: lines
                .iter()
                .map(|&(product_id, quantity)| LineInput {
                    product_id,
                    size: "M".to_owned(),
                    quantity,
                })
                .collect(),
            amount: Price::from_units(amount),
            delivery_fee: Price::from_units(fee),
            total_amount: Price::from_units(amount + fee),
            delivery_data: delivery(),
            payment_method: method.to_owned(),
        }
    }

    // =========================================================================
    // COD
    // =========================================================================

    #[tokio::test]
    async fn test_cod_reserves_stock_and_clears_cart() {
        let h = Harness::new();
        let user = UserId::new(1);
        let tee = h.product("Linen Tee", 50, 5).await;
        h.cart_line(user, tee, 2).await;

        let order = h
            .workflow()
            .place_cod(user, request("cod", &[(tee, 2)], 100, 10))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Placed);
        assert!(!order.payment);
        assert!(order.stock_reserved);
        assert_eq!(h.store.stock(tee, "M"), Some(3));
        assert!(h.store.lines(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cod_insufficient_stock_changes_nothing() {
        let h = Harness::new();
        let user = UserId::new(1);
        let tee = h.product("Linen Tee", 50, 1).await;
        h.cart_line(user, tee, 2).await;

        let err = h
            .workflow()
            .place_cod(user, request("cod", &[(tee, 2)], 100, 0))
            .await
            .unwrap_err();

        let OrderError::Unavailable(items) = err else {
            panic!("expected unavailable, got {err:?}");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].reason, UnavailableReason::InsufficientStock);
        assert_eq!(h.store.stock(tee, "M"), Some(1));
        assert!(h.store.list_for_user(user).await.unwrap().is_empty());
        assert_eq!(h.store.lines(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cod_rejects_malformed_requests() {
        let h = Harness::new();
        let user = UserId::new(1);
        let tee = h.product("Linen Tee", 50, 5).await;
        let workflow = h.workflow();

        let wrong_method = workflow
            .place_cod(user, request("online", &[(tee, 1)], 50, 0))
            .await;
        assert!(matches!(wrong_method, Err(OrderError::Validation(_))));

        let empty = workflow.place_cod(user, request("cod", &[], 0, 0)).await;
        assert!(matches!(empty, Err(OrderError::Validation(_))));

        let zero = workflow
            .place_cod(user, request("cod", &[(tee, 0)], 50, 0))
            .await;
        assert!(matches!(zero, Err(OrderError::Validation(_))));

        let mut bad_total = request("cod", &[(tee, 1)], 50, 10);
        bad_total.total_amount = Price::from_units(55);
        let bad_total = workflow.place_cod(user, bad_total).await;
        assert!(matches!(bad_total, Err(OrderError::Validation(_))));

        assert_eq!(h.store.stock(tee, "M"), Some(5));
    }

    #[tokio::test]
    async fn test_concurrent_cod_orders_never_oversell() {
        let h = Harness::new();
        let tee = h.product("Linen Tee", 50, 5).await;
        let workflow = h.workflow();

        let (a, b) = tokio::join!(
            workflow.place_cod(UserId::new(1), request("cod", &[(tee, 3)], 150, 0)),
            workflow.place_cod(UserId::new(2), request("cod", &[(tee, 3)], 150, 0)),
        );

        let successes = [a.is_ok(), b.is_ok()].into_iter().filter(|ok| *ok).count();
        assert_eq!(successes, 1);
        let failure = if a.is_err() { a } else { b };
        assert!(matches!(failure, Err(OrderError::Unavailable(_))));

        assert_eq!(h.store.stock(tee, "M"), Some(2));
        let product = ProductRepository::get(h.store.as_ref(), tee).await.unwrap().unwrap();
        assert_eq!(product.sold, 3);
    }

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum FailAt {
        Insert,
        SaveSession,
    }

    /// Order repository that fails one write and delegates everything else.
    struct FailingOrders(Arc<MemoryStore>, FailAt);

    #[async_trait]
    impl OrderRepository for FailingOrders {
        async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
            if self.1 == FailAt::Insert {
                return Err(RepositoryError::DataCorruption("insert failed".to_owned()));
            }
            OrderRepository::create(self.0.as_ref(), order).await
        }
        async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
            OrderRepository::get(self.0.as_ref(), id).await
        }
        async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
            self.0.list_for_user(user_id).await
        }
        async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
            self.0.list_all().await
        }
        async fn set_checkout_session(
            &self,
            id: OrderId,
            session_id: &str,
        ) -> Result<(), RepositoryError> {
            if self.1 == FailAt::SaveSession {
                return Err(RepositoryError::DataCorruption("update failed".to_owned()));
            }
            self.0.set_checkout_session(id, session_id).await
        }
        async fn mark_paid(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
            self.0.mark_paid(id).await
        }
        async fn transition(
            &self,
            id: OrderId,
            from: OrderStatus,
            to: OrderStatus,
        ) -> Result<Option<Order>, RepositoryError> {
            self.0.transition(id, from, to).await
        }
        async fn take_stock_reservation(&self, id: OrderId) -> Result<bool, RepositoryError> {
            self.0.take_stock_reservation(id).await
        }
        async fn set_stock_reserved(
            &self,
            id: OrderId,
            reserved: bool,
        ) -> Result<(), RepositoryError> {
            self.0.set_stock_reserved(id, reserved).await
        }
    }

    #[tokio::test]
    async fn test_cod_insert_failure_releases_reservation() {
        let mut h = Harness::new();
        let user = UserId::new(1);
        let tee = h.product("Linen Tee", 50, 4).await;
        h.cart_line(user, tee, 2).await;
        h.repos.orders = Arc::new(FailingOrders(h.store.clone(), FailAt::Insert));

        let result = h
            .workflow()
            .place_cod(user, request("cod", &[(tee, 2)], 100, 0))
            .await;

        assert!(matches!(result, Err(OrderError::Repository(_))));
        assert_eq!(h.store.stock(tee, "M"), Some(4));
        let product = ProductRepository::get(h.store.as_ref(), tee).await.unwrap().unwrap();
        assert_eq!(product.sold, 0);
        assert_eq!(h.store.lines(user).await.unwrap().len(), 1);
    }

    // =========================================================================
    // Online
    // =========================================================================

    #[tokio::test]
    async fn test_online_builds_gateway_lines_with_delivery_fee() {
        let h = Harness::new();
        let user = UserId::new(7);
        let tee = h.product("Linen Tee", 50, 5).await;
        let cap = h.product("Bucket Hat", 40, 5).await;
        h.cart_line(user, tee, 2).await;

        let checkout = h
            .workflow()
            .place_online(user, request("online", &[(tee, 2), (cap, 1)], 140, 10))
            .await
            .unwrap();

        let requests = h.gateway.requests();
        assert_eq!(requests.len(), 1);
        let sent = &requests[0];
        let total: Price = sent.line_items.iter().map(CheckoutLineItem::total).sum();
        assert_eq!(total, Price::from_units(150));
        let fee = sent.line_items.last().unwrap();
        assert_eq!(fee.name, "Delivery Fee");
        assert_eq!(fee.total(), Price::from_units(10));
        assert_eq!(sent.cancel_url, format!("{ORIGIN}/cart"));
        assert!(sent
            .success_url
            .contains(&format!("orderId={}", checkout.order_id)));
        assert!(checkout
            .redirect_url
            .contains(&format!("orderId={}", checkout.order_id)));
        assert_eq!(sent.metadata.total_amount, Price::from_units(150));

        let order = OrderRepository::get(h.store.as_ref(), checkout.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Unpaid);
        assert_eq!(order.checkout_session_id.as_deref(), Some("cs_test_1"));
        assert!(!order.stock_reserved);
        assert_eq!(h.store.stock(tee, "M"), Some(5));
        assert_eq!(h.store.lines(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_online_gateway_failure_cancels_order() {
        let h = Harness::new();
        let user = UserId::new(7);
        let tee = h.product("Linen Tee", 50, 5).await;
        h.gateway.fail_create(true);

        let result = h
            .workflow()
            .place_online(user, request("online", &[(tee, 1)], 50, 0))
            .await;
        assert!(matches!(result, Err(OrderError::Gateway(GatewayError::Unavailable(_)))));

        let orders = h.store.list_for_user(user).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_online_session_save_failure_cancels_order() {
        let mut h = Harness::new();
        let user = UserId::new(7);
        let tee = h.product("Linen Tee", 50, 5).await;
        h.repos.orders = Arc::new(FailingOrders(h.store.clone(), FailAt::SaveSession));

        let result = h
            .workflow()
            .place_online(user, request("online", &[(tee, 1)], 50, 0))
            .await;
        assert!(matches!(result, Err(OrderError::Repository(_))));

        let orders = h.store.list_for_user(user).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Cancelled);
        assert_eq!(orders[0].checkout_session_id, None);
    }

    #[tokio::test]
    async fn test_verify_is_idempotent_and_clears_cart_once() {
        let h = Harness::new();
        let user = UserId::new(3);
        let tee = h.product("Linen Tee", 50, 5).await;
        h.cart_line(user, tee, 1).await;
        let workflow = h.workflow();

        let checkout = workflow
            .place_online(user, request("online", &[(tee, 1)], 50, 0))
            .await
            .unwrap();

        let unpaid = workflow
            .verify_payment(user, checkout.order_id, "cs_test_1")
            .await;
        assert!(matches!(unpaid, Err(OrderError::PaymentIncomplete)));
        assert_eq!(h.store.lines(user).await.unwrap().len(), 1);

        h.gateway.mark_paid("cs_test_1");
        let paid = workflow
            .verify_payment(user, checkout.order_id, "cs_test_1")
            .await
            .unwrap();
        assert_eq!(paid.status, OrderStatus::Placed);
        assert!(paid.payment);
        assert!(h.store.lines(user).await.unwrap().is_empty());

        // A line added after payment survives a repeated verification.
        h.cart_line(user, tee, 1).await;
        let again = workflow
            .verify_payment(user, checkout.order_id, "cs_test_1")
            .await
            .unwrap();
        assert_eq!(again.status, OrderStatus::Placed);
        assert_eq!(h.store.lines(user).await.unwrap().len(), 1);
        assert_eq!(h.store.stock(tee, "M"), Some(5));
    }

    #[tokio::test]
    async fn test_verify_checks_owner_and_session() {
        let h = Harness::new();
        let tee = h.product("Linen Tee", 50, 5).await;
        let workflow = h.workflow();
        let checkout = workflow
            .place_online(UserId::new(1), request("online", &[(tee, 1)], 50, 0))
            .await
            .unwrap();
        h.gateway.mark_paid("cs_test_1");

        let foreign = workflow
            .verify_payment(UserId::new(2), checkout.order_id, "cs_test_1")
            .await;
        assert!(matches!(foreign, Err(OrderError::NotFound)));

        let wrong_session = workflow
            .verify_payment(UserId::new(1), checkout.order_id, "cs_test_999")
            .await;
        assert!(matches!(wrong_session, Err(OrderError::Validation(_))));

        let missing = workflow
            .verify_payment(UserId::new(1), OrderId::new(404), "cs_test_1")
            .await;
        assert!(matches!(missing, Err(OrderError::NotFound)));
    }

    #[tokio::test]
    async fn test_verify_can_reserve_stock() {
        let mut h = Harness::new();
        h.settings.reserve_on_verify = true;
        let user = UserId::new(3);
        let tee = h.product("Linen Tee", 50, 5).await;
        let workflow = h.workflow();

        let checkout = workflow
            .place_online(user, request("online", &[(tee, 2)], 100, 0))
            .await
            .unwrap();
        h.gateway.mark_paid("cs_test_1");
        let order = workflow
            .verify_payment(user, checkout.order_id, "cs_test_1")
            .await
            .unwrap();

        assert!(order.stock_reserved);
        assert_eq!(h.store.stock(tee, "M"), Some(3));

        workflow
            .verify_payment(user, checkout.order_id, "cs_test_1")
            .await
            .unwrap();
        assert_eq!(h.store.stock(tee, "M"), Some(3));
    }

    /// Ledger whose reservations fail with a repository error.
    struct FailingReserve(Arc<MemoryStore>);

    #[async_trait]
    impl InventoryLedger for FailingReserve {
        async fn check_availability(
            &self,
            items: &[LineItem],
        ) -> Result<Vec<Availability>, RepositoryError> {
            self.0.check_availability(items).await
        }
        async fn reserve(&self, _items: &[LineItem]) -> Result<Reservation, RepositoryError> {
            Err(RepositoryError::DataCorruption("connection reset".to_owned()))
        }
        async fn release(&self, items: &[LineItem]) -> Result<(), RepositoryError> {
            self.0.release(items).await
        }
    }

    #[tokio::test]
    async fn test_verify_survives_reservation_failure() {
        let mut h = Harness::new();
        h.settings.reserve_on_verify = true;
        h.repos.inventory = Arc::new(FailingReserve(h.store.clone()));
        let user = UserId::new(3);
        let tee = h.product("Linen Tee", 50, 5).await;
        h.cart_line(user, tee, 1).await;
        let workflow = h.workflow();

        let checkout = workflow
            .place_online(user, request("online", &[(tee, 1)], 50, 0))
            .await
            .unwrap();
        h.gateway.mark_paid("cs_test_1");
        let order = workflow
            .verify_payment(user, checkout.order_id, "cs_test_1")
            .await
            .unwrap();

        assert!(order.payment);
        assert_eq!(order.status, OrderStatus::Placed);
        assert!(!order.stock_reserved);
        assert!(h.store.lines(user).await.unwrap().is_empty());
        assert_eq!(h.store.stock(tee, "M"), Some(5));
    }

    #[tokio::test]
    async fn test_amounts_must_fit_two_decimal_places() {
        let h = Harness::new();
        let user = UserId::new(1);
        let tee = h.product("Linen Tee", 50, 5).await;
        let workflow = h.workflow();
        let thousandths = Price::new(Decimal::new(1_004, 3)).unwrap();

        let mut fractional = request("cod", &[(tee, 1)], 0, 0);
        fractional.amount = thousandths;
        fractional.delivery_fee = thousandths;
        fractional.total_amount = thousandths + thousandths;
        let fractional = workflow.place_cod(user, fractional).await;
        assert!(matches!(fractional, Err(OrderError::Validation(_))));

        let mut huge = request("online", &[(tee, 1)], 0, 0);
        huge.amount = Price::new(Decimal::from(10_000_000_000_i64)).unwrap();
        huge.total_amount = huge.amount;
        let huge = workflow.place_online(user, huge).await;
        assert!(matches!(huge, Err(OrderError::Validation(_))));

        assert_eq!(h.store.stock(tee, "M"), Some(5));
        assert!(h.store.list_for_user(user).await.unwrap().is_empty());
    }

    // =========================================================================
    // Reads and fulfilment
    // =========================================================================

    #[tokio::test]
    async fn test_user_orders_join_product_summaries() {
        let h = Harness::new();
        let user = UserId::new(1);
        let tee = h.product("Linen Tee", 50, 5).await;
        let workflow = h.workflow();
        workflow
            .place_cod(user, request("cod", &[(tee, 1)], 50, 0))
            .await
            .unwrap();
        workflow
            .place_cod(user, request("cod", &[(tee, 2)], 100, 0))
            .await
            .unwrap();

        let orders = workflow.user_orders(user).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].items[0].item.quantity, 2);
        let summary = orders[0].items[0].product.as_ref().unwrap();
        assert_eq!(summary.name, "Linen Tee");

        assert!(workflow.user_orders(UserId::new(9)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_order_hides_other_users_orders() {
        let h = Harness::new();
        let tee = h.product("Linen Tee", 50, 5).await;
        let workflow = h.workflow();
        let order = workflow
            .place_cod(UserId::new(1), request("cod", &[(tee, 1)], 50, 0))
            .await
            .unwrap();

        let stranger = CurrentUser {
            id: UserId::new(2),
            email: Email::parse("other@example.com").unwrap(),
            role: UserRole::Customer,
        };
        let admin = CurrentUser {
            id: UserId::new(3),
            email: Email::parse("admin@example.com").unwrap(),
            role: UserRole::Admin,
        };
        assert!(matches!(
            workflow.get_order(&stranger, order.id).await,
            Err(OrderError::NotFound)
        ));
        assert_eq!(workflow.get_order(&admin, order.id).await.unwrap().id, order.id);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_once() {
        let h = Harness::new();
        let tee = h.product("Linen Tee", 50, 5).await;
        let workflow = h.workflow();
        let order = workflow
            .place_cod(UserId::new(1), request("cod", &[(tee, 3)], 150, 0))
            .await
            .unwrap();
        assert_eq!(h.store.stock(tee, "M"), Some(2));

        let cancelled = workflow
            .update_status(order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(!cancelled.stock_reserved);
        assert_eq!(h.store.stock(tee, "M"), Some(5));

        workflow
            .update_status(order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(h.store.stock(tee, "M"), Some(5));
        let product = ProductRepository::get(h.store.as_ref(), tee).await.unwrap().unwrap();
        assert_eq!(product.sold, 0);
    }

    #[tokio::test]
    async fn test_update_status_follows_lifecycle() {
        let h = Harness::new();
        let tee = h.product("Linen Tee", 50, 5).await;
        let workflow = h.workflow();
        let order = workflow
            .place_cod(UserId::new(1), request("cod", &[(tee, 1)], 50, 0))
            .await
            .unwrap();

        let shipped = workflow
            .update_status(order.id, OrderStatus::Shipped)
            .await
            .unwrap();
        assert_eq!(shipped.status, OrderStatus::Shipped);

        assert!(matches!(
            workflow.update_status(order.id, OrderStatus::Cancelled).await,
            Err(OrderError::Conflict(_))
        ));
        assert!(matches!(
            workflow.update_status(OrderId::new(99), OrderStatus::Packing).await,
            Err(OrderError::NotFound)
        ));
    }
}
