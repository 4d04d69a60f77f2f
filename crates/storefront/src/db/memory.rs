//! In-memory implementation of every repository trait.
//!
//! Used by unit tests and the integration-test harness. All state lives
//! behind one mutex, which makes each operation atomic with respect to the
//! others, matching the transactional guarantees of the `sqlx` repositories.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use threadline_core::{Email, LineItem, OrderId, OrderStatus, ProductId, UserId, UserRole};

use super::{
    CartRepository, InventoryLedger, OrderRepository, ProductRepository, RepositoryError,
    UserRepository,
};
use crate::models::inventory::{evaluate, rejection};
use crate::models::{
    Availability, NewOrder, NewProduct, Order, OrderLine, Product, ProductQuery, Reservation,
    SortKey, SortOrder, User,
};

#[derive(Default)]
struct MemoryState {
    next_product_id: i32,
    products: BTreeMap<ProductId, Product>,
    carts: BTreeMap<UserId, Vec<LineItem>>,
    next_order_id: i32,
    orders: BTreeMap<OrderId, Order>,
    next_user_id: i32,
    users: BTreeMap<UserId, (User, String)>,
}

/// Shared in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current stock for one size, for assertions in tests.
    #[must_use]
    pub fn stock(&self, product_id: ProductId, size: &str) -> Option<u32> {
        self.state()
            .products
            .get(&product_id)
            .and_then(|p| p.size(size))
            .map(|s| s.quantity)
    }
}

fn build_product(id: ProductId, input: &NewProduct, existing: Option<&Product>) -> Product {
    let now = Utc::now();
    Product {
        id,
        name: input.name.clone(),
        description: input.description.clone(),
        price: input.price,
        category: input.category.clone(),
        sub_category: input.sub_category.clone(),
        images: input.images.clone(),
        sizes: input.sizes.clone(),
        sold: existing.map_or(0, |p| p.sold),
        created_at: existing.map_or(now, |p| p.created_at),
        updated_at: now,
    }
}

fn matches_query(product: &Product, query: &ProductQuery) -> bool {
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        let hit = product.name.to_lowercase().contains(&needle)
            || product.description.to_lowercase().contains(&needle);
        if !hit {
            return false;
        }
    }
    if !query.categories.is_empty() && !query.categories.contains(&product.category) {
        return false;
    }
    if !query.sub_categories.is_empty() && !query.sub_categories.contains(&product.sub_category) {
        return false;
    }
    true
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.state().products.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn list(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64), RepositoryError> {
        let state = self.state();
        let mut matched: Vec<&Product> = state
            .products
            .values()
            .filter(|p| matches_query(p, query))
            .collect();

        matched.sort_by(|a, b| {
            let ordering = match query.sort_by {
                SortKey::Price => a.price.cmp(&b.price),
                SortKey::Sold => a.sold.cmp(&b.sold),
                SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            }
            .then(a.id.cmp(&b.id));
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = matched.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let page = matched
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let mut state = self.state();
        state.next_product_id += 1;
        let id = ProductId::new(state.next_product_id);
        let created = build_product(id, product, None);
        state.products.insert(id, created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        id: ProductId,
        product: &NewProduct,
    ) -> Result<Option<Product>, RepositoryError> {
        let mut state = self.state();
        let Some(existing) = state.products.get(&id) else {
            return Ok(None);
        };
        let updated = build_product(id, product, Some(existing));
        state.products.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.state().products.remove(&id))
    }
}

#[async_trait]
impl InventoryLedger for MemoryStore {
    async fn check_availability(
        &self,
        items: &[LineItem],
    ) -> Result<Vec<Availability>, RepositoryError> {
        let state = self.state();
        Ok(items
            .iter()
            .map(|line| evaluate(state.products.get(&line.product_id), line))
            .collect())
    }

    async fn reserve(&self, items: &[LineItem]) -> Result<Reservation, RepositoryError> {
        let mut state = self.state();

        // Stage on a copy of the touched products; commit only if every line fits.
        let mut staged: BTreeMap<ProductId, Product> = items
            .iter()
            .filter_map(|line| state.products.get(&line.product_id))
            .map(|p| (p.id, p.clone()))
            .collect();

        let mut failed = Vec::new();
        for line in items {
            let decremented = staged.get_mut(&line.product_id).is_some_and(|product| {
                let Some(stock) = product.sizes.iter_mut().find(|s| s.size == line.size) else {
                    return false;
                };
                if stock.quantity < line.quantity {
                    return false;
                }
                stock.quantity -= line.quantity;
                product.sold = product.sold.saturating_add(line.quantity);
                true
            });
            if !decremented {
                failed.push(rejection(staged.get(&line.product_id), line));
            }
        }

        if !failed.is_empty() {
            return Ok(Reservation::Rejected(failed));
        }

        let now = Utc::now();
        for (id, mut product) in staged {
            product.updated_at = now;
            state.products.insert(id, product);
        }
        Ok(Reservation::Reserved)
    }

    async fn release(&self, items: &[LineItem]) -> Result<(), RepositoryError> {
        let mut state = self.state();
        for line in items {
            let restored = state
                .products
                .get_mut(&line.product_id)
                .is_some_and(|product| {
                    let Some(stock) = product.sizes.iter_mut().find(|s| s.size == line.size)
                    else {
                        return false;
                    };
                    stock.quantity = stock.quantity.saturating_add(line.quantity);
                    product.sold = product.sold.saturating_sub(line.quantity);
                    true
                });
            if !restored {
                tracing::warn!(
                    product_id = %line.product_id,
                    size = %line.size,
                    "release skipped: product or size no longer exists"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn lines(&self, user_id: UserId) -> Result<Vec<LineItem>, RepositoryError> {
        Ok(self
            .state()
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_line(&self, user_id: UserId, line: &LineItem) -> Result<(), RepositoryError> {
        let mut state = self.state();
        let lines = state.carts.entry(user_id).or_default();
        if let Some(existing) = lines.iter_mut().find(|l| l.key() == line.key()) {
            existing.quantity = existing.quantity.saturating_add(line.quantity);
        } else {
            lines.push(line.clone());
        }
        Ok(())
    }

    async fn set_quantity(
        &self,
        user_id: UserId,
        line: &LineItem,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state();
        let existing = state
            .carts
            .get_mut(&user_id)
            .and_then(|lines| lines.iter_mut().find(|l| l.key() == line.key()));
        Ok(existing.is_some_and(|l| {
            l.quantity = line.quantity;
            true
        }))
    }

    async fn remove_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        size: &str,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state();
        let Some(lines) = state.carts.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = lines.len();
        lines.retain(|l| l.key() != (product_id, size));
        Ok(lines.len() < before)
    }

    async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError> {
        if let Some(lines) = self.state().carts.get_mut(&user_id) {
            lines.clear();
        }
        Ok(())
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    orders
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut state = self.state();
        state.next_order_id += 1;
        let id = OrderId::new(state.next_order_id);
        let now = Utc::now();
        let created = Order {
            id,
            user_id: order.user_id,
            items: order.items.iter().cloned().map(OrderLine::from).collect(),
            amount: order.amount,
            delivery_fee: order.delivery_fee,
            total_amount: order.total_amount,
            delivery_data: order.delivery_data.clone(),
            payment_method: order.payment_method,
            payment: order.payment,
            status: order.status,
            stock_reserved: order.stock_reserved,
            checkout_session_id: None,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.state().orders.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let orders = self
            .state()
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(orders))
    }

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.state().orders.values().cloned().collect();
        Ok(newest_first(orders))
    }

    async fn set_checkout_session(
        &self,
        id: OrderId,
        session_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state();
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.checkout_session_id = Some(session_id.to_owned());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_paid(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.state();
        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(None);
        };
        if order.status != OrderStatus::Unpaid || order.payment {
            return Ok(None);
        }
        order.status = OrderStatus::Placed;
        order.payment = true;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn transition(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.state();
        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(None);
        };
        if order.status != from {
            return Ok(None);
        }
        order.status = to;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn take_stock_reservation(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let mut state = self.state();
        Ok(state.orders.get_mut(&id).is_some_and(|order| {
            let was_reserved = order.stock_reserved;
            order.stock_reserved = false;
            was_reserved
        }))
    }

    async fn set_stock_reserved(
        &self,
        id: OrderId,
        reserved: bool,
    ) -> Result<(), RepositoryError> {
        if let Some(order) = self.state().orders.get_mut(&id) {
            order.stock_reserved = reserved;
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_with_password(
        &self,
        name: &str,
        email: &Email,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state();
        if state.users.values().any(|(u, _)| &u.email == email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        state.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: UserId::new(state.next_user_id),
            name: name.to_owned(),
            email: email.clone(),
            role: UserRole::Customer,
            created_at: now,
            updated_at: now,
        };
        state
            .users
            .insert(user.id, (user.clone(), password_hash.to_owned()));
        Ok(user)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state().users.get(&id).map(|(u, _)| u.clone()))
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .state()
            .users
            .values()
            .find(|(u, _)| &u.email == email)
            .map(|(u, _)| u.clone()))
    }

    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        Ok(self
            .state()
            .users
            .values()
            .find(|(u, _)| &u.email == email)
            .cloned())
    }

    async fn set_role(
        &self,
        email: &Email,
        role: UserRole,
    ) -> Result<Option<User>, RepositoryError> {
        let mut state = self.state();
        let Some((user, _)) = state.users.values_mut().find(|(u, _)| &u.email == email) else {
            return Ok(None);
        };
        user.role = role;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }
}
