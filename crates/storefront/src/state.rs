//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::Repositories;
use crate::payments::PaymentGateway;
use crate::services::{
    AuthService, CartService, CatalogService, CheckoutSettings, OrderWorkflow,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// repositories, the payment gateway and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    repositories: Repositories,
    gateway: Arc<dyn PaymentGateway>,
    checkout: CheckoutSettings,
    /// Present when running against `PostgreSQL`; used by the readiness probe.
    pool: Option<PgPool>,
}

impl AppState {
    /// Production state: `sqlx` repositories over `pool`.
    #[must_use]
    pub fn new(config: &StorefrontConfig, pool: PgPool, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self::build(
            Repositories::postgres(&pool),
            gateway,
            config.checkout_settings(),
            Some(pool),
        )
    }

    /// State over arbitrary repositories, e.g. [`crate::db::MemoryStore`] in tests.
    #[must_use]
    pub fn with_repositories(
        repositories: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        checkout: CheckoutSettings,
    ) -> Self {
        Self::build(repositories, gateway, checkout, None)
    }

    fn build(
        repositories: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        checkout: CheckoutSettings,
        pool: Option<PgPool>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                repositories,
                gateway,
                checkout,
                pool,
            }),
        }
    }

    /// Get a reference to the repositories.
    #[must_use]
    pub fn repositories(&self) -> &Repositories {
        &self.inner.repositories
    }

    /// Get the database pool, if running against `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(self.inner.repositories.users.as_ref())
    }

    #[must_use]
    pub fn carts(&self) -> CartService<'_> {
        let repos = &self.inner.repositories;
        CartService::new(
            repos.carts.as_ref(),
            repos.inventory.as_ref(),
            repos.products.as_ref(),
        )
    }

    #[must_use]
    pub fn catalog(&self) -> CatalogService<'_> {
        CatalogService::new(self.inner.repositories.products.as_ref())
    }

    #[must_use]
    pub fn orders(&self) -> OrderWorkflow<'_> {
        OrderWorkflow::new(
            &self.inner.repositories,
            self.inner.gateway.as_ref(),
            &self.inner.checkout,
        )
    }
}
