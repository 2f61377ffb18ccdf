//! `SqliteDatabase` is a concrete implementation of a storefront engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::Utc;
use log::*;
use sqlx::{migrate::MigrateError, SqlitePool};

use super::db::{carts, catalog, coupons, db_url, new_pool, orders, settings};
use crate::{
    db_types::{
        CartItem,
        Coupon,
        Kes,
        NewCoupon,
        NewOrder,
        Order,
        OrderId,
        OrderStatusType,
        Product,
        SettingsUpdate,
        StoreSettings,
    },
    sfe_api::order_objects::OrderQueryFilter,
    traits::{
        CartManagement,
        CatalogManagement,
        CorrelationKeys,
        CouponManagement,
        LedgerError,
        OrderLedger,
        SettingsManagement,
        Settlement,
        TransitionOutcome,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl OrderLedger for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn upsert_pending_order(&self, order: NewOrder) -> Result<(Order, bool), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::idempotent_upsert(order, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_external_reference(&self, reference: &str) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_external_reference(reference, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_correlation(&self, keys: &CorrelationKeys) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_correlation(keys, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_mpesa_transaction_id(&self, transaction_id: &str) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_mpesa_transaction_id(transaction_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_pending_orders_by_amount(&self, amount: Kes) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_pending_orders_by_amount(amount, &mut conn).await?;
        Ok(orders)
    }

    async fn count_pending_orders(&self) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let count = orders::count_pending_orders(&mut conn).await?;
        Ok(count)
    }

    /// In a single atomic transaction:
    /// * moves the order out of `Pending`, if and only if it is still pending,
    /// * for a `Paid` transition, empties the owner's cart and deactivates the coupon used on the order.
    async fn settle_order(&self, id: i64, settlement: Settlement) -> Result<TransitionOutcome, LedgerError> {
        let receipt = match &settlement {
            Settlement::Paid { transaction_id, .. } => Some(transaction_id.clone()),
            Settlement::Failed { .. } => None,
        };
        let mut tx = self.pool.begin().await?;
        let settled = match orders::settle_pending_order(id, settlement, &mut tx).await {
            // The unique receipt index stops one payment from settling two orders
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                let receipt = receipt.unwrap_or_default();
                warn!("🗃️ Receipt {receipt} is already recorded against another order. Order {id} stays pending");
                return Err(LedgerError::DuplicateTransaction(receipt));
            },
            result => result?,
        };
        let outcome = match settled {
            Some(order) => {
                if order.status == OrderStatusType::Paid {
                    let removed = carts::clear_cart(&order.user_id, &mut tx).await?;
                    trace!("🗃️ Cleared {removed} cart lines for user {}", order.user_id);
                    if let Some(code) = order.coupon_code.as_deref() {
                        coupons::deactivate_coupon(code, &mut tx).await?;
                    }
                }
                debug!("🗃️ Order [{}] is now {}", order.order_id, order.status);
                TransitionOutcome::Applied(order)
            },
            None => {
                let current =
                    orders::fetch_order_by_id(id, &mut tx).await?.ok_or(LedgerError::OrderIdNotFound(id))?;
                debug!("🗃️ Order [{}] is already {}. Settlement ignored", current.order_id, current.status);
                TransitionOutcome::AlreadyFinal(current)
            },
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn update_order_status(
        &self,
        order_id: &OrderId,
        from: OrderStatusType,
        to: OrderStatusType,
    ) -> Result<TransitionOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let outcome = match orders::update_order_status(order_id, from, to, &mut tx).await? {
            Some(order) => TransitionOutcome::Applied(order),
            None => {
                let current = orders::fetch_order_by_order_id(order_id, &mut tx)
                    .await?
                    .ok_or_else(|| LedgerError::OrderNotFound(order_id.clone()))?;
                TransitionOutcome::AlreadyFinal(current)
            },
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn fetch_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_for_user(user_id, &mut conn).await?;
        Ok(orders)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn fetch_products(&self, ids: &[String]) -> Result<Vec<Product>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let products = catalog::fetch_products(ids, &mut conn).await?;
        Ok(products)
    }

    async fn upsert_product(&self, product: Product) -> Result<Product, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let product = catalog::upsert_product(product, &mut conn).await?;
        Ok(product)
    }
}

impl CartManagement for SqliteDatabase {
    async fn fetch_cart(&self, user_id: &str) -> Result<Vec<CartItem>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let items = carts::fetch_cart(user_id, &mut conn).await?;
        Ok(items)
    }

    async fn add_to_cart(&self, user_id: &str, product_id: &str, quantity: i64) -> Result<CartItem, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let item = carts::add_to_cart(user_id, product_id, quantity, &mut conn).await?;
        Ok(item)
    }

    async fn clear_cart(&self, user_id: &str) -> Result<u64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let removed = carts::clear_cart(user_id, &mut conn).await?;
        Ok(removed)
    }
}

impl CouponManagement for SqliteDatabase {
    async fn fetch_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let coupon = coupons::fetch_coupon_by_code(code, &mut conn).await?;
        Ok(coupon)
    }

    async fn fetch_active_coupon_for_user(&self, user_id: &str) -> Result<Option<Coupon>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let coupon = coupons::fetch_active_coupon_for_user(user_id, Utc::now(), &mut conn).await?;
        Ok(coupon)
    }

    async fn replace_coupon_for_user(&self, coupon: NewCoupon) -> Result<Coupon, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let removed = coupons::delete_active_coupons_for_user(&coupon.user_id, &mut tx).await?;
        trace!("🗃️ Removed {removed} unused coupons for user {}", coupon.user_id);
        let coupon = coupons::insert_coupon(coupon, &mut tx).await?;
        tx.commit().await?;
        Ok(coupon)
    }
}

impl SettingsManagement for SqliteDatabase {
    async fn fetch_or_create_settings(&self) -> Result<StoreSettings, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let settings = settings::fetch_or_create_settings(&mut conn).await?;
        Ok(settings)
    }

    async fn update_settings(&self, update: SettingsUpdate) -> Result<StoreSettings, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let _ = settings::fetch_or_create_settings(&mut tx).await?;
        let settings = settings::update_settings(update, &mut tx).await?;
        tx.commit().await?;
        Ok(settings)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date. Safe to call on every start.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
