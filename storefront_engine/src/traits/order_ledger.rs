use thiserror::Error;

use crate::{
    db_types::{Kes, NewOrder, Order, OrderId, OrderStatusType},
    sfe_api::order_objects::OrderQueryFilter,
    traits::data_objects::{CorrelationKeys, Settlement, TransitionOutcome},
};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderIdNotFound(i64),
    #[error("Order {0} has already been {1}, and can no longer be modified")]
    OrderAlreadyFinalized(OrderId, OrderStatusType),
    #[error("{0}")]
    ReferenceConflict(String),
    #[error("M-Pesa transaction {0} has already been used to pay for another order")]
    DuplicateTransaction(String),
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

/// The persistent record of purchase attempts and their lifecycle.
#[allow(async_fn_in_trait)]
pub trait OrderLedger {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Creates a pending order keyed by its external reference, or, if an order with that external reference already
    /// exists and is still pending, refreshes its gateway-issued transaction reference. This call is idempotent.
    ///
    /// Returns the order and `true` if it was newly inserted. An existing order that is no longer pending is left
    /// untouched and [`LedgerError::OrderAlreadyFinalized`] is returned.
    async fn upsert_pending_order(&self, order: NewOrder) -> Result<(Order, bool), LedgerError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerError>;

    async fn fetch_order_by_external_reference(&self, reference: &str) -> Result<Option<Order>, LedgerError>;

    /// Resolves a set of correlation keys to a single order. Keys are tried in the precedence order documented on
    /// [`CorrelationKeys`].
    async fn fetch_order_by_correlation(&self, keys: &CorrelationKeys) -> Result<Option<Order>, LedgerError>;

    /// The order that was paid with the given M-Pesa receipt number, if any. Receipt numbers are unique across orders.
    async fn fetch_order_by_mpesa_transaction_id(&self, transaction_id: &str) -> Result<Option<Order>, LedgerError>;

    /// All pending orders for exactly `amount`, most recent first.
    async fn fetch_pending_orders_by_amount(&self, amount: Kes) -> Result<Vec<Order>, LedgerError>;

    async fn count_pending_orders(&self) -> Result<i64, LedgerError>;

    /// Atomically moves a pending order to the terminal state described by `settlement`.
    ///
    /// The write is conditioned on the order still being `Pending` at write time. All fields of the transition are
    /// written in a single statement. When a `Paid` transition is applied, the owner's cart is cleared and the coupon
    /// used on the order is deactivated, inside the same database transaction, so these side effects happen exactly
    /// once per order.
    ///
    /// If the order has already left `Pending`, nothing is written and [`TransitionOutcome::AlreadyFinal`] is
    /// returned. If the receipt number of a `Paid` settlement already belongs to another order, nothing is written and
    /// [`LedgerError::DuplicateTransaction`] is returned.
    async fn settle_order(&self, id: i64, settlement: Settlement) -> Result<TransitionOutcome, LedgerError>;

    /// Compare-and-set of the order status from `from` to `to`, for administrative transitions.
    async fn update_order_status(
        &self,
        order_id: &OrderId,
        from: OrderStatusType,
        to: OrderStatusType,
    ) -> Result<TransitionOutcome, LedgerError>;

    /// The user's orders, most recent first
    async fn fetch_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, LedgerError>;

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerError>;
}
