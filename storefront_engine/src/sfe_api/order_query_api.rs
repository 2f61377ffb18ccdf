use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Order, OrderId, OrderStatusType},
    sfe_api::{
        errors::OrderApiError,
        order_objects::{OrderQueryFilter, OrderStatusReport},
    },
    traits::{OrderLedger, TransitionOutcome},
};

/// Read access to orders for shoppers and administrators, plus the administrative status transitions.
pub struct OrderQueryApi<B> {
    db: B,
}

impl<B> Debug for OrderQueryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderQueryApi")
    }
}

impl<B> OrderQueryApi<B>
where B: OrderLedger
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// The payment status of one of the user's orders. Orders belonging to other users are reported as not found.
    pub async fn order_status(&self, order_id: &OrderId, user_id: &str) -> Result<OrderStatusReport, OrderApiError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| OrderApiError::OrderNotFound(order_id.clone()))?;
        Ok(OrderStatusReport::from(&order))
    }

    /// The user's orders, newest first
    pub async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, OrderApiError> {
        let orders = self.db.fetch_orders_for_user(user_id).await?;
        Ok(orders)
    }

    pub async fn search(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderApiError> {
        trace!("🔍️ Order search. {query}");
        let orders = self.db.search_orders(query).await?;
        Ok(orders)
    }

    /// Administrative status change. Only `Pending -> Cancelled` and `Paid -> Delivered` are allowed here; payment
    /// outcomes are recorded by the reconciliation engine alone.
    pub async fn update_order_status(&self, order_id: &OrderId, to: OrderStatusType) -> Result<Order, OrderApiError> {
        let from = match to {
            OrderStatusType::Cancelled => OrderStatusType::Pending,
            OrderStatusType::Delivered => OrderStatusType::Paid,
            to => {
                let current = self.fetch(order_id).await?;
                return Err(OrderApiError::ForbiddenTransition { from: current.status, to });
            },
        };
        match self.db.update_order_status(order_id, from, to).await? {
            TransitionOutcome::Applied(order) => {
                info!("🔍️ Order [{order_id}] moved from {from} to {to}");
                Ok(order)
            },
            TransitionOutcome::AlreadyFinal(order) if order.status == to => {
                debug!("🔍️ Order [{order_id}] is already {to}");
                Ok(order)
            },
            TransitionOutcome::AlreadyFinal(order) => {
                warn!("🔍️ Order [{order_id}] is {} and cannot move to {to}", order.status);
                Err(OrderApiError::TransitionConflict { order_id: order.order_id, status: order.status, to })
            },
        }
    }

    async fn fetch(&self, order_id: &OrderId) -> Result<Order, OrderApiError> {
        self.db.fetch_order_by_order_id(order_id).await?.ok_or_else(|| OrderApiError::OrderNotFound(order_id.clone()))
    }
}
