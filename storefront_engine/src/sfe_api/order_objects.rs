use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Kes, Order, OrderId, OrderStatusType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub order_id: Option<OrderId>,
    pub user_id: Option<String>,
    pub customer_phone: Option<String>,
    pub mpesa_transaction_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
    pub limit: Option<i64>,
}

impl OrderQueryFilter {
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_customer_phone<S: Into<String>>(mut self, phone: S) -> Self {
        self.customer_phone = Some(phone.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True if there are no `WHERE` conditions. The limit does not count.
    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() &&
            self.user_id.is_none() &&
            self.customer_phone.is_none() &&
            self.mpesa_transaction_id.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true) &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters. ")?;
        }
        if let Some(order_id) = &self.order_id {
            write!(f, "order_id: {order_id}. ")?;
        }
        if let Some(user_id) = &self.user_id {
            write!(f, "user_id: {user_id}. ")?;
        }
        if let Some(phone) = &self.customer_phone {
            write!(f, "phone: {phone}. ")?;
        }
        if let Some(txid) = &self.mpesa_transaction_id {
            write!(f, "mpesa_transaction_id: {txid}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        if let Some(limit) = self.limit {
            write!(f, "limit {limit}. ")?;
        }
        Ok(())
    }
}

/// The customer-facing summary of an order's payment state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusReport {
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub total_amount: Kes,
    pub transaction_id: Option<String>,
    pub customer_phone: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderStatusReport {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.order_id.clone(),
            status: order.status,
            total_amount: order.total_amount,
            transaction_id: order.mpesa_transaction_id.clone(),
            customer_phone: order.customer_phone.clone(),
            paid_at: order.paid_at,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatusType,
}
