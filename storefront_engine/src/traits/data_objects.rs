use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::db_types::{Order, OrderId, PaymentChannel};

/// The identifiers a confirmation signal can carry. Lookups try them in the order
/// `external_reference`, `transaction_reference`, `merchant_request_id`, `order_id`; the first hit wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationKeys {
    pub external_reference: Option<String>,
    pub transaction_reference: Option<String>,
    pub merchant_request_id: Option<String>,
    pub order_id: Option<OrderId>,
}

impl CorrelationKeys {
    /// Keys for a reference of unknown kind, e.g. one supplied by a polling client. It is tried against every field.
    pub fn any(reference: &str) -> Self {
        Self {
            external_reference: Some(reference.to_string()),
            transaction_reference: Some(reference.to_string()),
            merchant_request_id: None,
            order_id: Some(OrderId::new(reference)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.external_reference.is_none()
            && self.transaction_reference.is_none()
            && self.merchant_request_id.is_none()
            && self.order_id.is_none()
    }
}

/// The terminal transition a confirmation signal asks for.
#[derive(Debug, Clone)]
pub enum Settlement {
    Paid {
        transaction_id: String,
        channel: PaymentChannel,
        payment_meta: Value,
        customer_phone: Option<String>,
        customer_name: Option<String>,
        paid_at: DateTime<Utc>,
    },
    Failed {
        channel: PaymentChannel,
        payment_meta: Value,
    },
}

impl Settlement {
    pub fn channel(&self) -> PaymentChannel {
        match self {
            Settlement::Paid { channel, .. } => *channel,
            Settlement::Failed { channel, .. } => *channel,
        }
    }
}

/// Result of a compare-and-set status transition.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// This call moved the order. The updated order is returned.
    Applied(Order),
    /// The order was no longer in the expected state, so nothing was written. The current order is returned.
    AlreadyFinal(Order),
}

impl TransitionOutcome {
    pub fn order(&self) -> &Order {
        match self {
            TransitionOutcome::Applied(o) => o,
            TransitionOutcome::AlreadyFinal(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            TransitionOutcome::Applied(o) => o,
            TransitionOutcome::AlreadyFinal(o) => o,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}
