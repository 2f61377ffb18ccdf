use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::{
    db_types::{Kes, OrderId, OrderStatusType},
    helpers::PhoneFormatError,
    sfe_api::checkout_objects::MAX_LINE_QUANTITY,
    traits::{GatewayError, LedgerError},
};

/// Why a pickup slot was refused by the store settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PickupRejection {
    #[error("{0}")]
    StoreClosed(String),
    #[error("{0} is not a valid pickup date. Use YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Pickup date {0} is in the past")]
    DateInPast(NaiveDate),
    #[error("Pickup date {date} is more than {max_days} days away")]
    BeyondBookingHorizon { date: NaiveDate, max_days: i64 },
    #[error("The store does not accept pickups on {0}")]
    DateBlocked(NaiveDate),
    #[error("{0} is not an available pickup time")]
    TimeNotAvailable(String),
}

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("Invalid or empty products array")]
    EmptyCart,
    #[error(
        "Product {product_id} has an invalid quantity ({quantity}). Quantities must be between 1 and {}",
        MAX_LINE_QUANTITY
    )]
    InvalidQuantity { product_id: String, quantity: i64 },
    #[error("The order total of {amount} is more than the {limit} allowed for a single payment")]
    AmountTooLarge { amount: Kes, limit: Kes },
    #[error("{0}")]
    InvalidPhone(String),
    #[error("Pickup location, date, and time are required")]
    MissingPickupDetails,
    #[error("Checkout is not available. {0}")]
    CheckoutNotAllowed(PickupRejection),
    #[error("Product {0} not found")]
    UnknownProduct(String),
    #[error("Price mismatch for product {product_id}. Claimed {claimed}, but the price is {actual}")]
    AmountMismatch { product_id: String, claimed: Kes, actual: Kes },
    #[error("Order {0} has already been {1}")]
    OrderAlreadyFinalized(OrderId, OrderStatusType),
    #[error("{0}")]
    ReferenceConflict(String),
    #[error("Failed to initiate STK push")]
    GatewayRejected(Value),
    #[error("The payment provider is unavailable. {0}")]
    GatewayUnavailable(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<LedgerError> for CheckoutError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::OrderAlreadyFinalized(id, status) => CheckoutError::OrderAlreadyFinalized(id, status),
            LedgerError::ReferenceConflict(reason) => CheckoutError::ReferenceConflict(reason),
            e => CheckoutError::DatabaseError(e.to_string()),
        }
    }
}

impl From<PhoneFormatError> for CheckoutError {
    fn from(e: PhoneFormatError) -> Self {
        CheckoutError::InvalidPhone(e.to_string())
    }
}

impl From<GatewayError> for CheckoutError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Rejected { details } => CheckoutError::GatewayRejected(details),
            e => CheckoutError::GatewayUnavailable(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("Could not extract a transaction from the SMS: {0}")]
    MalformedSms(String),
    #[error("Unrecognised webhook payload: {0}")]
    MalformedPayload(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<LedgerError> for ReconciliationError {
    fn from(e: LedgerError) -> Self {
        ReconciliationError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    #[error("Invalid settings value. {0}")]
    InvalidFormat(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<LedgerError> for SettingsError {
    fn from(e: LedgerError) -> Self {
        SettingsError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderApiError {
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("An order cannot move from {from} to {to}")]
    ForbiddenTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("Order {order_id} is {status} and can no longer move to {to}")]
    TransitionConflict { order_id: OrderId, status: OrderStatusType, to: OrderStatusType },
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<LedgerError> for OrderApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::OrderNotFound(id) => OrderApiError::OrderNotFound(id),
            e => OrderApiError::DatabaseError(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CouponError {
    #[error("Coupon not found")]
    NotFound,
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<LedgerError> for CouponError {
    fn from(e: LedgerError) -> Self {
        CouponError::DatabaseError(e.to_string())
    }
}
