use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db_types::{Kes, OrderId};

/// Weekly validity unit for loyalty coupons
const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const DEFAULT_LOYALTY_THRESHOLD: Kes = Kes::from_shillings(200);
pub const DEFAULT_LOYALTY_DISCOUNT: i64 = 10;
pub const DEFAULT_LOYALTY_VALIDITY_WEEKS: u32 = 30;
/// Upper bound on the quantity of a single line item
pub const MAX_LINE_QUANTITY: i64 = 1_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(alias = "items")]
    pub products: Vec<CheckoutItem>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default, alias = "phone_number", alias = "phone")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub pickup_location: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub pickup_date: Option<String>,
    /// `HH:MM`
    #[serde(default)]
    pub pickup_time: Option<String>,
    /// Set when the client retries the checkout of an order it already started.
    #[serde(default, alias = "external_reference")]
    pub external_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    #[serde(alias = "id", alias = "_id")]
    pub product_id: String,
    pub quantity: i64,
    /// The price the client displayed. Only used to detect stale prices.
    #[serde(default)]
    pub price: Option<Kes>,
}

impl CheckoutItem {
    pub fn new<S: Into<String>>(product_id: S, quantity: i64) -> Self {
        Self { product_id: product_id.into(), quantity, price: None }
    }

    pub fn with_price(mut self, price: Kes) -> Self {
        self.price = Some(price);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: OrderId,
    pub transaction_reference: String,
    pub external_reference: String,
    pub amount: Kes,
}

/// Orders at or above `threshold` earn the buyer a discount coupon.
#[derive(Debug, Clone, Copy)]
pub struct LoyaltyPolicy {
    pub threshold: Kes,
    pub discount_percentage: i64,
    pub validity: Duration,
}

impl Default for LoyaltyPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LOYALTY_THRESHOLD,
            discount_percentage: DEFAULT_LOYALTY_DISCOUNT,
            validity: WEEK * DEFAULT_LOYALTY_VALIDITY_WEEKS,
        }
    }
}

impl LoyaltyPolicy {
    pub fn qualifies(&self, amount: Kes) -> bool {
        amount >= self.threshold
    }
}
