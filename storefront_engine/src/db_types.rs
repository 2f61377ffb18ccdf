use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use log::error;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
pub use sqlx::types::Json;
use sqlx::{FromRow, Type};
pub use storefront_common::Kes;
use thiserror::Error;

//--------------------------------------        OrderId        ---------------------------------------------------------
/// The client-facing order identifier. Orders are created with their external reference as their order id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Generates a fresh, human-opaque reference of the form `order_<unix millis>_<10 alphanumerics>`.
    pub fn random() -> Self {
        let suffix: String =
            rand::thread_rng().sample_iter(&Alphanumeric).take(10).map(char::from).collect::<String>().to_lowercase();
        Self(format!("order_{}_{suffix}", Utc::now().timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatusType {
    /// The push payment has been sent and no confirmation has arrived yet.
    Pending,
    /// A confirmation signal reported the payment as successful.
    Paid,
    /// The gateway reported the payment as failed or cancelled by the customer.
    Failed,
    /// The order was cancelled by an administrator before it was paid.
    Cancelled,
    /// The order was paid and has been collected by the customer.
    Delivered,
}

impl OrderStatusType {
    /// True for every status except `Pending`. Confirmation signals can only act on non-terminal orders.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// The forward-only status graph:
    ///
    /// | From    | To                         |
    /// |---------|----------------------------|
    /// | Pending | Paid, Failed, Cancelled    |
    /// | Paid    | Delivered                  |
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!((self, next), (Pending, Paid) | (Pending, Failed) | (Pending, Cancelled) | (Paid, Delivered))
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::Failed => write!(f, "Failed"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
            OrderStatusType::Delivered => write!(f, "Delivered"),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "delivered" => Ok(Self::Delivered),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------    PaymentMethod      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Mpesa,
    Card,
}

//--------------------------------------    PaymentChannel     ---------------------------------------------------------
/// The channel a confirmation signal arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentChannel {
    /// Server-to-server callback from the payment gateway
    Callback,
    /// A payment notification forwarded by the SMS relay
    Sms,
    /// A client-initiated status poll that queried the gateway
    Poll,
}

impl Display for PaymentChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentChannel::Callback => write!(f, "callback"),
            PaymentChannel::Sms => write!(f, "sms"),
            PaymentChannel::Poll => write!(f, "poll"),
        }
    }
}

//--------------------------------------       LineItem        ---------------------------------------------------------
/// A product on an order. The unit price is captured when the order is created and is never re-read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Kes,
}

impl LineItem {
    pub fn new<S: Into<String>>(product_id: S, quantity: i64, unit_price: Kes) -> Self {
        Self { product_id: product_id.into(), quantity, unit_price }
    }

    /// `unit_price * quantity`, saturating at the numeric bounds. See [`LineItem::checked_subtotal`].
    pub fn subtotal(&self) -> Kes {
        self.unit_price.saturating_mul(self.quantity)
    }

    pub fn checked_subtotal(&self) -> Option<Kes> {
        self.unit_price.checked_mul(self.quantity)
    }
}

//--------------------------------------     PickupDetails     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupDetails {
    pub location: String,
    pub date: NaiveDate,
    /// `HH:MM`
    pub time: String,
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub user_id: String,
    pub items: Json<Vec<LineItem>>,
    pub total_amount: Kes,
    pub status: OrderStatusType,
    pub payment_method: PaymentMethod,
    pub pickup_location: Option<String>,
    pub pickup_date: Option<NaiveDate>,
    pub pickup_time: Option<String>,
    /// Issued by us when the push payment is requested. Unique.
    pub external_reference: String,
    /// Issued by the gateway when it accepts the push payment. Unique when present.
    pub transaction_reference: Option<String>,
    pub merchant_request_id: Option<String>,
    /// The mobile-money receipt number. Only set once the order is paid.
    pub mpesa_transaction_id: Option<String>,
    pub payment_channel: Option<PaymentChannel>,
    /// The raw confirmation payload, kept for audit.
    pub payment_meta: Option<Json<Value>>,
    pub coupon_code: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_name: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn items(&self) -> &[LineItem] {
        self.items.0.as_slice()
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub user_id: String,
    pub items: Vec<LineItem>,
    pub total_amount: Kes,
    pub payment_method: PaymentMethod,
    pub pickup: Option<PickupDetails>,
    pub external_reference: String,
    pub transaction_reference: Option<String>,
    pub merchant_request_id: Option<String>,
    pub coupon_code: Option<String>,
    pub customer_phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Creates a new pending order whose order id is its external reference.
    pub fn new<S: Into<String>>(external_reference: OrderId, user_id: S, items: Vec<LineItem>, total_amount: Kes) -> Self {
        Self {
            order_id: external_reference.clone(),
            user_id: user_id.into(),
            items,
            total_amount,
            payment_method: PaymentMethod::default(),
            pickup: None,
            external_reference: external_reference.0,
            transaction_reference: None,
            merchant_request_id: None,
            coupon_code: None,
            customer_phone: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_transaction_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.transaction_reference = Some(reference.into());
        self
    }

    pub fn with_pickup(mut self, pickup: PickupDetails) -> Self {
        self.pickup = Some(pickup);
        self
    }
}

//--------------------------------------     StoreSettings     ---------------------------------------------------------
pub const DEFAULT_CLOSED_MESSAGE: &str = "We are currently closed. Please check back later.";
pub const DEFAULT_PICKUP_TIMES: [&str; 4] = ["10:00", "12:00", "14:00", "16:00"];
pub const DEFAULT_MAX_BOOKING_DAYS: i64 = 14;

/// The single, global store configuration record.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettings {
    pub is_open: bool,
    pub closed_message: String,
    pub blocked_dates: Json<Vec<NaiveDate>>,
    pub pickup_times: Json<Vec<String>>,
    pub max_booking_days: i64,
    pub updated_at: DateTime<Utc>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            is_open: true,
            closed_message: DEFAULT_CLOSED_MESSAGE.to_string(),
            blocked_dates: Json(Vec::new()),
            pickup_times: Json(DEFAULT_PICKUP_TIMES.iter().map(|s| s.to_string()).collect()),
            max_booking_days: DEFAULT_MAX_BOOKING_DAYS,
            updated_at: Utc::now(),
        }
    }
}

/// A partial update of the store settings. Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub is_open: Option<bool>,
    pub closed_message: Option<String>,
    pub blocked_dates: Option<Vec<NaiveDate>>,
    pub pickup_times: Option<Vec<String>>,
    pub max_booking_days: Option<i64>,
}

//--------------------------------------        Coupon         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub user_id: String,
    pub discount_percentage: i64,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub user_id: String,
    pub discount_percentage: i64,
    pub expires_at: DateTime<Utc>,
}

//--------------------------------------   Product / CartItem  ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Kes,
}

impl Product {
    pub fn new<S: Into<String>>(id: S, name: S, price: Kes) -> Self {
        Self { id: id.into(), name: name.into(), price }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub user_id: String,
    pub product_id: String,
    pub quantity: i64,
}
