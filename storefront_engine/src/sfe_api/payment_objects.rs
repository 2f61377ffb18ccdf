//! The confirmation signals the reconciliation engine understands, and what it reports back.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    db_types::{Kes, Order, OrderId, OrderStatusType, PaymentChannel},
    sfe_api::errors::ReconciliationError,
    traits::CorrelationKeys,
};

//--------------------------------------   GatewayCallback     ---------------------------------------------------------
/// The server-to-server notification the gateway sends once a push payment completes or fails.
///
/// The payment details arrive under either `response` or `data`. A payload with neither is not a callback.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "Value")]
pub struct GatewayCallback {
    /// The top-level `status` flag, if present
    pub status: Option<bool>,
    pub response: CallbackResponse,
    /// The whole payload, as received
    pub raw: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackResponse {
    #[serde(rename = "TransactionReference", default)]
    pub transaction_reference: Option<String>,
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "ExternalReference", default)]
    pub external_reference: Option<String>,
    #[serde(rename = "MpesaReceiptNumber", default)]
    pub mpesa_receipt_number: Option<String>,
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
    #[serde(rename = "ResultDesc", default)]
    pub result_description: Option<String>,
}

impl TryFrom<Value> for GatewayCallback {
    type Error = String;

    fn try_from(raw: Value) -> Result<Self, Self::Error> {
        let body = ["response", "data"]
            .iter()
            .find_map(|k| raw.get(*k).filter(|v| v.is_object()))
            .ok_or_else(|| "A gateway callback must contain a 'response' or 'data' object".to_string())?;
        let response = serde_json::from_value::<CallbackResponse>(body.clone()).map_err(|e| e.to_string())?;
        let status = raw.get("status").and_then(Value::as_bool);
        Ok(Self { status, response, raw })
    }
}

impl GatewayCallback {
    pub fn is_success(&self) -> bool {
        self.status == Some(true) ||
            self.response.status.as_deref().map(|s| s.eq_ignore_ascii_case("success")).unwrap_or(false)
    }

    /// The gateway's reference for the payment, falling back to the merchant request id.
    pub fn unique_reference(&self) -> Option<&str> {
        non_empty(self.response.transaction_reference.as_deref())
            .or_else(|| non_empty(self.response.merchant_request_id.as_deref()))
    }

    pub fn correlation_keys(&self) -> CorrelationKeys {
        let external = non_empty(self.response.external_reference.as_deref()).map(String::from);
        CorrelationKeys {
            external_reference: external.clone(),
            transaction_reference: self.unique_reference().map(String::from),
            merchant_request_id: non_empty(self.response.merchant_request_id.as_deref()).map(String::from),
            order_id: external.map(OrderId::new),
        }
    }

    /// The payment details object, which is what gets stored as the order's payment metadata.
    pub fn payment_details(&self) -> Value {
        ["response", "data"].iter().find_map(|k| self.raw.get(*k).cloned()).unwrap_or(Value::Null)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

//--------------------------------------    SmsRelayMessage    ---------------------------------------------------------
/// A notification forwarded by the SMS relay agent running on the merchant's phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmsRelayMessage {
    pub content: String,
    /// The sender id the notification arrived from, e.g. `MPESA`
    pub from: String,
}

impl SmsRelayMessage {
    pub fn new<S: Into<String>>(from: S, content: S) -> Self {
        Self { content: content.into(), from: from.into() }
    }
}

//--------------------------------------    WebhookPayload     ---------------------------------------------------------
/// A body posted to the unified webhook.
#[derive(Debug, Clone)]
pub enum WebhookPayload {
    Sms(SmsRelayMessage),
    Callback(GatewayCallback),
}

impl WebhookPayload {
    /// Strictly decodes an SMS relay message first, then a gateway callback. Anything else is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, ReconciliationError> {
        let value = serde_json::from_slice::<Value>(bytes)
            .map_err(|e| ReconciliationError::MalformedPayload(format!("Body is not JSON. {e}")))?;
        if let Ok(sms) = serde_json::from_value::<SmsRelayMessage>(value.clone()) {
            return Ok(Self::Sms(sms));
        }
        GatewayCallback::try_from(value).map(Self::Callback).map_err(ReconciliationError::MalformedPayload)
    }
}

//--------------------------------------   ConfirmationSignal  ---------------------------------------------------------
/// A channel-independent statement that a payment has succeeded or failed.
#[derive(Debug, Clone)]
pub struct ConfirmationSignal {
    pub keys: CorrelationKeys,
    pub success: bool,
    /// The mobile-money receipt number. Only meaningful when `success` is true.
    pub transaction_id: Option<String>,
    pub payload: Value,
    pub channel: PaymentChannel,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl ConfirmationSignal {
    pub fn new(keys: CorrelationKeys, success: bool, channel: PaymentChannel, payload: Value) -> Self {
        Self {
            keys,
            success,
            transaction_id: None,
            payload,
            channel,
            customer_name: None,
            customer_phone: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_transaction_id<S: Into<String>>(mut self, transaction_id: Option<S>) -> Self {
        self.transaction_id = transaction_id.map(Into::into).filter(|s: &String| !s.trim().is_empty());
        self
    }

    pub fn with_customer(mut self, name: Option<String>, phone: Option<String>) -> Self {
        self.customer_name = name;
        self.customer_phone = phone;
        self
    }
}

//--------------------------------------       Outcomes        ---------------------------------------------------------
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    /// This callback moved the order to a terminal state
    Applied(Order),
    /// The order had already been settled by another signal
    AlreadyFinal(Order),
    /// No order matched the callback within the retry budget
    Unresolved(CorrelationKeys),
}

#[derive(Debug, Clone)]
pub enum SmsOutcome {
    /// The message was not a payment notification from the trusted sender
    Ignored(String),
    Applied(Order),
    AlreadyFinal(Order),
    /// No pending order for this amount
    Unmatched { transaction_id: String, amount: Kes },
}

impl Display for SmsOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmsOutcome::Ignored(reason) => write!(f, "Ignored: {reason}"),
            SmsOutcome::Applied(order) => write!(f, "Order {} paid", order.order_id),
            SmsOutcome::AlreadyFinal(order) => write!(f, "Order {} was already {}", order.order_id, order.status),
            SmsOutcome::Unmatched { transaction_id, amount } => {
                write!(f, "No pending order for {amount} (transaction {transaction_id})")
            },
        }
    }
}

//--------------------------------------       PollResult      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PollStatus {
    Paid,
    Failed,
    Cancelled,
    Pending,
}

/// What a polling client is told about its payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub success: bool,
    pub status: PollStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    pub message: String,
}

impl PollResult {
    pub fn paid(order_id: OrderId, message: &str) -> Self {
        Self { success: true, status: PollStatus::Paid, order_id: Some(order_id), message: message.to_string() }
    }

    pub fn pending() -> Self {
        Self { success: false, status: PollStatus::Pending, order_id: None, message: "Waiting for payment...".into() }
    }

    /// The answer for an order that has already reached a terminal state, or `None` if it is still pending.
    pub fn for_settled_order(order: &Order) -> Option<Self> {
        let order_id = Some(order.order_id.clone());
        match order.status {
            OrderStatusType::Paid | OrderStatusType::Delivered => {
                Some(Self::paid(order.order_id.clone(), "Payment successful"))
            },
            OrderStatusType::Failed => Some(Self {
                success: false,
                status: PollStatus::Failed,
                order_id,
                message: "Payment failed".into(),
            }),
            OrderStatusType::Cancelled => Some(Self {
                success: false,
                status: PollStatus::Cancelled,
                order_id,
                message: "Order was cancelled".into(),
            }),
            OrderStatusType::Pending => None,
        }
    }
}
