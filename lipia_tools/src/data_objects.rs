use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /payments/stk-push`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkPushRequest {
    /// Local (07xx / 01xx) or international form of the paying phone
    pub phone_number: String,
    /// Whole shillings. The gateway rejects zero.
    pub amount: i64,
    pub external_reference: String,
    pub callback_url: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkPushResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<StkPushData>,
    /// The response exactly as the gateway sent it
    #[serde(skip)]
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkPushData {
    #[serde(rename = "TransactionReference")]
    pub transaction_reference: String,
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: Option<String>,
}

/// Response of `GET /payments/status?reference=...`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<PaymentStatusData>,
    #[serde(skip)]
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusData {
    /// `true` once the payment has completed. Pending or failed payments carry `false` or a descriptive string.
    #[serde(default)]
    pub status: Value,
    #[serde(rename = "MpesaReceiptNumber", default)]
    pub mpesa_receipt_number: Option<String>,
    #[serde(default)]
    pub response: Option<Value>,
}

impl PaymentStatusResponse {
    /// Only an explicit boolean `true` status on a successful query counts as paid.
    pub fn is_paid(&self) -> bool {
        self.success && self.data.as_ref().map(|d| d.status == Value::Bool(true)).unwrap_or(false)
    }

    pub fn receipt_number(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.mpesa_receipt_number.as_deref()).filter(|s| !s.is_empty())
    }
}
