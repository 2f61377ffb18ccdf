use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{db_types::Kes, helpers::CanonicalPhone};

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The gateway understood the request and refused it. The details are the gateway's own response and may be
    /// shown to the customer.
    #[error("The payment gateway rejected the request: {details}")]
    Rejected { details: Value },
    /// The gateway could not be reached, or failed on its side.
    #[error("The payment gateway is unavailable: {0}")]
    Unavailable(String),
    #[error("The payment gateway sent a response that could not be understood: {0}")]
    InvalidResponse(String),
}

/// A request to prompt the customer's phone for payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPaymentRequest {
    pub phone: CanonicalPhone,
    /// Whole shillings
    pub amount: Kes,
    pub external_reference: String,
    /// Opaque application data (line items, coupon code, pickup location) kept by the gateway for audit
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPaymentAccepted {
    pub transaction_reference: String,
    pub merchant_request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPaymentStatus {
    /// Whether the status query itself succeeded
    pub success: bool,
    /// Whether the payment has completed
    pub paid: bool,
    pub transaction_id: Option<String>,
    pub raw: Value,
}

impl GatewayPaymentStatus {
    /// Only a successful query reporting a completed payment is definitive.
    pub fn is_definitive_success(&self) -> bool {
        self.success && self.paid
    }
}

/// The seam between the engine and the mobile-money provider.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    /// Submits a push-payment request.
    async fn request_payment(&self, request: PushPaymentRequest) -> Result<PushPaymentAccepted, GatewayError>;

    /// Queries the status of a push payment by the gateway-issued transaction reference.
    async fn query_payment_status(&self, reference: &str) -> Result<GatewayPaymentStatus, GatewayError>;
}
