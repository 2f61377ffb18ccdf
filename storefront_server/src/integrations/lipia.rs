//! Binds the Lipia gateway client to the engine's [`PaymentGateway`] seam.
use lipia_tools::{LipiaApi, LipiaApiError, StkPushRequest};
use log::*;
use serde_json::{json, Value};
use storefront_engine::traits::{
    GatewayError,
    GatewayPaymentStatus,
    PaymentGateway,
    PushPaymentAccepted,
    PushPaymentRequest,
};

#[derive(Clone)]
pub struct LipiaGateway {
    api: LipiaApi,
}

impl LipiaGateway {
    pub fn new(api: LipiaApi) -> Self {
        Self { api }
    }
}

impl PaymentGateway for LipiaGateway {
    async fn request_payment(&self, request: PushPaymentRequest) -> Result<PushPaymentAccepted, GatewayError> {
        let push = StkPushRequest {
            phone_number: request.phone.as_str().to_string(),
            // The gateway only deals in whole shillings
            amount: request.amount.round_to_shilling().shillings(),
            external_reference: request.external_reference,
            callback_url: self.api.callback_url().to_string(),
            metadata: request.metadata,
        };
        let response = self.api.stk_push(&push).await.map_err(into_gateway_error)?;
        if !response.success {
            warn!("📲️ Gateway refused STK push for {}: {:?}", push.external_reference, response.message);
            return Err(GatewayError::Rejected { details: response.raw });
        }
        let data = response.data.ok_or_else(|| {
            GatewayError::InvalidResponse(format!("STK push accepted without payment data. {}", response.raw))
        })?;
        Ok(PushPaymentAccepted {
            transaction_reference: data.transaction_reference,
            merchant_request_id: data.merchant_request_id,
        })
    }

    async fn query_payment_status(&self, reference: &str) -> Result<GatewayPaymentStatus, GatewayError> {
        let response = self.api.payment_status(reference).await.map_err(into_gateway_error)?;
        Ok(GatewayPaymentStatus {
            success: response.success,
            paid: response.is_paid(),
            transaction_id: response.receipt_number().map(String::from),
            raw: response.raw,
        })
    }
}

fn into_gateway_error(e: LipiaApiError) -> GatewayError {
    if e.is_client_error() {
        let details = match &e {
            LipiaApiError::QueryError { message, .. } => {
                serde_json::from_str::<Value>(message).unwrap_or_else(|_| json!({ "message": message }))
            },
            _ => json!({ "message": e.to_string() }),
        };
        return GatewayError::Rejected { details };
    }
    match e {
        LipiaApiError::JsonError(s) => GatewayError::InvalidResponse(s),
        e => {
            error!("📲️ Gateway request failed. {e}");
            GatewayError::Unavailable(e.to_string())
        },
    }
}
