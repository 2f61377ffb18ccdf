use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::traits::{GatewayError, GatewayPaymentStatus, PaymentGateway, PushPaymentAccepted, PushPaymentRequest};

#[derive(Debug, Clone)]
pub enum StubPushBehaviour {
    /// Accept every request, issuing `TXN-<n>` references
    Accept,
    Reject(Value),
    Unavailable,
}

#[derive(Debug, Clone)]
pub enum StubStatusBehaviour {
    Pending,
    Paid { receipt: String },
    Unavailable,
}

#[derive(Debug)]
struct StubState {
    push: StubPushBehaviour,
    status: StubStatusBehaviour,
    push_requests: Vec<PushPaymentRequest>,
    status_queries: Vec<String>,
}

/// A payment gateway that answers from canned behaviour and records every call made to it.
#[derive(Debug, Clone)]
pub struct StubGateway {
    state: Arc<Mutex<StubState>>,
}

impl Default for StubGateway {
    fn default() -> Self {
        let state = StubState {
            push: StubPushBehaviour::Accept,
            status: StubStatusBehaviour::Pending,
            push_requests: vec![],
            status_queries: vec![],
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }
}

impl StubGateway {
    pub fn set_push_behaviour(&self, behaviour: StubPushBehaviour) {
        self.state.lock().expect("stub gateway lock poisoned").push = behaviour;
    }

    pub fn set_status_behaviour(&self, behaviour: StubStatusBehaviour) {
        self.state.lock().expect("stub gateway lock poisoned").status = behaviour;
    }

    pub fn push_requests(&self) -> Vec<PushPaymentRequest> {
        self.state.lock().expect("stub gateway lock poisoned").push_requests.clone()
    }

    pub fn status_queries(&self) -> Vec<String> {
        self.state.lock().expect("stub gateway lock poisoned").status_queries.clone()
    }
}

impl PaymentGateway for StubGateway {
    async fn request_payment(&self, request: PushPaymentRequest) -> Result<PushPaymentAccepted, GatewayError> {
        let mut state = self.state.lock().expect("stub gateway lock poisoned");
        state.push_requests.push(request);
        match state.push.clone() {
            StubPushBehaviour::Accept => {
                let n = state.push_requests.len();
                Ok(PushPaymentAccepted {
                    transaction_reference: format!("TXN-{n}"),
                    merchant_request_id: Some(format!("MR-{n}")),
                })
            },
            StubPushBehaviour::Reject(details) => Err(GatewayError::Rejected { details }),
            StubPushBehaviour::Unavailable => Err(GatewayError::Unavailable("stub gateway is down".into())),
        }
    }

    async fn query_payment_status(&self, reference: &str) -> Result<GatewayPaymentStatus, GatewayError> {
        let mut state = self.state.lock().expect("stub gateway lock poisoned");
        state.status_queries.push(reference.to_string());
        match state.status.clone() {
            StubStatusBehaviour::Pending => Ok(GatewayPaymentStatus {
                success: true,
                paid: false,
                transaction_id: None,
                raw: json!({ "status": "pending" }),
            }),
            StubStatusBehaviour::Paid { receipt } => Ok(GatewayPaymentStatus {
                success: true,
                paid: true,
                transaction_id: Some(receipt.clone()),
                raw: json!({ "status": true, "MpesaReceiptNumber": receipt }),
            }),
            StubStatusBehaviour::Unavailable => Err(GatewayError::Unavailable("stub gateway is down".into())),
        }
    }
}
