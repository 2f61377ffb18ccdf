use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use serde_json::{json, Value};
use storefront_engine::{CheckoutError, CouponError, OrderApiError, ReconciliationError, SettingsError};
use thiserror::Error;

use crate::middleware::RelayRejection;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("{0}")]
    NoRecordFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{message}")]
    GatewayRejected { message: String, details: Value },
    #[error("The payment provider could not be reached. Please try again.")]
    GatewayUnavailable,
    #[error("{0}")]
    RelayRejected(RelayRejection),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingIdentity => StatusCode::UNAUTHORIZED,
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
                AuthError::ForbiddenPeer => StatusCode::FORBIDDEN,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::GatewayRejected { .. } => StatusCode::BAD_REQUEST,
            Self::GatewayUnavailable => StatusCode::BAD_GATEWAY,
            Self::RelayRejected(RelayRejection::Replayed) => StatusCode::CONFLICT,
            Self::RelayRejected(RelayRejection::UnreadableBody) => StatusCode::BAD_REQUEST,
            Self::RelayRejected(_) => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::GatewayRejected { message, details } => json!({ "error": message, "details": details }),
            _ => json!({ "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).insert_header(ContentType::json()).body(body.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Authentication required.")]
    MissingIdentity,
    #[error("Insufficient permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Requests from this address are not accepted.")]
    ForbiddenPeer,
}

impl From<CheckoutError> for ServerError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::GatewayRejected(ref details) => Self::GatewayRejected { message: e.to_string(), details: details.clone() },
            CheckoutError::GatewayUnavailable(reason) => {
                error!("💻️ The payment gateway could not start a checkout. {reason}");
                Self::GatewayUnavailable
            },
            CheckoutError::DatabaseError(s) => Self::BackendError(s),
            CheckoutError::ReferenceConflict(s) => Self::Conflict(s),
            e => Self::InvalidInput(e.to_string()),
        }
    }
}

impl From<ReconciliationError> for ServerError {
    fn from(e: ReconciliationError) -> Self {
        match e {
            ReconciliationError::MalformedSms(_) | ReconciliationError::MalformedPayload(_) => {
                Self::InvalidInput(e.to_string())
            },
            ReconciliationError::DatabaseError(s) => Self::BackendError(s),
        }
    }
}

impl From<SettingsError> for ServerError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::InvalidFormat(_) => Self::InvalidInput(e.to_string()),
            SettingsError::DatabaseError(s) => Self::BackendError(s),
        }
    }
}

impl From<OrderApiError> for ServerError {
    fn from(e: OrderApiError) -> Self {
        match e {
            OrderApiError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
            OrderApiError::ForbiddenTransition { .. } => Self::InvalidInput(e.to_string()),
            OrderApiError::TransitionConflict { .. } => Self::Conflict(e.to_string()),
            OrderApiError::DatabaseError(s) => Self::BackendError(s),
        }
    }
}

impl From<CouponError> for ServerError {
    fn from(e: CouponError) -> Self {
        match e {
            CouponError::NotFound => Self::NoRecordFound("Invalid or expired coupon code".into()),
            CouponError::DatabaseError(s) => Self::BackendError(s),
        }
    }
}
