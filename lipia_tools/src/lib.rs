//! Client for the Lipia mobile-money gateway (API v2).
//!
//! Only the two calls the storefront needs are wrapped: the STK push that prompts a customer's phone for payment, and
//! the status query used when a customer polls for the result of a push.
mod api;
mod config;
mod error;

mod data_objects;

pub use api::LipiaApi;
pub use config::LipiaConfig;
pub use data_objects::{PaymentStatusData, PaymentStatusResponse, StkPushData, StkPushRequest, StkPushResponse};
pub use error::LipiaApiError;
