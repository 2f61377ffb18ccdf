use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storefront_common::helpers::split_list;
use storefront_engine::{
    db_types::{OrderId, OrderStatusType},
    order_objects::OrderQueryFilter,
};

use crate::errors::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// The body of a payment status poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    #[serde(alias = "transaction_reference", alias = "reference")]
    pub transaction_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponValidationRequest {
    #[serde(alias = "couponCode")]
    pub code: String,
}

/// Query string of the admin order search. `status` is a comma-separated list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSearchParams {
    pub order_id: Option<String>,
    pub user_id: Option<String>,
    pub customer_phone: Option<String>,
    pub transaction_id: Option<String>,
    pub status: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl TryFrom<OrderSearchParams> for OrderQueryFilter {
    type Error = ServerError;

    fn try_from(params: OrderSearchParams) -> Result<Self, Self::Error> {
        let status = params
            .status
            .as_deref()
            .map(|s| {
                split_list(s)
                    .iter()
                    .map(|s| s.parse::<OrderStatusType>().map_err(|e| ServerError::InvalidInput(e.to_string())))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .filter(|s| !s.is_empty());
        Ok(OrderQueryFilter {
            order_id: params.order_id.map(OrderId::new),
            user_id: params.user_id,
            customer_phone: params.customer_phone,
            mpesa_transaction_id: params.transaction_id,
            since: params.since,
            until: params.until,
            status,
            limit: params.limit,
        })
    }
}
