use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    config::LipiaConfig,
    data_objects::{PaymentStatusResponse, StkPushRequest, StkPushResponse},
    LipiaApiError,
};

#[derive(Clone)]
pub struct LipiaApi {
    config: LipiaConfig,
    client: Arc<Client>,
}

impl LipiaApi {
    pub fn new(config: LipiaConfig) -> Result<Self, LipiaApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = format!("Bearer {}", config.api_key.reveal());
        let mut val = HeaderValue::from_str(&bearer).map_err(|e| LipiaApiError::Initialization(e.to_string()))?;
        val.set_sensitive(true);
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| LipiaApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn callback_url(&self) -> &str {
        self.config.callback_url.as_str()
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, LipiaApiError> {
        let url = self.url(path);
        trace!("📲️ Sending REST query: {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| LipiaApiError::RestRequestError(e.to_string()))?;
        if response.status().is_success() {
            trace!("📲️ REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| LipiaApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| LipiaApiError::RestResponseError(e.to_string()))?;
            Err(LipiaApiError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Ask the gateway to prompt the customer's phone for payment.
    ///
    /// A response with `success: false` is still returned as `Ok`; it is up to the caller to decide what a refusal
    /// means. The raw response body is kept in [`StkPushResponse::raw`].
    pub async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushResponse, LipiaApiError> {
        debug!(
            "📲️ Sending STK push for {} to {} (ref {})",
            request.amount, request.phone_number, request.external_reference
        );
        let raw = self.rest_query::<Value, _>(Method::POST, "/payments/stk-push", &[], Some(request)).await?;
        let mut response = serde_json::from_value::<StkPushResponse>(raw.clone())
            .map_err(|e| LipiaApiError::JsonError(format!("{e}. Response was {raw}")))?;
        response.raw = raw;
        info!("📲️ STK push for {} accepted: {}", request.external_reference, response.success);
        Ok(response)
    }

    /// Query the state of a push payment by its transaction reference.
    pub async fn payment_status(&self, reference: &str) -> Result<PaymentStatusResponse, LipiaApiError> {
        trace!("📲️ Querying payment status for {reference}");
        let raw =
            self.rest_query::<Value, ()>(Method::GET, "/payments/status", &[("reference", reference)], None).await?;
        let mut response = serde_json::from_value::<PaymentStatusResponse>(raw.clone())
            .map_err(|e| LipiaApiError::JsonError(format!("{e}. Response was {raw}")))?;
        response.raw = raw;
        debug!("📲️ Payment status for {reference}: paid = {}", response.is_paid());
        Ok(response)
    }
}
