use std::time::Duration;

use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web::ServiceConfig,
    App,
    ResponseError,
};
use chrono::{TimeZone, Utc};
use log::debug;
use storefront_engine::{
    db_types::{Json, Kes, LineItem, Order, OrderId, OrderStatusType, PaymentMethod},
    events::EventProducers,
    test_utils::stub_gateway::StubGateway,
    ReconciliationApi,
    ReconciliationOptions,
};

use super::mocks::MockStore;
use crate::auth::{USER_ID_HEADER, USER_ROLES_HEADER};

pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";

/// Who a test request claims to be. The authenticating proxy would normally set these headers.
#[derive(Debug, Clone, Copy)]
pub enum Caller {
    Anonymous,
    User(&'static str),
    Admin(&'static str),
}

impl Caller {
    fn apply(self, req: TestRequest) -> TestRequest {
        match self {
            Caller::Anonymous => req,
            Caller::User(id) => req.insert_header((USER_ID_HEADER, id)),
            Caller::Admin(id) => req.insert_header((USER_ID_HEADER, id)).insert_header((USER_ROLES_HEADER, "admin")),
        }
    }
}

pub async fn get_request(
    caller: Caller,
    path: &str,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    let req = caller.apply(TestRequest::get().uri(path));
    send(req, configure).await
}

pub async fn post_request(
    caller: Caller,
    path: &str,
    body: &str,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    let req = caller
        .apply(TestRequest::post().uri(path))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.to_string());
    send(req, configure).await
}

pub async fn put_request(
    caller: Caller,
    path: &str,
    body: &str,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    let req = caller
        .apply(TestRequest::put().uri(path))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.to_string());
    send(req, configure).await
}

/// Sends the request and returns the status and body. Errors raised by middleware, which never become a response
/// inside the test service, are reported with their own status code and message.
pub async fn send(req: TestRequest, configure: impl FnOnce(&mut ServiceConfig)) -> (StatusCode, String) {
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = res.into_body().try_into_bytes().map(|b| String::from_utf8_lossy(&b).into_owned());
            (status, body.unwrap_or_default())
        },
        Err(e) => (e.as_response_error().status_code(), e.to_string()),
    }
}

/// Callbacks look for their order once, so that unmatched callbacks are given up on quickly.
pub fn reconciliation_api(store: MockStore, gateway: StubGateway) -> ReconciliationApi<MockStore, StubGateway> {
    let options =
        ReconciliationOptions { lookup_attempts: 1, lookup_delay: Duration::from_millis(10), ..Default::default() };
    ReconciliationApi::new(store, gateway, EventProducers::default()).with_options(options)
}

/// A pending single-cake order for Alice
pub fn order(id: i64, order_id: &str, status: OrderStatusType) -> Order {
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    Order {
        id,
        order_id: OrderId::new(order_id),
        user_id: ALICE.to_string(),
        items: Json(vec![LineItem::new("cake-1", 1, Kes::from_shillings(500))]),
        total_amount: Kes::from_shillings(500),
        status,
        payment_method: PaymentMethod::Mpesa,
        pickup_location: Some("Westlands".to_string()),
        pickup_date: None,
        pickup_time: Some("10:00".to_string()),
        external_reference: order_id.to_string(),
        transaction_reference: Some(format!("TXN-{id}")),
        merchant_request_id: None,
        mpesa_transaction_id: None,
        payment_channel: None,
        payment_meta: None,
        coupon_code: None,
        customer_phone: Some("254712345678".to_string()),
        customer_name: None,
        paid_at: None,
        created_at,
        updated_at: created_at,
    }
}
