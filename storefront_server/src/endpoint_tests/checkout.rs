use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Days, Utc};
use serde_json::{json, Value};
use storefront_engine::{
    db_types::{Coupon, Kes, OrderStatusType, Product, StoreSettings},
    events::EventProducers,
    test_utils::stub_gateway::{StubGateway, StubPushBehaviour},
    CheckoutApi,
};

use super::{
    helpers::{order, post_request, Caller, ALICE, BOB},
    mocks::MockStore,
};
use crate::{config::StoreCalendar, routes::CheckoutRoute};

fn checkout_body(phone: &str) -> String {
    let tomorrow = StoreCalendar::default().today() + Days::new(1);
    json!({
        "products": [{ "productId": "cake-1", "quantity": 1, "price": 500 }],
        "phoneNumber": phone,
        "pickupLocation": "Westlands",
        "pickupDate": tomorrow.format("%Y-%m-%d").to_string(),
        "pickupTime": "10:00",
    })
    .to_string()
}

fn configure(store: MockStore, gateway: StubGateway) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = CheckoutApi::new(store, gateway, EventProducers::default());
        cfg.app_data(web::Data::new(api))
            .app_data(web::Data::new(StoreCalendar::default()))
            .service(CheckoutRoute::<MockStore, StubGateway>::new());
    }
}

fn catalog_store() -> MockStore {
    let mut store = MockStore::new();
    store.expect_fetch_or_create_settings().returning(|| Ok(StoreSettings::default()));
    store
        .expect_fetch_products()
        .returning(|_| Ok(vec![Product::new("cake-1", "Black Forest", Kes::from_shillings(500))]));
    store
}

#[actix_web::test]
async fn checkout_requires_identity() {
    let _ = env_logger::try_init().ok();
    let configure = configure(MockStore::new(), StubGateway::default());
    let (status, body) = post_request(Caller::Anonymous, "/checkout", &checkout_body("0712345678"), configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Authentication required."), "{body}");
}

#[actix_web::test]
async fn invalid_phone_is_rejected_before_anything_else() {
    let _ = env_logger::try_init().ok();
    let gateway = StubGateway::default();
    let configure = configure(MockStore::new(), gateway.clone());
    let (status, body) = post_request(Caller::User(ALICE), "/checkout", &checkout_body("12345"), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert!(body["error"].as_str().unwrap().contains("12345"));
    assert!(gateway.push_requests().is_empty());
}

#[actix_web::test]
async fn closed_store_refuses_checkout() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_or_create_settings().returning(|| {
        Ok(StoreSettings { is_open: false, closed_message: "Closed for Easter".into(), ..Default::default() })
    });
    store.expect_fetch_products().never();
    let gateway = StubGateway::default();
    let configure = configure(store, gateway.clone());
    let (status, body) =
        post_request(Caller::User(ALICE), "/checkout", &checkout_body("0712345678"), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Checkout is not available. Closed for Easter"}"#);
    assert!(gateway.push_requests().is_empty());
}

#[actix_web::test]
async fn gateway_rejection_creates_no_order() {
    let _ = env_logger::try_init().ok();
    let mut store = catalog_store();
    store.expect_upsert_pending_order().never();
    store.expect_replace_coupon_for_user().never();
    let gateway = StubGateway::default();
    gateway.set_push_behaviour(StubPushBehaviour::Reject(json!({ "message": "Invalid phone number" })));
    let configure = configure(store, gateway.clone());
    let (status, body) =
        post_request(Caller::User(ALICE), "/checkout", &checkout_body("0712345678"), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"], "Failed to initiate STK push");
    assert_eq!(body["details"]["message"], "Invalid phone number");
    assert_eq!(gateway.push_requests().len(), 1);
}

#[actix_web::test]
async fn reference_belonging_to_someone_else_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let mut store = catalog_store();
    store
        .expect_fetch_order_by_external_reference()
        .returning(|r| Ok(Some(order(1, r, OrderStatusType::Pending))));
    store.expect_upsert_pending_order().never();
    let gateway = StubGateway::default();
    let mut body: Value = serde_json::from_str(&checkout_body("0712345678")).unwrap();
    body["externalReference"] = json!("order_1");
    let configure = configure(store, gateway.clone());
    let (status, body) = post_request(Caller::User(BOB), "/checkout", &body.to_string(), configure).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("Order reference order_1 is not available"), "{body}");
    assert!(gateway.push_requests().is_empty());
}

#[actix_web::test]
async fn gateway_outage_is_a_bad_gateway() {
    let _ = env_logger::try_init().ok();
    let mut store = catalog_store();
    store.expect_upsert_pending_order().never();
    let gateway = StubGateway::default();
    gateway.set_push_behaviour(StubPushBehaviour::Unavailable);
    let configure = configure(store, gateway);
    let (status, _) = post_request(Caller::User(ALICE), "/checkout", &checkout_body("0712345678"), configure).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[actix_web::test]
async fn successful_checkout() {
    let _ = env_logger::try_init().ok();
    let mut store = catalog_store();
    store.expect_upsert_pending_order().times(1).returning(|new_order| {
        assert_eq!(new_order.user_id, ALICE);
        assert_eq!(new_order.total_amount, Kes::from_shillings(500));
        assert_eq!(new_order.customer_phone.as_deref(), Some("0712345678"));
        assert_eq!(new_order.transaction_reference.as_deref(), Some("TXN-1"));
        let mut stored = order(1, new_order.order_id.as_str(), OrderStatusType::Pending);
        stored.external_reference = new_order.external_reference.clone();
        Ok((stored, true))
    });
    // 500 is over the loyalty threshold
    store.expect_replace_coupon_for_user().times(1).returning(|c| {
        Ok(Coupon {
            id: 1,
            code: c.code,
            user_id: c.user_id,
            discount_percentage: c.discount_percentage,
            expires_at: c.expires_at,
            is_active: true,
            created_at: Utc::now(),
        })
    });
    let gateway = StubGateway::default();
    let configure = configure(store, gateway.clone());
    let (status, body) =
        post_request(Caller::User(ALICE), "/checkout", &checkout_body("+254 712 345 678"), configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["transactionReference"], "TXN-1");
    assert_eq!(body["amount"], 500);
    assert_eq!(body["orderId"], body["externalReference"]);
    let requests = gateway.push_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount, Kes::from_shillings(500));
}
