use std::time::Duration;

use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use chrono::Utc;
use serde_json::{json, Value};
use storefront_common::Secret;
use storefront_engine::{
    db_types::{Kes, OrderStatusType, PaymentChannel},
    test_utils::stub_gateway::{StubGateway, StubStatusBehaviour},
    traits::{Settlement, TransitionOutcome},
};
use tokio::sync::mpsc;

use super::{
    helpers::{order, post_request, reconciliation_api, send, Caller, ALICE},
    mocks::MockStore,
};
use crate::{
    config::SmsRelayConfig,
    middleware::{RelaySignature, RelaySignatureMiddlewareFactory, ReplayGuard, RELAY_SIGNATURE_HEADER},
    routes::{CheckoutStatusRoute, GatewayCallbackRoute, SmsRelayRoute, UnifiedWebhookRoute},
};

const PAYMENT_SMS: &str = "SAB1CD2EFG Confirmed. You have received Ksh500.00 from JANE DOE 0712345678 on 5/1/24 at \
                           2:30 PM. New M-PESA balance is Ksh3,000.00.";
const RELAY_SECRET: &str = "relay-secret";

fn configure(store: MockStore, gateway: StubGateway, signature_checks: bool) -> impl FnOnce(&mut ServiceConfig) {
    configure_with_guard(store, gateway, signature_checks, ReplayGuard::default())
}

fn configure_with_guard(
    store: MockStore,
    gateway: StubGateway,
    signature_checks: bool,
    guard: ReplayGuard,
) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let relay = SmsRelayConfig {
            hmac_secret: Secret::new(RELAY_SECRET.to_string()),
            hmac_checks: signature_checks,
            ..Default::default()
        };
        cfg.app_data(web::Data::new(reconciliation_api(store, gateway)))
            .service(CheckoutStatusRoute::<MockStore, StubGateway>::new())
            .service(web::scope("/gateway/callback").service(GatewayCallbackRoute::<MockStore, StubGateway>::new()))
            .service(
                web::scope("/gateway")
                    .wrap(RelaySignatureMiddlewareFactory::new(&relay, guard))
                    .service(SmsRelayRoute::<MockStore, StubGateway>::new())
                    .service(UnifiedWebhookRoute::<MockStore, StubGateway>::new()),
            );
    }
}

fn unsigned(store: MockStore) -> impl FnOnce(&mut ServiceConfig) {
    configure(store, StubGateway::default(), false)
}

fn signed(store: MockStore) -> impl FnOnce(&mut ServiceConfig) {
    configure(store, StubGateway::default(), true)
}

fn relay_request(body: &str, signature: Option<RelaySignature>) -> TestRequest {
    let req = TestRequest::post().uri("/gateway/sms").set_payload(body.to_string());
    match signature {
        Some(sig) => req.insert_header((RELAY_SIGNATURE_HEADER, sig.to_string())),
        None => req,
    }
}

fn sms_body(from: &str, content: &str) -> String {
    json!({ "from": from, "content": content }).to_string()
}

/// A store holding one pending order for 500 that records the settlements it is asked to make
fn store_with_pending_order() -> (MockStore, mpsc::UnboundedReceiver<Settlement>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut store = MockStore::new();
    store.expect_fetch_order_by_mpesa_transaction_id().returning(|_| Ok(None));
    store.expect_fetch_pending_orders_by_amount().returning(|amount| {
        let pending = order(1, "order_1", OrderStatusType::Pending);
        Ok(if pending.total_amount == amount { vec![pending] } else { vec![] })
    });
    store.expect_fetch_order_by_correlation().returning(|_| Ok(Some(order(1, "order_1", OrderStatusType::Pending))));
    store.expect_count_pending_orders().returning(|| Ok(1));
    store.expect_settle_order().returning(move |id, settlement| {
        let status = match &settlement {
            Settlement::Paid { .. } => OrderStatusType::Paid,
            Settlement::Failed { .. } => OrderStatusType::Failed,
        };
        let _ = tx.send(settlement);
        Ok(TransitionOutcome::Applied(order(id, "order_1", status)))
    });
    (store, rx)
}

#[actix_web::test]
async fn callback_is_always_acknowledged() {
    let _ = env_logger::try_init().ok();
    for body in ["not even json", "{}", r#"{"status": true}"#, r#"{"response": "ok"}"#] {
        let (status, reply) =
            post_request(Caller::Anonymous, "/gateway/callback", body, signed(MockStore::new())).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(reply, "ok");
    }
}

#[actix_web::test]
async fn callback_settles_order_after_acknowledging() {
    let _ = env_logger::try_init().ok();
    let (store, mut settlements) = store_with_pending_order();
    let body = json!({
        "status": true,
        "response": {
            "ExternalReference": "order_1",
            "TransactionReference": "TXN-1",
            "MpesaReceiptNumber": "SAB1CD2EFG",
            "Status": "Success"
        }
    })
    .to_string();
    let (status, reply) = post_request(Caller::Anonymous, "/gateway/callback", &body, signed(store)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, "ok");
    let settlement = tokio::time::timeout(Duration::from_secs(5), settlements.recv())
        .await
        .expect("callback was not processed")
        .expect("channel closed");
    match settlement {
        Settlement::Paid { transaction_id, channel, .. } => {
            assert_eq!(transaction_id, "SAB1CD2EFG");
            assert_eq!(channel, PaymentChannel::Callback);
        },
        Settlement::Failed { .. } => panic!("Expected the order to be paid"),
    }
}

#[actix_web::test]
async fn sms_payment_settles_matching_order() {
    let _ = env_logger::try_init().ok();
    let (store, mut settlements) = store_with_pending_order();
    let (status, body) =
        post_request(Caller::Anonymous, "/gateway/sms", &sms_body("MPESA", PAYMENT_SMS), unsigned(store)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Order order_1 paid");
    match settlements.try_recv().expect("No settlement was made") {
        Settlement::Paid { transaction_id, channel, customer_phone, .. } => {
            assert_eq!(transaction_id, "SAB1CD2EFG");
            assert_eq!(channel, PaymentChannel::Sms);
            assert_eq!(customer_phone.as_deref(), Some("254712345678"));
        },
        Settlement::Failed { .. } => panic!("Expected the order to be paid"),
    }
}

#[actix_web::test]
async fn unmatched_sms_is_acknowledged() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_order_by_mpesa_transaction_id().returning(|_| Ok(None));
    store.expect_fetch_pending_orders_by_amount().withf(|a| *a == Kes::from_shillings(750)).returning(|_| Ok(vec![]));
    store.expect_count_pending_orders().returning(|| Ok(3));
    store.expect_settle_order().never();
    let content = PAYMENT_SMS.replace("Ksh500.00", "Ksh750.00");
    let (status, body) =
        post_request(Caller::Anonymous, "/gateway/sms", &sms_body("MPESA", &content), unsigned(store)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    // The relay must not retry a message that simply matches nothing
    assert_eq!(body["success"], true);
    assert!(body["message"].as_str().unwrap().contains("SAB1CD2EFG"));
}

#[actix_web::test]
async fn redelivered_sms_does_not_pay_another_order() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_order_by_mpesa_transaction_id().withf(|r| r == "SAB1CD2EFG").times(1).returning(|_| {
        let mut paid = order(1, "order_1", OrderStatusType::Paid);
        paid.mpesa_transaction_id = Some("SAB1CD2EFG".into());
        Ok(Some(paid))
    });
    store.expect_fetch_pending_orders_by_amount().never();
    store.expect_settle_order().never();
    let (status, body) =
        post_request(Caller::Anonymous, "/gateway/sms", &sms_body("MPESA", PAYMENT_SMS), unsigned(store)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Order order_1 was already Paid");
}

#[actix_web::test]
async fn untrusted_sender_is_ignored() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_pending_orders_by_amount().never();
    let (status, body) =
        post_request(Caller::Anonymous, "/gateway/sms", &sms_body("+254700000000", PAYMENT_SMS), unsigned(store)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["success"], true);
    assert!(body["message"].as_str().unwrap().starts_with("Ignored"));
}

#[actix_web::test]
async fn malformed_sms_is_a_bad_request() {
    let _ = env_logger::try_init().ok();
    let content = "SAB1CD2EFG Confirmed. You have received money from JANE DOE 0712345678.";
    let (status, _) = post_request(
        Caller::Anonymous,
        "/gateway/sms",
        &sms_body("MPESA", content),
        unsigned(MockStore::new()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_request(
        Caller::Anonymous,
        "/gateway/sms",
        r#"{"text": "hello"}"#,
        unsigned(MockStore::new()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn webhook_routes_by_shape() {
    let _ = env_logger::try_init().ok();
    let (store, mut settlements) = store_with_pending_order();
    let (status, body) =
        post_request(Caller::Anonymous, "/gateway/webhook", &sms_body("MPESA", PAYMENT_SMS), unsigned(store)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""success":true"#), "{body}");
    assert!(matches!(settlements.try_recv(), Ok(Settlement::Paid { channel: PaymentChannel::Sms, .. })));

    let callback = json!({ "status": false, "data": { "ExternalReference": "order_1", "Status": "Failed" } });
    let (store, mut settlements) = store_with_pending_order();
    let (status, body) =
        post_request(Caller::Anonymous, "/gateway/webhook", &callback.to_string(), unsigned(store)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
    let settlement = tokio::time::timeout(Duration::from_secs(5), settlements.recv()).await.unwrap().unwrap();
    assert!(matches!(settlement, Settlement::Failed { channel: PaymentChannel::Callback, .. }));
}

#[actix_web::test]
async fn webhook_rejects_unknown_shapes() {
    let _ = env_logger::try_init().ok();
    for body in ["garbage", r#"{"hello": "world"}"#, r#"{"content": "hi", "from": "MPESA", "extra": 1}"#] {
        let (status, _) = post_request(Caller::Anonymous, "/gateway/webhook", body, unsigned(MockStore::new())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    }
}

#[actix_web::test]
async fn relay_requires_a_valid_signature() {
    let _ = env_logger::try_init().ok();
    let body = sms_body("SOMEONE", PAYMENT_SMS);
    let now = Utc::now().timestamp();

    let (status, reply) = send(relay_request(&body, None), signed(MockStore::new())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(reply, "No relay signature found.");

    let req = relay_request(&body, None).insert_header((RELAY_SIGNATURE_HEADER, "sha256=abc"));
    let (status, reply) = send(req, signed(MockStore::new())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(reply.starts_with("Malformed relay signature."), "{reply}");

    let forged = RelaySignature::sign("wrong-secret", now, body.as_bytes());
    let (status, reply) = send(relay_request(&body, Some(forged)), signed(MockStore::new())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(reply, "Invalid relay signature.");

    // Signed with the right key, but for a different body
    let tampered = RelaySignature::sign(RELAY_SECRET, now, sms_body("MPESA", PAYMENT_SMS).as_bytes());
    let (status, reply) = send(relay_request(&body, Some(tampered)), signed(MockStore::new())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(reply, "Invalid relay signature.");

    // A correctly signed message reaches the handler, which ignores it because of the sender
    let valid = RelaySignature::sign(RELAY_SECRET, now, body.as_bytes());
    let (status, reply) = send(relay_request(&body, Some(valid)), signed(MockStore::new())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(reply.contains("Untrusted sender SOMEONE"), "{reply}");
}

#[actix_web::test]
async fn stale_relay_deliveries_are_refused() {
    let _ = env_logger::try_init().ok();
    let body = sms_body("MPESA", PAYMENT_SMS);
    let mut store = MockStore::new();
    store.expect_fetch_pending_orders_by_amount().never();
    let old = RelaySignature::sign(RELAY_SECRET, Utc::now().timestamp() - 600, body.as_bytes());
    let (status, reply) = send(relay_request(&body, Some(old)), signed(store)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(reply, "The relay signature has expired.");

    let future = RelaySignature::sign(RELAY_SECRET, Utc::now().timestamp() + 600, body.as_bytes());
    let (status, _) = send(relay_request(&body, Some(future)), signed(MockStore::new())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn replayed_relay_delivery_is_refused() {
    let _ = env_logger::try_init().ok();
    let guard = ReplayGuard::default();
    let body = sms_body("MPESA", PAYMENT_SMS);
    let signature = RelaySignature::sign(RELAY_SECRET, Utc::now().timestamp(), body.as_bytes());

    let (store, mut settlements) = store_with_pending_order();
    let configure = configure_with_guard(store, StubGateway::default(), true, guard.clone());
    let (status, reply) = send(relay_request(&body, Some(signature.clone())), configure).await;
    assert_eq!(status, StatusCode::OK, "{reply}");
    assert!(matches!(settlements.try_recv(), Ok(Settlement::Paid { .. })));

    let mut store = MockStore::new();
    store.expect_fetch_order_by_mpesa_transaction_id().never();
    store.expect_settle_order().never();
    let configure = configure_with_guard(store, StubGateway::default(), true, guard);
    let (status, reply) = send(relay_request(&body, Some(signature)), configure).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(reply, "This relay delivery has already been processed.");
}

#[actix_web::test]
async fn poll_confirms_payment_with_gateway() {
    let _ = env_logger::try_init().ok();
    let (store, mut settlements) = store_with_pending_order();
    let gateway = StubGateway::default();
    gateway.set_status_behaviour(StubStatusBehaviour::Paid { receipt: "QWE9RT8YU7".into() });
    let (status, body) = post_request(
        Caller::User(ALICE),
        "/checkout/status",
        r#"{"transactionReference": "TXN-1"}"#,
        configure(store, gateway.clone(), false),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "PAID");
    assert_eq!(body["success"], true);
    assert_eq!(body["orderId"], "order_1");
    assert_eq!(gateway.status_queries(), vec!["TXN-1".to_string()]);
    assert!(matches!(settlements.try_recv(), Ok(Settlement::Paid { channel: PaymentChannel::Poll, .. })));
}

#[actix_web::test]
async fn poll_for_unknown_reference_is_pending() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_order_by_correlation().returning(|_| Ok(None));
    let gateway = StubGateway::default();
    let (status, body) = post_request(
        Caller::User(ALICE),
        "/checkout/status",
        r#"{"transactionReference": "TXN-404"}"#,
        configure(store, gateway.clone(), false),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":false,"status":"PENDING","message":"Waiting for payment..."}"#);
    assert!(gateway.status_queries().is_empty());
}
