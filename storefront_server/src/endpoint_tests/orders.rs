use actix_web::{http::StatusCode, web, web::ServiceConfig};
use mockall::predicate::eq;
use serde_json::Value;
use storefront_engine::{
    db_types::{OrderId, OrderStatusType},
    traits::TransitionOutcome,
    OrderQueryApi,
};

use super::{
    helpers::{get_request, order, put_request, Caller, ALICE, BOB},
    mocks::MockStore,
};
use crate::routes::{MyOrdersRoute, OrderStatusRoute, SearchOrdersRoute, UpdateOrderStatusRoute};

fn configure(store: MockStore) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(OrderQueryApi::new(store)))
            .service(SearchOrdersRoute::<MockStore>::new())
            .service(OrderStatusRoute::<MockStore>::new())
            .service(UpdateOrderStatusRoute::<MockStore>::new())
            .service(MyOrdersRoute::<MockStore>::new());
    }
}

#[actix_web::test]
async fn fetch_my_orders_no_headers() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request(Caller::Anonymous, "/orders", configure(MockStore::new())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Authentication Error. Authentication required."}"#);
}

#[actix_web::test]
async fn fetch_my_orders() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_orders_for_user().with(eq(ALICE)).times(1).returning(|_| {
        Ok(vec![order(2, "order_2", OrderStatusType::Paid), order(1, "order_1", OrderStatusType::Pending)])
    });
    let (status, body) = get_request(Caller::User(ALICE), "/orders", configure(store)).await;
    assert_eq!(status, StatusCode::OK);
    let orders: Value = serde_json::from_str(&body).unwrap();
    let orders = orders.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["orderId"], "order_2");
    assert_eq!(orders[0]["status"], "paid");
    assert_eq!(orders[0]["totalAmount"], 500);
    assert_eq!(orders[1]["status"], "pending");
}

#[actix_web::test]
async fn order_status_for_owner() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_order_by_order_id().returning(|id| {
        let mut o = order(1, id.as_str(), OrderStatusType::Paid);
        o.mpesa_transaction_id = Some("SAB1CD2EFG".into());
        Ok(Some(o))
    });
    let (status, body) = get_request(Caller::User(ALICE), "/orders/status/order_1", configure(store)).await;
    assert_eq!(status, StatusCode::OK);
    let report: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["orderId"], "order_1");
    assert_eq!(report["status"], "paid");
    assert_eq!(report["transactionId"], "SAB1CD2EFG");
}

#[actix_web::test]
async fn another_users_order_is_not_found() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store
        .expect_fetch_order_by_order_id()
        .returning(|id| Ok(Some(order(1, id.as_str(), OrderStatusType::Pending))));
    let (status, _) = get_request(Caller::User(BOB), "/orders/status/order_1", configure(store)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn search_requires_admin() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_search_orders().never();
    let (status, body) = get_request(Caller::User(ALICE), "/orders/search?status=paid", configure(store)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.starts_with("Authentication Error. Insufficient permissions."), "{body}");
}

#[actix_web::test]
async fn admin_search() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_search_orders().times(1).returning(|filter| {
        assert_eq!(filter.status, Some(vec![OrderStatusType::Paid, OrderStatusType::Delivered]));
        assert_eq!(filter.user_id.as_deref(), Some(ALICE));
        Ok(vec![order(1, "order_1", OrderStatusType::Paid)])
    });
    let path = "/orders/search?status=paid,delivered&userId=alice";
    let (status, body) = get_request(Caller::Admin(BOB), path, configure(store)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let orders: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(orders.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn admin_marks_order_delivered() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store
        .expect_update_order_status()
        .with(eq(OrderId::new("order_1")), eq(OrderStatusType::Paid), eq(OrderStatusType::Delivered))
        .times(1)
        .returning(|id, _, to| Ok(TransitionOutcome::Applied(order(1, id.as_str(), to))));
    let (status, body) =
        put_request(Caller::Admin(BOB), "/orders/order_1/status", r#"{"status":"delivered"}"#, configure(store)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let order: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(order["status"], "delivered");
}

#[actix_web::test]
async fn cancelling_a_paid_order_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store
        .expect_update_order_status()
        .returning(|id, _, _| Ok(TransitionOutcome::AlreadyFinal(order(1, id.as_str(), OrderStatusType::Paid))));
    let (status, _) =
        put_request(Caller::Admin(BOB), "/orders/order_1/status", r#"{"status":"cancelled"}"#, configure(store)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[actix_web::test]
async fn admins_cannot_mark_orders_paid() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store
        .expect_fetch_order_by_order_id()
        .returning(|id| Ok(Some(order(1, id.as_str(), OrderStatusType::Pending))));
    store.expect_update_order_status().never();
    let (status, _) =
        put_request(Caller::Admin(BOB), "/orders/order_1/status", r#"{"status":"paid"}"#, configure(store)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
