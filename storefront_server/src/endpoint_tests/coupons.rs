use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, Utc};
use serde_json::Value;
use storefront_engine::{db_types::Coupon, CouponApi};

use super::{
    helpers::{get_request, post_request, Caller, ALICE, BOB},
    mocks::MockStore,
};
use crate::routes::{MyCouponRoute, ValidateCouponRoute};

fn configure(store: MockStore) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(CouponApi::new(store)))
            .service(ValidateCouponRoute::<MockStore>::new())
            .service(MyCouponRoute::<MockStore>::new());
    }
}

fn alices_coupon(code: &str) -> Coupon {
    Coupon {
        id: 1,
        code: code.to_string(),
        user_id: ALICE.to_string(),
        discount_percentage: 10,
        expires_at: Utc::now() + Duration::days(30),
        is_active: true,
        created_at: Utc::now(),
    }
}

#[actix_web::test]
async fn validate_own_coupon() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_coupon_by_code().returning(|code| Ok(Some(alices_coupon(code))));
    let (status, body) =
        post_request(Caller::User(ALICE), "/coupons/validate", r#"{"couponCode":"GIFTAB12CD"}"#, configure(store))
            .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, r#"{"code":"GIFTAB12CD","discountPercentage":10}"#);
}

#[actix_web::test]
async fn someone_elses_coupon_is_invalid() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_coupon_by_code().returning(|code| Ok(Some(alices_coupon(code))));
    let (status, body) =
        post_request(Caller::User(BOB), "/coupons/validate", r#"{"code":"GIFTAB12CD"}"#, configure(store)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"Invalid or expired coupon code"}"#);
}

#[actix_web::test]
async fn expired_coupon_is_invalid() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_coupon_by_code().returning(|code| {
        Ok(Some(Coupon { expires_at: Utc::now() - Duration::hours(1), ..alices_coupon(code) }))
    });
    let (status, _) =
        post_request(Caller::User(ALICE), "/coupons/validate", r#"{"code":"GIFTAB12CD"}"#, configure(store)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn my_coupon() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_active_coupon_for_user().returning(|user| {
        let coupon = (user == ALICE).then(|| alices_coupon("GIFTAB12CD"));
        Ok(coupon)
    });
    let (status, body) = get_request(Caller::User(ALICE), "/coupons", configure(store)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["coupon"]["code"], "GIFTAB12CD");
    assert_eq!(body["coupon"]["discountPercentage"], 10);
}

#[actix_web::test]
async fn no_coupon_is_null() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_active_coupon_for_user().returning(|_| Ok(None));
    let (status, body) = get_request(Caller::User(BOB), "/coupons", configure(store)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"coupon":null}"#);
}
