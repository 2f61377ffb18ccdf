use actix_web::{http::StatusCode, web, web::ServiceConfig};
use serde_json::Value;
use storefront_engine::{
    db_types::{Json, StoreSettings},
    SettingsApi,
};

use super::{
    helpers::{get_request, put_request, Caller, ALICE, BOB},
    mocks::MockStore,
};
use crate::routes::{StoreSettingsRoute, UpdateSettingsRoute};

fn configure(store: MockStore) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(SettingsApi::new(store)))
            .service(StoreSettingsRoute::<MockStore>::new())
            .service(UpdateSettingsRoute::<MockStore>::new());
    }
}

#[actix_web::test]
async fn settings_are_public() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_or_create_settings().times(1).returning(|| Ok(StoreSettings::default()));
    let (status, body) = get_request(Caller::Anonymous, "/settings", configure(store)).await;
    assert_eq!(status, StatusCode::OK);
    let settings: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(settings["isOpen"], true);
    assert_eq!(settings["maxBookingDays"], 14);
    assert_eq!(settings["pickupTimes"][0], "10:00");
}

#[actix_web::test]
async fn updating_settings_requires_admin() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_update_settings().never();
    let (status, _) = put_request(Caller::User(ALICE), "/settings", r#"{"isOpen":false}"#, configure(store)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        put_request(Caller::Anonymous, "/settings", r#"{"isOpen":false}"#, configure(MockStore::new())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn admin_closes_the_store() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_update_settings().times(1).returning(|update| {
        assert_eq!(update.is_open, Some(false));
        assert_eq!(update.pickup_times, None);
        Ok(StoreSettings {
            is_open: false,
            closed_message: update.closed_message.unwrap_or_default(),
            ..Default::default()
        })
    });
    let body = r#"{"isOpen":false,"closedMessage":"Back on Monday"}"#;
    let (status, body) = put_request(Caller::Admin(BOB), "/settings", body, configure(store)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let settings: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(settings["isOpen"], false);
    assert_eq!(settings["closedMessage"], "Back on Monday");
}

#[actix_web::test]
async fn malformed_pickup_times_are_rejected() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_update_settings().never();
    let body = r#"{"pickupTimes":["10:00","9am"]}"#;
    let (status, body) = put_request(Caller::Admin(BOB), "/settings", body, configure(store)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("9am"), "{body}");
}

#[actix_web::test]
async fn blocked_dates_are_listed() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_or_create_settings().returning(|| {
        let blocked = vec![chrono::NaiveDate::from_ymd_opt(2024, 12, 25).unwrap()];
        Ok(StoreSettings { blocked_dates: Json(blocked), ..Default::default() })
    });
    let (_, body) = get_request(Caller::User(ALICE), "/settings", configure(store)).await;
    let settings: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(settings["blockedDates"][0], "2024-12-25");
}
