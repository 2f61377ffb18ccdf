//! Storefront Engine
//!
//! The payment reconciliation core of a storefront that is settled by mobile-money push payments. It is
//! provider-agnostic: the payment gateway and the storage backend are both traits.
//!
//! The library is divided into these sections:
//! 1. Storage ([`traits`] and, with the `sqlite` feature, [`SqliteDatabase`]). The order ledger is the only shared
//!    mutable state. The data types stored in it live in [`db_types`].
//! 2. The public API ([`sfe_api`]): checkout, reconciliation of confirmation signals, the settings gate, coupons and
//!    order queries.
//! 3. Pure input normalisation in [`helpers`]: amounts, phone numbers and payment-notification SMS extraction.
//!
//! The engine also publishes [`events`] when orders are created, paid or fail. Register hooks to react to them.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod sfe_api;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use sfe_api::{
    checkout_api::CheckoutApi,
    checkout_objects,
    coupon_api::CouponApi,
    errors::{CheckoutError, CouponError, OrderApiError, PickupRejection, ReconciliationError, SettingsError},
    order_objects,
    order_query_api::OrderQueryApi,
    payment_objects,
    reconciliation_api::{ReconciliationApi, ReconciliationOptions, WebhookOutcome},
    settings_api::SettingsApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
