//! # Storefront engine public API
//!
//! The `sfe_api` module exposes the programmatic API of the storefront engine. Each API is a thin struct over a
//! storage backend (and, where needed, a payment gateway) that implements the traits in [`crate::traits`].
//!
//! * [`checkout_api`] validates a checkout, requests the push payment and records the pending order.
//! * [`reconciliation_api`] matches confirmation signals (gateway callbacks, SMS notifications and client polls) to
//!   pending orders and settles them exactly once.
//! * [`settings_api`] is the gate that decides whether the store takes orders for a given pickup slot.
//! * [`coupon_api`] validates and issues discount coupons.
//! * [`order_query_api`] answers order status queries and performs administrative status changes.
//!
//! # API usage
//!
//! ```rust,ignore
//! use storefront_engine::{ReconciliationApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = ReconciliationApi::new(db, gateway, producers);
//! let result = api.poll_payment("TXN-7781").await?;
//! ```
pub mod checkout_api;
pub mod checkout_objects;
pub mod coupon_api;
pub mod errors;
pub mod order_objects;
pub mod order_query_api;
pub mod payment_objects;
pub mod reconciliation_api;
pub mod settings_api;
