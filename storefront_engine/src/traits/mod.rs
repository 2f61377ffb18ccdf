//! # Backend and integration contracts
//!
//! The engine is storage- and provider-agnostic. This module defines the behaviour that a storage backend and a
//! payment gateway integration must provide in order to drive the checkout and reconciliation flows.
//!
//! * [`OrderLedger`] is the persistent record of purchase attempts. It is the only shared mutable resource in the
//!   reconciliation core, and every terminal transition goes through [`OrderLedger::settle_order`], which must be an
//!   atomic compare-and-set on the order status.
//! * [`CatalogManagement`], [`CartManagement`], [`CouponManagement`] and [`SettingsManagement`] expose the parts of the
//!   wider storefront that checkout and reconciliation consume.
//! * [`StoreBackend`] bundles all of the above and is implemented automatically.
//! * [`PaymentGateway`] is the seam to the mobile-money provider.
mod order_ledger;
mod payment_gateway;
mod store_management;

mod data_objects;

pub use data_objects::{CorrelationKeys, Settlement, TransitionOutcome};
pub use order_ledger::{LedgerError, OrderLedger};
pub use payment_gateway::{GatewayError, GatewayPaymentStatus, PaymentGateway, PushPaymentAccepted, PushPaymentRequest};
pub use store_management::{CartManagement, CatalogManagement, CouponManagement, SettingsManagement, StoreBackend};
