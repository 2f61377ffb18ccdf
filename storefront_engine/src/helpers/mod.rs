//! Pure functions that turn raw client and relay input into the values the engine works with.
mod amount;
mod phone;
mod sms_extractor;

pub use amount::{compute_amount, MAXIMUM_CHARGE, MINIMUM_CHARGE};
pub use phone::{normalize_phone, CanonicalPhone, PhoneFormatError};
pub use sms_extractor::{extract_transaction, is_payment_received_notification, SmsTransaction};
