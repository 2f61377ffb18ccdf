mod kes;

pub mod helpers;
pub mod op;
mod secret;

pub use kes::{Kes, KesConversionError, KES_CURRENCY_CODE};
pub use secret::Secret;
