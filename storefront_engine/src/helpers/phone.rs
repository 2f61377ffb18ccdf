use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const COUNTRY_CODE: &str = "254";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid phone number format: '{0}'. Use 07xxxxxxxx, 01xxxxxxxx or +2547xxxxxxxx")]
pub struct PhoneFormatError(pub String);

/// A mobile number in its local 10-digit form, e.g. `0712345678`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalPhone(String);

impl CanonicalPhone {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The number with the country calling code and without the trunk prefix, e.g. `254712345678`.
    pub fn international(&self) -> String {
        format!("{COUNTRY_CODE}{}", &self.0[1..])
    }
}

impl Display for CanonicalPhone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Converts user-entered phone numbers to their canonical local form.
///
/// All non-digit characters are discarded first. Exactly four shapes are accepted:
/// * `07xxxxxxxx` / `01xxxxxxxx` (kept as is)
/// * `7xxxxxxxx` / `1xxxxxxxx` (trunk prefix missing)
/// * `254xxxxxxxxx`
/// * `0254xxxxxxxxx`
///
/// Anything else is rejected.
pub fn normalize_phone(raw: &str) -> Result<CanonicalPhone, PhoneFormatError> {
    let digits = raw.chars().filter(char::is_ascii_digit).collect::<String>();
    let local = match digits.len() {
        10 if digits.starts_with("07") || digits.starts_with("01") => digits,
        9 if digits.starts_with('7') || digits.starts_with('1') => format!("0{digits}"),
        12 if digits.starts_with(COUNTRY_CODE) => format!("0{}", &digits[3..]),
        13 if digits.starts_with("0254") => format!("0{}", &digits[4..]),
        _ => return Err(PhoneFormatError(raw.to_string())),
    };
    // The international forms must still carry a mobile prefix once the country code is removed
    if local.starts_with("07") || local.starts_with("01") {
        Ok(CanonicalPhone(local))
    } else {
        Err(PhoneFormatError(raw.to_string()))
    }
}
