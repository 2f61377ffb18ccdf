//! Extraction of structured transactions from mobile-money payment notifications.
//!
//! A typical notification looks like
//!
//! ```text
//! SAB1CD2EFG Confirmed. You have received Ksh1,500.00 from AIRTEL MONEY - Jane Doe 712345678 on 5/1/24 at 2:30 PM.
//! New M-PESA balance is Ksh3,000.00.
//! ```
//!
//! The transaction id and amount are mandatory. Every other field degrades gracefully: a missing sender leaves the name
//! and phone empty, and a missing or malformed date falls back to the time of extraction.
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use log::*;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use storefront_common::Kes;

const RECEIVED_MARKER: &str = "you have received";
const COUNTRY_CODE: &str = "254";
/// Notification timestamps are in East Africa Time
const NOTIFICATION_UTC_OFFSET_SECS: i32 = 3 * 3600;

static TRANSACTION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z0-9]+)\s+Confirmed").expect("transaction id pattern is valid"));
static AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"Ksh([\d,]+\.?\d*)").expect("amount pattern is valid"));
static SENDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)from\s+(?:AIRTEL\s+MONEY\s*-\s*)?([A-Za-z\s]+?)\s+(\d{9,12})\b").expect("sender pattern is valid")
});
static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)on\s+(\d{1,2})/(\d{1,2})/(\d{2,4})\s+at\s+(\d{1,2}):(\d{2})\s*([AP]M)")
        .expect("timestamp pattern is valid")
});
static BALANCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:New\s+(?:M-PESA|Acc)\s+balance|balance)\s+is\s+Ksh([\d,]+\.?\d*)")
        .expect("balance pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsTransaction {
    pub transaction_id: String,
    pub amount: Kes,
    /// The sender's full name, as it appears in the notification
    pub customer_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    /// The sender's number in international form, e.g. `254712345678`
    pub phone: Option<String>,
    pub transaction_time: DateTime<Utc>,
    /// The recipient's balance after the payment. Advisory only.
    pub balance: Option<Kes>,
}

/// True if the text is an incoming-payment notification, as opposed to an outgoing payment or balance notice.
pub fn is_payment_received_notification(text: &str) -> bool {
    text.to_lowercase().contains(RECEIVED_MARKER)
}

/// Extracts the transaction described by an incoming-payment notification.
///
/// Returns `None` if the text is not an incoming-payment notification, or if the transaction id or amount cannot be
/// found.
pub fn extract_transaction(text: &str) -> Option<SmsTransaction> {
    let text = text.trim();
    if !is_payment_received_notification(text) {
        trace!("📨️ Not a payment-received notification");
        return None;
    }
    let transaction_id = TRANSACTION_ID.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().to_string());
    let Some(transaction_id) = transaction_id else {
        debug!("📨️ No transaction id found in notification");
        return None;
    };
    let amount = AMOUNT.captures(text).and_then(|c| c.get(1)).and_then(|m| m.as_str().parse::<Kes>().ok());
    let Some(amount) = amount else {
        debug!("📨️ No amount found in notification {transaction_id}");
        return None;
    };
    let (customer_name, phone) = match SENDER.captures(text) {
        Some(caps) => {
            let name = caps.get(1).map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "));
            let phone = caps.get(2).map(|m| international_msisdn(m.as_str()));
            (name.filter(|n| !n.is_empty()), phone)
        },
        None => (None, None),
    };
    let (first_name, middle_name, last_name) = split_name(customer_name.as_deref());
    let transaction_time = extract_timestamp(text).unwrap_or_else(|| {
        debug!("📨️ No usable timestamp in notification {transaction_id}. Using the current time");
        Utc::now()
    });
    let balance = BALANCE.captures(text).and_then(|c| c.get(1)).and_then(|m| m.as_str().parse::<Kes>().ok());
    Some(SmsTransaction {
        transaction_id,
        amount,
        customer_name,
        first_name,
        middle_name,
        last_name,
        phone,
        transaction_time,
        balance,
    })
}

fn international_msisdn(digits: &str) -> String {
    match digits.len() {
        9 => format!("{COUNTRY_CODE}{digits}"),
        10 if digits.starts_with('0') => format!("{COUNTRY_CODE}{}", &digits[1..]),
        _ => digits.to_string(),
    }
}

fn split_name(name: Option<&str>) -> (Option<String>, Option<String>, Option<String>) {
    let parts = name.map(|n| n.split_whitespace().collect::<Vec<_>>()).unwrap_or_default();
    match parts.as_slice() {
        [] => (None, None, None),
        [first] => (Some(first.to_string()), None, None),
        [first, last] => (Some(first.to_string()), None, Some(last.to_string())),
        [first, middle @ .., last] => (Some(first.to_string()), Some(middle.join(" ")), Some(last.to_string())),
    }
}

fn extract_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let caps = TIMESTAMP.captures(text)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let day = num(1)?;
    let month = num(2)?;
    let mut year = num(3)? as i32;
    if year < 100 {
        year += 2000;
    }
    let hour = num(4)?;
    let minute = num(5)?;
    let pm = caps.get(6)?.as_str().eq_ignore_ascii_case("PM");
    let hour = match (pm, hour) {
        (true, h) if h != 12 => h + 12,
        (false, 12) => 0,
        (_, h) => h,
    };
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let offset = FixedOffset::east_opt(NOTIFICATION_UTC_OFFSET_SECS)?;
    offset.from_local_datetime(&NaiveDateTime::new(date, time)).single().map(|dt| dt.with_timezone(&Utc))
}
