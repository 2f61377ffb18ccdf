//! The settings gate: whether, and for which pickup slots, the store accepts orders.
use std::fmt::Debug;

use chrono::{Duration, NaiveDate, NaiveTime};
use log::*;

use crate::{
    db_types::{SettingsUpdate, StoreSettings},
    sfe_api::errors::{PickupRejection, SettingsError},
    traits::SettingsManagement,
};

pub struct SettingsApi<B> {
    db: B,
}

impl<B> Debug for SettingsApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettingsApi")
    }
}

impl<B> SettingsApi<B>
where B: SettingsManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// The current settings. The defaults are stored on first access.
    pub async fn fetch_settings(&self) -> Result<StoreSettings, SettingsError> {
        let settings = self.db.fetch_or_create_settings().await?;
        Ok(settings)
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<StoreSettings, SettingsError> {
        validate_update(&update)?;
        let settings = self.db.update_settings(update).await?;
        info!("🛒️ Store settings updated. Open: {}", settings.is_open);
        Ok(settings)
    }

    /// True if the store is open and takes pickups on `date`.
    pub async fn is_checkout_allowed(&self, date: NaiveDate, today: NaiveDate) -> Result<bool, SettingsError> {
        let settings = self.fetch_settings().await?;
        Ok(check_date(&settings, date, today).is_ok())
    }

    /// Checks a requested pickup slot against the current settings.
    ///
    /// The outer `Result` is a storage failure; the inner one is the verdict.
    pub async fn validate_pickup(
        &self,
        date: NaiveDate,
        time: &str,
        today: NaiveDate,
    ) -> Result<Result<(), PickupRejection>, SettingsError> {
        let settings = self.fetch_settings().await?;
        Ok(validate_pickup(&settings, date, time, today))
    }
}

/// Checks a pickup slot against the given settings. The checks run in order: store open, date not in the past, date
/// within the booking horizon, date not blocked, and time one of the offered pickup times.
pub fn validate_pickup(
    settings: &StoreSettings,
    date: NaiveDate,
    time: &str,
    today: NaiveDate,
) -> Result<(), PickupRejection> {
    check_date(settings, date, today)?;
    let time = time.trim();
    if !settings.pickup_times.0.iter().any(|t| t == time) {
        return Err(PickupRejection::TimeNotAvailable(time.to_string()));
    }
    Ok(())
}

fn check_date(settings: &StoreSettings, date: NaiveDate, today: NaiveDate) -> Result<(), PickupRejection> {
    if !settings.is_open {
        return Err(PickupRejection::StoreClosed(settings.closed_message.clone()));
    }
    if date < today {
        return Err(PickupRejection::DateInPast(date));
    }
    if date > today + Duration::days(settings.max_booking_days) {
        return Err(PickupRejection::BeyondBookingHorizon { date, max_days: settings.max_booking_days });
    }
    if settings.blocked_dates.0.contains(&date) {
        return Err(PickupRejection::DateBlocked(date));
    }
    Ok(())
}

pub fn parse_pickup_date(s: &str) -> Result<NaiveDate, PickupRejection> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| PickupRejection::InvalidDate(s.to_string()))
}

fn validate_update(update: &SettingsUpdate) -> Result<(), SettingsError> {
    if let Some(times) = &update.pickup_times {
        for t in times {
            let valid = t.len() == 5 && NaiveTime::parse_from_str(t, "%H:%M").is_ok();
            if !valid {
                return Err(SettingsError::InvalidFormat(format!("'{t}' is not a valid pickup time. Use HH:MM")));
            }
        }
    }
    if let Some(days) = update.max_booking_days {
        if !(0..=365).contains(&days) {
            return Err(SettingsError::InvalidFormat(format!("maxBookingDays must be between 0 and 365, not {days}")));
        }
    }
    if let Some(msg) = &update.closed_message {
        if msg.trim().is_empty() {
            return Err(SettingsError::InvalidFormat("closedMessage cannot be empty".into()));
        }
    }
    Ok(())
}
