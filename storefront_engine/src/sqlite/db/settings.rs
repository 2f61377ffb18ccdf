use chrono::Utc;
use sqlx::{types::Json, SqliteConnection};

use crate::db_types::{SettingsUpdate, StoreSettings};

const SETTINGS_COLUMNS: &str = "is_open, closed_message, blocked_dates, pickup_times, max_booking_days, updated_at";

/// Returns the settings record, creating it with the column defaults if it does not exist.
pub async fn fetch_or_create_settings(conn: &mut SqliteConnection) -> Result<StoreSettings, sqlx::Error> {
    sqlx::query("INSERT INTO store_settings (id, updated_at) VALUES (1, $1) ON CONFLICT (id) DO NOTHING")
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    sqlx::query_as(&format!("SELECT {SETTINGS_COLUMNS} FROM store_settings WHERE id = 1")).fetch_one(conn).await
}

/// Applies the non-empty fields of the update. The record must already exist.
pub async fn update_settings(update: SettingsUpdate, conn: &mut SqliteConnection) -> Result<StoreSettings, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"
        UPDATE store_settings SET
            is_open = COALESCE($1, is_open),
            closed_message = COALESCE($2, closed_message),
            blocked_dates = COALESCE($3, blocked_dates),
            pickup_times = COALESCE($4, pickup_times),
            max_booking_days = COALESCE($5, max_booking_days),
            updated_at = $6
        WHERE id = 1
        RETURNING {SETTINGS_COLUMNS}"#
    ))
    .bind(update.is_open)
    .bind(update.closed_message)
    .bind(update.blocked_dates.map(Json))
    .bind(update.pickup_times.map(Json))
    .bind(update.max_booking_days)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
}
