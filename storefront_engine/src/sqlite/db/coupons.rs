use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{Coupon, NewCoupon};

pub async fn fetch_coupon_by_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<Coupon>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM coupons WHERE code = $1").bind(code).fetch_optional(conn).await
}

/// The most recently issued coupon for the user that is active and has not expired.
pub async fn fetch_active_coupon_for_user(
    user_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Coupon>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM coupons WHERE user_id = $1 AND is_active = TRUE AND expires_at > $2 ORDER BY created_at DESC, id \
         DESC LIMIT 1",
    )
    .bind(user_id)
    .bind(now)
    .fetch_optional(conn)
    .await
}

/// Removes every active coupon the user holds. Used coupons are kept for the record.
pub async fn delete_active_coupons_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM coupons WHERE user_id = $1 AND is_active = TRUE").bind(user_id).execute(conn).await?;
    Ok(result.rows_affected())
}

pub async fn insert_coupon(coupon: NewCoupon, conn: &mut SqliteConnection) -> Result<Coupon, sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO coupons (code, user_id, discount_percentage, expires_at, is_active, created_at)
        VALUES ($1, $2, $3, $4, TRUE, $5)
        RETURNING *"#,
    )
    .bind(coupon.code)
    .bind(coupon.user_id)
    .bind(coupon.discount_percentage)
    .bind(coupon.expires_at)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
}

/// Marks the coupon as used. Returns `false` if the coupon was not active.
pub async fn deactivate_coupon(code: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE coupons SET is_active = FALSE WHERE code = $1 AND is_active = TRUE")
        .bind(code)
        .execute(conn)
        .await?;
    let deactivated = result.rows_affected() > 0;
    debug!("🎟️ Coupon {code} deactivated: {deactivated}");
    Ok(deactivated)
}
