use std::fmt::Debug;

use chrono::Utc;
use log::*;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Coupon, NewCoupon},
    sfe_api::{checkout_objects::LoyaltyPolicy, errors::CouponError},
    traits::{CouponManagement, LedgerError},
};

const COUPON_PREFIX: &str = "GIFT";
const COUPON_SUFFIX_LEN: usize = 6;

/// What a shopper sees when they apply a coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponSummary {
    pub code: String,
    pub discount_percentage: i64,
}

impl From<&Coupon> for CouponSummary {
    fn from(c: &Coupon) -> Self {
        Self { code: c.code.clone(), discount_percentage: c.discount_percentage }
    }
}

pub struct CouponApi<B> {
    db: B,
}

impl<B> Debug for CouponApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CouponApi")
    }
}

impl<B> CouponApi<B>
where B: CouponManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Checks that `code` belongs to the user and can still be redeemed.
    pub async fn validate_coupon(&self, code: &str, user_id: &str) -> Result<CouponSummary, CouponError> {
        let coupon = self.db.fetch_coupon_by_code(code.trim()).await?.ok_or(CouponError::NotFound)?;
        if coupon.user_id != user_id || !coupon.is_redeemable(Utc::now()) {
            debug!("🎟️ Coupon {code} is not redeemable by {user_id}");
            return Err(CouponError::NotFound);
        }
        Ok(CouponSummary::from(&coupon))
    }

    /// The user's current coupon, if any
    pub async fn my_coupon(&self, user_id: &str) -> Result<Option<Coupon>, CouponError> {
        let coupon = self.db.fetch_active_coupon_for_user(user_id).await?;
        Ok(coupon)
    }

    pub async fn issue_loyalty_coupon(&self, user_id: &str, policy: &LoyaltyPolicy) -> Result<Coupon, CouponError> {
        let coupon = issue_loyalty_coupon(&self.db, user_id, policy).await?;
        Ok(coupon)
    }
}

/// Issues a fresh loyalty coupon to the user, replacing whatever unused coupon they held.
pub async fn issue_loyalty_coupon<B: CouponManagement>(
    db: &B,
    user_id: &str,
    policy: &LoyaltyPolicy,
) -> Result<Coupon, LedgerError> {
    let validity = chrono::Duration::from_std(policy.validity)
        .map_err(|e| LedgerError::InvalidValue { field: "loyalty validity".into(), reason: e.to_string() })?;
    let coupon = NewCoupon {
        code: generate_coupon_code(),
        user_id: user_id.to_string(),
        discount_percentage: policy.discount_percentage,
        expires_at: Utc::now() + validity,
    };
    let coupon = db.replace_coupon_for_user(coupon).await?;
    info!("🎟️ Issued loyalty coupon {} ({}% off) to {user_id}", coupon.code, coupon.discount_percentage);
    Ok(coupon)
}

/// `GIFT` followed by six upper-case alphanumerics
pub fn generate_coupon_code() -> String {
    let suffix = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(COUPON_SUFFIX_LEN)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect::<String>();
    format!("{COUPON_PREFIX}{suffix}")
}
