use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const KES_CURRENCY_CODE: &str = "KES";

//--------------------------------------        Kes          ---------------------------------------------------------
/// An amount of Kenyan shillings, held as an integer number of cents.
///
/// Mobile-money requests only accept whole shillings, but catalog prices and SMS notifications carry cents, so the
/// finer unit is kept internally and [`Kes::round_to_shilling`] is applied wherever a chargeable amount is produced.
///
/// On the wire, whole amounts serialize as integers (`500`) and fractional amounts as decimals (`12.5`).
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash)]
#[sqlx(transparent)]
pub struct Kes(i64);

op!(binary Kes, Add, add);
op!(binary Kes, Sub, sub);
op!(inplace Kes, AddAssign, add_assign);
op!(inplace Kes, SubAssign, sub_assign);
op!(unary Kes, Neg, neg);

/// Saturates at the numeric bounds instead of wrapping.
impl Sum for Kes {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, v| Self(acc.0.saturating_add(v.0)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented in shillings: {0}")]
pub struct KesConversionError(String);

impl Kes {
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Saturates for amounts beyond the representable range. Use [`Kes::checked_from_shillings`] for untrusted input.
    pub const fn from_shillings(shillings: i64) -> Self {
        Self(shillings.saturating_mul(100))
    }

    pub fn checked_from_shillings(shillings: i64) -> Result<Self, KesConversionError> {
        shillings
            .checked_mul(100)
            .map(Self)
            .ok_or_else(|| KesConversionError(format!("{shillings} shillings is too large")))
    }

    /// `self * rhs`, or `None` on overflow
    pub fn checked_mul(&self, rhs: i64) -> Option<Self> {
        self.0.checked_mul(rhs).map(Self)
    }

    pub fn checked_add(&self, rhs: Kes) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn saturating_mul(&self, rhs: i64) -> Self {
        Self(self.0.saturating_mul(rhs))
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    /// The whole-shilling part of the amount. Fractions are truncated; call [`Kes::round_to_shilling`] first if you
    /// need rounding.
    pub fn shillings(&self) -> i64 {
        self.0 / 100
    }

    pub fn is_whole_shillings(&self) -> bool {
        self.0 % 100 == 0
    }

    /// Rounds to the nearest whole shilling, with halves rounding away from zero.
    pub fn round_to_shilling(&self) -> Self {
        Self(round_div(self.0, 100).saturating_mul(100))
    }

    /// Returns `percent`% of this amount, rounded to the nearest whole shilling.
    pub fn percentage(&self, percent: i64) -> Self {
        Self(round_div(self.0.saturating_mul(percent), 100 * 100).saturating_mul(100))
    }

    /// The absolute difference between two amounts
    pub fn abs_diff(&self, other: Kes) -> Kes {
        Self(self.0.saturating_sub(other.0).saturating_abs())
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

fn round_div(numerator: i64, denominator: i64) -> i64 {
    let half = denominator / 2;
    if numerator >= 0 {
        numerator.saturating_add(half) / denominator
    } else {
        numerator.saturating_sub(half) / denominator
    }
}

impl From<i64> for Kes {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl Display for Kes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = (abs / 100).to_string();
        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, c) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        write!(f, "{sign}Ksh{grouped}.{:02}", abs % 100)
    }
}

/// Parses amounts as they appear in payment notifications, e.g. `1,500.00`, `1500` or `12.5`. Thousands separators
/// are ignored. At most two decimal places are accepted.
impl FromStr for Kes {
    type Err = KesConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s.trim().replace(',', "");
        let (negative, digits) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, cleaned.as_str()),
        };
        let (whole, fraction) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        let is_digits = |v: &str| v.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !is_digits(whole) || !is_digits(fraction) || fraction.len() > 2 {
            return Err(KesConversionError(s.to_string()));
        }
        let whole = whole.parse::<i64>().map_err(|e| KesConversionError(format!("{s}: {e}")))?;
        let fraction = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map(|v| v * 10).map_err(|e| KesConversionError(format!("{s}: {e}")))?,
            _ => fraction.parse::<i64>().map_err(|e| KesConversionError(format!("{s}: {e}")))?,
        };
        let cents = whole
            .checked_mul(100)
            .and_then(|v| v.checked_add(fraction))
            .ok_or_else(|| KesConversionError(format!("{s} is too large")))?;
        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl Serialize for Kes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_whole_shillings() {
            serializer.serialize_i64(self.shillings())
        } else {
            serializer.serialize_f64(self.as_f64())
        }
    }
}

impl<'de> Deserialize<'de> for Kes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawAmount {
            Whole(i64),
            Fractional(f64),
            Text(String),
        }
        match RawAmount::deserialize(deserializer)? {
            RawAmount::Whole(v) => Kes::checked_from_shillings(v).map_err(serde::de::Error::custom),
            RawAmount::Fractional(v) => {
                let cents = (v * 100.0).round();
                // i64::MAX as f64 rounds up, so the upper bound must be exclusive
                if cents.is_finite() && cents >= i64::MIN as f64 && cents < i64::MAX as f64 {
                    Ok(Kes(cents as i64))
                } else {
                    Err(serde::de::Error::custom(format!("{v} is not a valid amount")))
                }
            },
            RawAmount::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
