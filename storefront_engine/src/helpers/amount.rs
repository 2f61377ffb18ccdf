use storefront_common::Kes;

use crate::db_types::{Coupon, LineItem};

/// The gateway rejects zero-value push payments, so every charge is at least one shilling.
pub const MINIMUM_CHARGE: Kes = Kes::from_shillings(1);
/// The largest single push payment M-Pesa accepts
pub const MAXIMUM_CHARGE: Kes = Kes::from_shillings(250_000);

/// Calculates the amount to charge for the given line items.
///
/// The subtotal is `sum(unit_price * quantity)`. If a coupon is supplied, its percentage discount (rounded to whole
/// shillings) is subtracted. The result is rounded to the nearest whole shilling and is never less than
/// [`MINIMUM_CHARGE`]. Arithmetic saturates rather than wrapping, so an absurd cart can never come out cheap.
pub fn compute_amount(items: &[LineItem], coupon: Option<&Coupon>) -> Kes {
    let mut total = items.iter().map(LineItem::subtotal).sum::<Kes>();
    if let Some(coupon) = coupon {
        total -= total.percentage(coupon.discount_percentage);
    }
    total.round_to_shilling().max(MINIMUM_CHARGE)
}
