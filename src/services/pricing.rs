//! Pure pricing arithmetic for an order joined with its reference data.
//!
//! Everything here is a function of its inputs; no clock, no database. The
//! order service feeds it snapshotted prices at finalize/review time and the
//! coupon service reuses the gross total for eligibility checks.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::entities::coupon::DiscountType;

/// Fixed advance charged at booking; the payable total never drops below it.
pub const ADVANCE_AMOUNT: Decimal = dec!(500);

/// Rounds a weight to the nearest 0.5 kg, midpoint away from zero.
pub fn round_to_half(value: Decimal) -> Decimal {
    (value * dec!(2)).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) / dec!(2)
}

/// Estimated weight range for a clothes count: 0.4-0.7 kg per piece.
pub fn estimate_weight_range(clothes_count: i32) -> (Decimal, Decimal) {
    let count = Decimal::from(clothes_count);
    (
        round_to_half(count * dec!(0.4)),
        round_to_half(count * dec!(0.7)),
    )
}

/// Coupon terms relevant to discount computation.
#[derive(Debug, Clone)]
pub struct CouponTerms {
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_amount_value: Decimal,
}

/// Everything the calculator needs, already joined by the caller.
#[derive(Debug, Clone)]
pub struct PricingInputs {
    pub estimated_weight_min: Decimal,
    pub estimated_weight_max: Decimal,
    pub base_price_per_kg: Decimal,
    pub extra_price_per_kg: Decimal,
    pub flat_fee: Decimal,
    pub pickup_is_peak: bool,
    pub peak_extra_charge: Decimal,
    pub coupon: Option<CouponTerms>,
}

/// Full breakdown with every intermediate value, in exact decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub avg_weight: Decimal,
    pub service_charge: Decimal,
    pub type_extra: Decimal,
    pub flat_fee: Decimal,
    pub peak_charge: Decimal,
    pub gross_total: Decimal,
    /// May be negative when the floor lifts a sub-500 total up to 500.
    pub discount: Decimal,
    pub final_total: Decimal,
    pub advance_payment: Decimal,
    pub remaining_payment: Decimal,
}

/// Rendering of a breakdown with two-decimal strings for the API boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBreakdownDisplay {
    pub service_charge: String,
    pub type_extra: String,
    pub flat_fee: String,
    pub peak_charge: String,
    pub discount: String,
    pub advance_payment: String,
    pub remaining_payment: String,
    pub total_payable_now: String,
    pub approx_total: String,
}

fn money(value: Decimal) -> String {
    format!(
        "{:.2}",
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

impl PriceBreakdown {
    pub fn display(&self) -> PriceBreakdownDisplay {
        PriceBreakdownDisplay {
            service_charge: money(self.service_charge),
            type_extra: money(self.type_extra),
            flat_fee: money(self.flat_fee),
            peak_charge: money(self.peak_charge),
            discount: money(self.discount),
            advance_payment: money(self.advance_payment),
            // Never displayed negative.
            remaining_payment: money(self.remaining_payment.max(Decimal::ZERO)),
            total_payable_now: money(self.advance_payment),
            approx_total: money(self.final_total),
        }
    }
}

/// Computes the price breakdown for an order.
///
/// Discount rules: a coupon only counts when the gross total clears its
/// minimum amount. A flat discount is intentionally not capped to the gross
/// total before the floor; the 500 floor then recomputes the discount as
/// `gross - 500` so the payable amount never drops below the advance.
pub fn compute(inputs: &PricingInputs) -> PriceBreakdown {
    let avg_weight = (inputs.estimated_weight_min + inputs.estimated_weight_max) / dec!(2);

    let service_charge = avg_weight * inputs.base_price_per_kg;
    let type_extra = avg_weight * inputs.extra_price_per_kg;
    let flat_fee = inputs.flat_fee;
    let peak_charge = if inputs.pickup_is_peak {
        inputs.peak_extra_charge
    } else {
        Decimal::ZERO
    };

    let gross_total = service_charge + type_extra + flat_fee + peak_charge;

    let mut discount = Decimal::ZERO;
    if let Some(coupon) = &inputs.coupon {
        if gross_total >= coupon.minimum_amount_value {
            discount = match coupon.discount_type {
                DiscountType::Percentage => gross_total * coupon.discount_value / dec!(100),
                DiscountType::Flat => coupon.discount_value,
            };
        }
    }

    let mut final_total = gross_total - discount;
    if final_total < ADVANCE_AMOUNT {
        discount = gross_total - ADVANCE_AMOUNT;
        final_total = ADVANCE_AMOUNT;
    }

    let advance_payment = ADVANCE_AMOUNT.min(final_total);
    let remaining_payment = final_total - advance_payment;

    PriceBreakdown {
        avg_weight,
        service_charge,
        type_extra,
        flat_fee,
        peak_charge,
        gross_total,
        discount,
        final_total,
        advance_payment,
        remaining_payment,
    }
}
