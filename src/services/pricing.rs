//! Order pricing. Pure functions: same inputs always produce the same
//! breakdown, which keeps totals reproducible in tests and recomputable
//! during support audits.

use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::coupons::CouponSnapshot;
use crate::entities::coupon::DiscountKind;

/// One order line as priced at checkout: the unit price is whatever the
/// cart captured when the item was added, never the current product price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingBreakdown {
    pub line_totals: Vec<Decimal>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Computes the order total from its lines and an optional coupon snapshot.
///
/// The discount applies to the subtotal as a whole (the coupon lives on the
/// order, not on individual items) and can never push the total below zero.
pub fn price_order(
    lines: &[PricedLine],
    coupon: Option<&CouponSnapshot>,
) -> Result<PricingBreakdown, ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError(
            "order must contain at least one item".into(),
        ));
    }

    let mut line_totals = Vec::with_capacity(lines.len());
    let mut subtotal = Decimal::ZERO;

    for line in lines {
        if line.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
        if line.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "unit price for product {} must not be negative",
                line.product_id
            )));
        }
        let line_total = line.unit_price * Decimal::from(line.quantity);
        subtotal += line_total;
        line_totals.push(line_total);
    }

    let discount = match coupon {
        Some(snapshot) => discount_amount(snapshot, subtotal),
        None => Decimal::ZERO,
    };

    Ok(PricingBreakdown {
        line_totals,
        subtotal,
        discount,
        total: subtotal - discount,
    })
}

/// Discount a snapshot yields against a subtotal, rounded to minor units
/// and clamped to `0..=subtotal`.
pub fn discount_amount(snapshot: &CouponSnapshot, subtotal: Decimal) -> Decimal {
    let raw = match snapshot.discount_kind {
        DiscountKind::Percent => subtotal * snapshot.discount_value / Decimal::from(100),
        DiscountKind::Fixed => snapshot.discount_value,
    };

    raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .clamp(Decimal::ZERO, subtotal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: i32, unit_price: Decimal) -> PricedLine {
        PricedLine {
            product_id: Uuid::new_v4(),
            quantity,
            unit_price,
        }
    }

    fn percent(value: Decimal) -> CouponSnapshot {
        CouponSnapshot {
            code: "TEST".into(),
            discount_kind: DiscountKind::Percent,
            discount_value: value,
        }
    }

    fn fixed(value: Decimal) -> CouponSnapshot {
        CouponSnapshot {
            code: "TEST".into(),
            discount_kind: DiscountKind::Fixed,
            discount_value: value,
        }
    }

    #[test]
    fn totals_sum_line_items() {
        let breakdown =
            price_order(&[line(2, dec!(25.00)), line(1, dec!(35.00))], None).unwrap();
        assert_eq!(breakdown.line_totals, vec![dec!(50.00), dec!(35.00)]);
        assert_eq!(breakdown.subtotal, dec!(85.00));
        assert_eq!(breakdown.discount, dec!(0));
        assert_eq!(breakdown.total, dec!(85.00));
    }

    #[test]
    fn percent_discount_applies_to_subtotal() {
        let breakdown =
            price_order(&[line(2, dec!(40.00))], Some(&percent(dec!(10)))).unwrap();
        assert_eq!(breakdown.discount, dec!(8.00));
        assert_eq!(breakdown.total, dec!(72.00));
    }

    #[test]
    fn percent_discount_rounds_to_minor_units() {
        // 10% of 33.33 = 3.333 -> 3.33
        let breakdown =
            price_order(&[line(1, dec!(33.33))], Some(&percent(dec!(10)))).unwrap();
        assert_eq!(breakdown.discount, dec!(3.33));
        assert_eq!(breakdown.total, dec!(30.00));
    }

    #[test]
    fn fixed_discount_is_clamped_to_subtotal() {
        let breakdown =
            price_order(&[line(1, dec!(15.00))], Some(&fixed(dec!(20.00)))).unwrap();
        assert_eq!(breakdown.discount, dec!(15.00));
        assert_eq!(breakdown.total, dec!(0.00));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let err = price_order(&[line(0, dec!(10.00))], None).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn empty_cart_is_rejected() {
        assert!(price_order(&[], None).is_err());
    }

    #[test]
    fn pricing_is_deterministic() {
        let lines = vec![line(3, dec!(19.99)), line(1, dec!(5.01))];
        let coupon = percent(dec!(12.5));
        let a = price_order(&lines, Some(&coupon)).unwrap();
        let b = price_order(&lines, Some(&coupon)).unwrap();
        assert_eq!(a, b);
    }
}
