//! Property-based checks for the pricing calculator.

use bazaar_core::entities::coupon::DiscountKind;
use bazaar_core::services::coupons::CouponSnapshot;
use bazaar_core::services::pricing::{price_order, PricedLine};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

fn arb_line() -> impl Strategy<Value = PricedLine> {
    (1..=20i32, 0i64..=500_000).prop_map(|(quantity, cents)| PricedLine {
        product_id: Uuid::new_v4(),
        quantity,
        unit_price: Decimal::new(cents, 2),
    })
}

fn arb_coupon() -> impl Strategy<Value = CouponSnapshot> {
    prop_oneof![
        (1i64..=10_000).prop_map(|basis_points| CouponSnapshot {
            code: "PROP".into(),
            discount_kind: DiscountKind::Percent,
            discount_value: Decimal::new(basis_points, 2),
        }),
        (1i64..=100_000).prop_map(|cents| CouponSnapshot {
            code: "PROP".into(),
            discount_kind: DiscountKind::Fixed,
            discount_value: Decimal::new(cents, 2),
        }),
    ]
}

proptest! {
    #[test]
    fn total_is_subtotal_minus_discount(
        lines in prop::collection::vec(arb_line(), 1..8),
        coupon in prop::option::of(arb_coupon()),
    ) {
        let breakdown = price_order(&lines, coupon.as_ref()).unwrap();
        prop_assert_eq!(breakdown.total, breakdown.subtotal - breakdown.discount);
    }

    #[test]
    fn discount_stays_within_bounds(
        lines in prop::collection::vec(arb_line(), 1..8),
        coupon in arb_coupon(),
    ) {
        let breakdown = price_order(&lines, Some(&coupon)).unwrap();
        prop_assert!(breakdown.discount >= Decimal::ZERO);
        prop_assert!(breakdown.discount <= breakdown.subtotal);
        prop_assert!(breakdown.total >= Decimal::ZERO);
    }

    #[test]
    fn line_totals_sum_to_the_subtotal(
        lines in prop::collection::vec(arb_line(), 1..8),
    ) {
        let breakdown = price_order(&lines, None).unwrap();
        let summed: Decimal = breakdown.line_totals.iter().copied().sum();
        prop_assert_eq!(breakdown.subtotal, summed);
        prop_assert_eq!(breakdown.line_totals.len(), lines.len());
    }

    #[test]
    fn pricing_is_a_pure_function(
        lines in prop::collection::vec(arb_line(), 1..8),
        coupon in prop::option::of(arb_coupon()),
    ) {
        let first = price_order(&lines, coupon.as_ref()).unwrap();
        let second = price_order(&lines, coupon.as_ref()).unwrap();
        prop_assert_eq!(first, second);
    }
}
