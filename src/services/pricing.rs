//! Price combination: per-service base prices, adjustment application,
//! minimum-charge floor, and increment rounding.
//!
//! All money arithmetic uses `rust_decimal::Decimal`. Results are compared
//! against a floor and rounded to an increment, so binary floating point is
//! not acceptable here.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{Adjustment, PerServicePrice, ServiceItem};

/// Area unit base rates are quoted against (rate per 1,000 sqft).
const AREA_UNIT_SQFT: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBreakdown {
    pub per_service: Vec<PerServicePrice>,
    /// Sum of unadjusted per-service prices
    pub base_total: Decimal,
    /// Sum of adjusted per-service prices, before the floor
    pub adjusted_total: Decimal,
    /// Floored and rounded price the customer pays
    pub final_price: Decimal,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceCalculator;

impl PriceCalculator {
    /// Combine base rate, service items, and the matched zone's adjustment
    /// into a final price. Identical inputs produce identical output.
    pub fn compute(
        &self,
        base_rate_per_unit: Decimal,
        items: &[ServiceItem],
        zone_adjustment: &Adjustment,
        minimum_charge: Decimal,
        round_to: Decimal,
    ) -> PriceBreakdown {
        let mut per_service = Vec::with_capacity(items.len());
        let mut base_total = Decimal::ZERO;
        let mut adjusted_total = Decimal::ZERO;

        for item in items {
            let rate = item.rate_override.unwrap_or(base_rate_per_unit);
            let base_price = item.area_sqft / AREA_UNIT_SQFT * rate;

            // Service-specific adjustment composes first, zone second.
            let mut adjusted = match &item.adjustment_override {
                Some(service_adjustment) => service_adjustment.apply(base_price),
                None => base_price,
            };
            adjusted = zone_adjustment.apply(adjusted);

            base_total += base_price;
            adjusted_total += adjusted;
            per_service.push(PerServicePrice {
                service_type: item.service_type.clone(),
                area_sqft: item.area_sqft,
                base_price,
                adjusted_price: adjusted,
            });
        }

        let floored = adjusted_total.max(minimum_charge);
        let mut final_price = round_to_increment(floored, round_to);
        // Half-up rounding of the floor itself may land just below the
        // minimum; bump to the next increment so the floor invariant holds.
        if final_price < minimum_charge && round_to > Decimal::ZERO {
            final_price = ((minimum_charge / round_to)
                .round_dp_with_strategy(0, RoundingStrategy::ToPositiveInfinity)
                * round_to)
                .normalize();
        }

        PriceBreakdown {
            per_service,
            base_total,
            adjusted_total,
            final_price,
        }
    }
}

/// Round half-up to a configured increment (0.01, 1.00, ...). A non-positive
/// increment leaves the value untouched.
fn round_to_increment(value: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return value;
    }
    let steps =
        (value / increment).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    (steps * increment).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal_macros::dec;

    fn lawn(area: Decimal) -> ServiceItem {
        ServiceItem {
            service_type: "lawn_treatment".into(),
            area_sqft: area,
            rate_override: None,
            adjustment_override: None,
        }
    }

    #[test]
    fn close_zone_discount_scenario() {
        // $20 per 1,000 sqft, 5,000 sqft lawn, close-zone -5%
        let breakdown = PriceCalculator.compute(
            dec!(20),
            &[lawn(dec!(5000))],
            &Adjustment::Percentage(dec!(-5)),
            dec!(50),
            dec!(0.01),
        );
        assert_eq!(breakdown.base_total, dec!(100));
        assert_eq!(breakdown.adjusted_total, dec!(95.00));
        assert_eq!(breakdown.final_price, dec!(95));
    }

    #[test]
    fn extended_zone_surcharge_scenario() {
        let breakdown = PriceCalculator.compute(
            dec!(20),
            &[lawn(dec!(5000))],
            &Adjustment::Percentage(dec!(10)),
            dec!(50),
            dec!(0.01),
        );
        assert_eq!(breakdown.adjusted_total, dec!(110.00));
        assert_eq!(breakdown.final_price, dec!(110));
    }

    #[test]
    fn small_jobs_clamp_to_minimum_charge() {
        let breakdown = PriceCalculator.compute(
            dec!(20),
            &[lawn(dec!(1000))],
            &Adjustment::Percentage(dec!(-5)),
            dec!(50),
            dec!(0.01),
        );
        assert_eq!(breakdown.adjusted_total, dec!(19.00));
        assert_eq!(breakdown.final_price, dec!(50));
    }

    #[test]
    fn service_override_composes_before_zone_adjustment() {
        let item = ServiceItem {
            service_type: "aeration".into(),
            area_sqft: dec!(1000),
            rate_override: Some(dec!(100)),
            adjustment_override: Some(Adjustment::Fixed(dec!(10))),
        };
        // base 100 -> +10 fixed -> 110 -> +10% zone -> 121
        let breakdown = PriceCalculator.compute(
            dec!(20),
            &[item],
            &Adjustment::Percentage(dec!(10)),
            dec!(0),
            dec!(0.01),
        );
        assert_eq!(breakdown.per_service[0].adjusted_price, dec!(121.00));
    }

    #[test]
    fn multiplier_adjustment() {
        let breakdown = PriceCalculator.compute(
            dec!(20),
            &[lawn(dec!(5000))],
            &Adjustment::Multiplier(dec!(1.25)),
            dec!(0),
            dec!(0.01),
        );
        assert_eq!(breakdown.final_price, dec!(125));
    }

    #[rstest]
    #[case(dec!(95.005), dec!(0.01), dec!(95.01))]
    #[case(dec!(95.5), dec!(1), dec!(96))]
    #[case(dec!(95.49), dec!(1), dec!(95))]
    #[case(dec!(-95.5), dec!(1), dec!(-96))]
    // Non-positive increment leaves the value untouched
    #[case(dec!(95.005), dec!(0), dec!(95.005))]
    fn rounds_half_up_to_increment(
        #[case] value: Decimal,
        #[case] increment: Decimal,
        #[case] expected: Decimal,
    ) {
        assert_eq!(round_to_increment(value, increment), expected);
    }

    #[test]
    fn whole_dollar_rounding_respects_floor() {
        // adjusted below the minimum, and the floor itself needs no rounding
        let breakdown = PriceCalculator.compute(
            dec!(20),
            &[lawn(dec!(100))],
            &Adjustment::neutral(),
            dec!(49.50),
            dec!(1),
        );
        assert!(breakdown.final_price >= dec!(49.50));
    }

    #[test]
    fn identical_inputs_identical_output() {
        let items = [lawn(dec!(3333))];
        let adj = Adjustment::Percentage(dec!(7.5));
        let a = PriceCalculator.compute(dec!(21.37), &items, &adj, dec!(50), dec!(0.01));
        let b = PriceCalculator.compute(dec!(21.37), &items, &adj, dec!(50), dec!(0.01));
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn final_price_never_below_minimum_charge(
            area in 0.0f64..100_000.0,
            rate in 0.0f64..500.0,
            pct in -90.0f64..300.0,
            min in 0.0f64..200.0,
        ) {
            let breakdown = PriceCalculator.compute(
                Decimal::from_f64(rate).unwrap(),
                &[lawn(Decimal::from_f64(area).unwrap())],
                &Adjustment::Percentage(Decimal::from_f64(pct).unwrap()),
                Decimal::from_f64(min).unwrap(),
                dec!(0.01),
            );
            prop_assert!(breakdown.final_price >= Decimal::from_f64(min).unwrap());
        }
    }
}
