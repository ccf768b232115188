//! Minimum-out / maximum-in guarantees
//!
//! Pure integer arithmetic on base units; results are floored. Tolerance
//! numerator and denominator must each fit in a `u32`.

use crate::trade::Trade;
use crate::types::{CurrencyAmount, Percent, TradeType};

/// Lowest output the user accepts for `trade` under `tolerance`.
///
/// ExactIn: `floor(out / (1 + tolerance))`. ExactOut: the output unchanged.
///
/// # Panics
///
/// A negative tolerance is a caller bug; slippage is validated upstream.
pub fn minimum_amount_out(trade: &Trade, tolerance: &Percent) -> CurrencyAmount {
    let (num, den) = unsigned_parts(tolerance);
    let out = trade.output_amount();
    match trade.trade_type() {
        TradeType::ExactOut => out.clone(),
        TradeType::ExactIn => {
            // den <= den + num, so the result never exceeds `out`
            let min_out = mul_div_floor(out.raw, den, den + num).unwrap_or(out.raw);
            CurrencyAmount::new(out.currency.clone(), min_out)
        }
    }
}

/// Highest input the user accepts for `trade` under `tolerance`.
///
/// ExactOut: `floor(in * (1 + tolerance))`, saturating at `u128::MAX`.
/// ExactIn: the input unchanged.
///
/// # Panics
///
/// A negative tolerance is a caller bug; slippage is validated upstream.
pub fn maximum_amount_in(trade: &Trade, tolerance: &Percent) -> CurrencyAmount {
    let (num, den) = unsigned_parts(tolerance);
    let input = trade.input_amount();
    match trade.trade_type() {
        TradeType::ExactIn => input.clone(),
        TradeType::ExactOut => {
            let max_in = mul_div_floor(input.raw, den + num, den).unwrap_or(u128::MAX);
            CurrencyAmount::new(input.currency.clone(), max_in)
        }
    }
}

fn unsigned_parts(tolerance: &Percent) -> (u128, u128) {
    assert!(
        !tolerance.is_negative(),
        "slippage tolerance must be non-negative, got {}/{}",
        tolerance.numerator,
        tolerance.denominator
    );
    let (num, den) = (
        tolerance.numerator.unsigned_abs(),
        tolerance.denominator.unsigned_abs(),
    );
    assert!(
        num <= u32::MAX as u128 && den <= u32::MAX as u128,
        "slippage tolerance out of range: {}/{}",
        tolerance.numerator,
        tolerance.denominator
    );
    (num, den)
}

/// `floor(a * b / c)`, or `None` when the result does not fit in a `u128`.
///
/// `b` and `c` stay below 2^33, so the remainder term `(a % c) * b` cannot
/// overflow; only the quotient term can.
fn mul_div_floor(a: u128, b: u128, c: u128) -> Option<u128> {
    match a.checked_mul(b) {
        Some(product) => Some(product / c),
        None => (a / c).checked_mul(b)?.checked_add((a % c) * b / c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;

    #[test]
    fn test_min_out_scenario_100_usdc_50_bips() {
        let trade = fixtures::evm_trade(TradeType::ExactIn, 100_000_000, 99_123_457);
        let min_out = minimum_amount_out(&trade, &Percent::from_bips(50));
        assert_eq!(min_out.raw, 99_123_457u128 * 10_000 / 10_050);
    }

    #[test]
    fn test_zero_tolerance_is_identity() {
        let trade = fixtures::evm_trade(TradeType::ExactIn, 1_000, 2_000);
        assert_eq!(minimum_amount_out(&trade, &Percent::from_bips(0)).raw, 2_000);

        let trade = fixtures::evm_trade(TradeType::ExactOut, 1_000, 2_000);
        assert_eq!(maximum_amount_in(&trade, &Percent::from_bips(0)).raw, 1_000);
    }

    #[test]
    fn test_unaffected_side_is_unchanged() {
        let exact_in = fixtures::evm_trade(TradeType::ExactIn, 1_000, 2_000);
        assert_eq!(maximum_amount_in(&exact_in, &Percent::from_bips(300)).raw, 1_000);

        let exact_out = fixtures::evm_trade(TradeType::ExactOut, 1_000, 2_000);
        assert_eq!(minimum_amount_out(&exact_out, &Percent::from_bips(300)).raw, 2_000);
    }

    #[test]
    fn test_max_in_exact_out() {
        let trade = fixtures::evm_trade(TradeType::ExactOut, 1_000_001, 5);
        // 1_000_001 * 1.01 = 1_010_001.01 -> floored
        assert_eq!(maximum_amount_in(&trade, &Percent::from_bips(100)).raw, 1_010_001);
    }

    #[test]
    #[should_panic(expected = "slippage tolerance must be non-negative")]
    fn test_negative_tolerance_panics() {
        let trade = fixtures::evm_trade(TradeType::ExactIn, 1_000, 2_000);
        let _ = minimum_amount_out(&trade, &Percent::from_bips(-1));
    }

    #[test]
    fn test_mul_div_floor_large_values() {
        let a = u128::MAX / 3;
        assert_eq!(mul_div_floor(a, 10_000, 10_000), Some(a));
        assert!(mul_div_floor(a, 10_000, 10_050).unwrap() < a);
        assert_eq!(mul_div_floor(u128::MAX, 20_000, 10_000), None);
    }

    #[test]
    fn test_max_in_saturates() {
        let trade = fixtures::evm_trade(TradeType::ExactOut, u128::MAX / 2 + 1, 5);
        // doubling the input does not fit
        assert_eq!(maximum_amount_in(&trade, &Percent::from_bips(10_000)).raw, u128::MAX);
    }

    #[test]
    fn test_min_out_exact_for_huge_amounts() {
        let trade = fixtures::evm_trade(TradeType::ExactIn, 1, u128::MAX);
        let min_out = minimum_amount_out(&trade, &Percent::from_bips(10_000)).raw;
        assert_eq!(min_out, u128::MAX / 2);
    }

    #[test]
    #[should_panic(expected = "slippage tolerance out of range")]
    fn test_oversized_tolerance_panics() {
        let trade = fixtures::evm_trade(TradeType::ExactIn, 1_000, 2_000);
        let _ = minimum_amount_out(&trade, &Percent::new(1, 1 << 40));
    }

    proptest::proptest! {
        #[test]
        fn prop_bounds_hold(out in 1u128..u64::MAX as u128, input in 1u128..u64::MAX as u128, bips in 0i128..5_000) {
            let tol = Percent::from_bips(bips);

            let exact_in = fixtures::evm_trade(TradeType::ExactIn, input, out);
            let min_out = minimum_amount_out(&exact_in, &tol).raw;
            proptest::prop_assert!(min_out <= out);
            proptest::prop_assert_eq!(maximum_amount_in(&exact_in, &tol).raw, input);

            let exact_out = fixtures::evm_trade(TradeType::ExactOut, input, out);
            proptest::prop_assert!(maximum_amount_in(&exact_out, &tol).raw >= input);
            proptest::prop_assert_eq!(minimum_amount_out(&exact_out, &tol).raw, out);
        }
    }
}
