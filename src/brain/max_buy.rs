//! Optimal flash-loan sizing across two constant-product venues.
//!
//! Assume two exchanges A and B trading the same base/alt pair. When the
//! venues disagree on price there is a unique loan size that maximizes the
//! round-trip profit of borrow-on-A / sell-on-B / repay-on-A; this module
//! derives it in closed form with exact big-integer arithmetic.

use alloy_primitives::{I256, U256};
use num_bigint::BigUint;
use num_rational::BigRational;
use num_traits::Signed;

use super::amm_math::{
    biguint_to_u256, get_amount_in, get_amount_out, u256_to_rational, Fee,
};
use super::types::{AssetRole, PoolReserves, Quantity, StartPoint, TradeDetails};
use super::SolverError;

/// Fractional decimal digits carried through the fixed-point square roots.
const SQRT_FRACTIONAL_DIGITS: u32 = 18;

/// Fee factor baked into the closed-form maximizer. The sizing step always
/// assumes the 0.3% tier on both legs even when the venues' registered fees
/// differ; the realization legs below do use the per-pool fees. Kept for
/// output compatibility with the deployed executor.
const SIZING_FEE_PER_MILLE: u64 = 997;

/// Decide which asset role must be borrowed to exploit the spread.
///
/// Compares exchange A's own ratio against the pooled-weighted "true
/// price" `(A_base+B_base)/(A_alt+B_alt)`. Cross-multiplied so the
/// comparison is exact; both sides share the `A_base * A_alt` term, which
/// cancels down to `B_base * A_alt` vs `A_base * B_alt`.
pub fn trade_direction(
    reserve_a_base: U256,
    reserve_a_alt: U256,
    reserve_b_base: U256,
    reserve_b_alt: U256,
) -> Result<Option<StartPoint>, SolverError> {
    if reserve_a_base.is_zero()
        || reserve_a_alt.is_zero()
        || reserve_b_base.is_zero()
        || reserve_b_alt.is_zero()
    {
        return Err(SolverError::InsufficientLiquidity);
    }

    let true_side = reserve_b_base * reserve_a_alt;
    let ratio_side = reserve_a_base * reserve_b_alt;

    // true price below A's ratio: base is cheap on A relative to the
    // blended market, so borrow base and sell it on B.
    Ok(match true_side.cmp(&ratio_side) {
        std::cmp::Ordering::Less => Some(StartPoint::Base),
        std::cmp::Ordering::Greater => Some(StartPoint::Alt),
        std::cmp::Ordering::Equal => None,
    })
}

/// Size the optimal flash loan for the A->B->A round trip.
///
/// Returns `TradeDetails::None` when the venues agree on price or when the
/// pools are too shallow to realize the spread (e.g. a reserve of 1 unit);
/// only a pool with a zero reserve is a hard error.
pub fn find_max_buy(
    pool_a: &PoolReserves,
    pool_b: &PoolReserves,
    convert_profit_to_base: bool,
) -> Result<TradeDetails, SolverError> {
    let start_point =
        match trade_direction(pool_a.base, pool_a.alt, pool_b.base, pool_b.alt)? {
            Some(sp) => sp,
            None => return Ok(TradeDetails::None),
        };

    // Reorder so r1 is the asset being flash-borrowed on each venue.
    let (a0, a1, b0, b1) = match start_point {
        StartPoint::Base => (pool_a.alt, pool_a.base, pool_b.alt, pool_b.base),
        StartPoint::Alt => (pool_a.base, pool_a.alt, pool_b.base, pool_b.alt),
    };

    let loan = match optimal_loan(a0, a1, b0, b1) {
        Some(loan) => loan,
        None => return Ok(TradeDetails::None),
    };

    // Borrowing alt pays out in base; borrowing base pays out in alt
    // unless the caller asks for the extra hop back into base.
    let realize = || -> Result<TradeDetails, SolverError> {
        let midstep = get_amount_out(loan, b1, b0, pool_b.fee)?;

        let (profit, profit_asset) = match (start_point, convert_profit_to_base) {
            (StartPoint::Alt, _) => {
                let repay = get_amount_in(loan, a0, a1, pool_a.fee)?;
                (midstep.checked_sub(repay), AssetRole::Base)
            }
            (StartPoint::Base, true) => {
                let out = get_amount_out(midstep, a0, a1, pool_a.fee)?;
                (out.checked_sub(loan), AssetRole::Base)
            }
            (StartPoint::Base, false) => {
                let repay = get_amount_in(loan, a0, a1, pool_a.fee)?;
                (midstep.checked_sub(repay), AssetRole::Alt)
            }
        };

        let Some(profit) = profit else {
            // The optimum came out unprofitable once realized in integers.
            return Ok(TradeDetails::None);
        };

        Ok(TradeDetails::Trade {
            start_point,
            initial_loan: Quantity {
                asset: start_point.into(),
                amount: loan,
            },
            expected_profit: Quantity {
                asset: profit_asset,
                amount: profit,
            },
        })
    };

    // Near-exhausted reserves trip the quote preconditions; that is "no
    // trade", not a failure the caller has to care about.
    match realize() {
        Ok(details) => Ok(details),
        Err(_) => Ok(TradeDetails::None),
    }
}

/// Closed-form profit maximizer for symmetric 0.3% pools:
///
/// ```text
/// loan = (phi*sqrt(B0)*sqrt(A1) - sqrt(A0)*sqrt(B1)) * sqrt(A0) * sqrt(B1)
///        -----------------------------------------------------------------
///                         phi * (phi*B0 + A0)
/// ```
///
/// with `phi = 0.997`, evaluated in rationals and floored. `None` when the
/// formula yields a non-positive loan.
fn optimal_loan(a0: U256, a1: U256, b0: U256, b1: U256) -> Option<U256> {
    let phi = BigRational::new(SIZING_FEE_PER_MILLE.into(), 1000.into());

    let sa0 = sqrt_fixed(a0);
    let sa1 = sqrt_fixed(a1);
    let sb0 = sqrt_fixed(b0);
    let sb1 = sqrt_fixed(b1);

    let numerator = (&phi * &sb0 * &sa1 - &sa0 * &sb1) * &sa0 * &sb1;
    let denominator = &phi * (&phi * u256_to_rational(b0) + u256_to_rational(a0));

    let loan = numerator / denominator;
    if !loan.is_positive() {
        return None;
    }

    let floored = loan.floor().to_integer().to_biguint()?;
    biguint_to_u256(&floored)
}

/// Fixed-point square root: exact integer root of `x * 10^36`, carried as
/// a rational with an 18-digit fractional part.
fn sqrt_fixed(value: U256) -> BigRational {
    let scale = BigUint::from(10u32).pow(2 * SQRT_FRACTIONAL_DIGITS);
    let root = (super::amm_math::u256_to_biguint(value) * scale).sqrt();
    BigRational::new(
        root.into(),
        BigUint::from(10u32).pow(SQRT_FRACTIONAL_DIGITS).into(),
    )
}

/// Simulate a round trip of a *given* size and return the signed net
/// profit, denominated in the borrowed asset. Both legs quote at the
/// standard 0.3% tier, mirroring the deployed executor's assumptions.
pub fn calc_arb(
    input_amount: U256,
    start_point: StartPoint,
    reserve_a_base: U256,
    reserve_a_alt: U256,
    reserve_b_base: U256,
    reserve_b_alt: U256,
) -> Result<I256, SolverError> {
    let (rb_in, rb_out, ra_in, ra_out) = match start_point {
        StartPoint::Alt => (reserve_b_alt, reserve_b_base, reserve_a_base, reserve_a_alt),
        StartPoint::Base => (reserve_b_base, reserve_b_alt, reserve_a_alt, reserve_a_base),
    };

    let midstep = get_amount_out(input_amount, rb_in, rb_out, Fee::STANDARD)?;
    let out = get_amount_out(midstep, ra_in, ra_out, Fee::STANDARD)?;

    let out = I256::try_from(out)
        .map_err(|_| SolverError::InvalidArgument("amount exceeds signed range"))?;
    let input = I256::try_from(input_amount)
        .map_err(|_| SolverError::InvalidArgument("amount exceeds signed range"))?;

    Ok(out - input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    fn pool(base: u64, alt: u64) -> PoolReserves {
        PoolReserves::new(u(base), u(alt), Fee::STANDARD)
    }

    #[test]
    fn direction_balanced_pools_is_none() {
        let dir = trade_direction(u(1000), u(1000), u(1000), u(1000)).unwrap();
        assert_eq!(dir, None);
    }

    #[test]
    fn direction_tracks_the_cheap_pool() {
        // B holds less alt, so alt trades rich on the blended market while
        // exchange A still sells it at par: borrow alt on A.
        let dir = trade_direction(u(1000), u(1000), u(1000), u(950)).unwrap();
        assert_eq!(dir, Some(StartPoint::Alt));

        // Mirror image: A holds less alt, base is the cheap side of A.
        let dir = trade_direction(u(1000), u(950), u(1000), u(1000)).unwrap();
        assert_eq!(dir, Some(StartPoint::Base));
    }

    #[test]
    fn direction_rejects_empty_pools() {
        assert_eq!(
            trade_direction(U256::ZERO, u(1000), u(1000), u(1000)),
            Err(SolverError::InsufficientLiquidity)
        );
        assert_eq!(
            trade_direction(u(1000), u(1000), u(1000), U256::ZERO),
            Err(SolverError::InsufficientLiquidity)
        );
    }

    #[test]
    fn balanced_pools_produce_no_trade() {
        let details = find_max_buy(&pool(1000, 1000), &pool(1000, 1000), true).unwrap();
        assert_eq!(details, TradeDetails::None);
    }

    #[test]
    fn asymmetric_pools_produce_a_sized_trade() {
        // B holds less alt than A: borrow alt on A, sell it dear on B,
        // pocket the difference in base.
        let scale = 1_000_000_000_000u64;
        let details = find_max_buy(
            &pool(scale, scale),
            &pool(scale, scale / 100 * 95),
            false,
        )
        .unwrap();

        let TradeDetails::Trade {
            start_point,
            initial_loan,
            expected_profit,
        } = details
        else {
            panic!("expected a sized trade");
        };
        assert_eq!(start_point, StartPoint::Alt);
        assert_eq!(initial_loan.asset, AssetRole::Alt);
        assert!(initial_loan.amount > U256::ZERO);
        assert_eq!(expected_profit.asset, AssetRole::Base);
        assert!(expected_profit.amount > U256::ZERO);
    }

    #[test]
    fn base_start_profit_follows_the_convert_flag() {
        let scale = 1_000_000_000_000u64;
        let a = pool(scale, scale / 100 * 95);
        let b = pool(scale, scale);

        let converted = find_max_buy(&a, &b, true).unwrap();
        let TradeDetails::Trade {
            start_point,
            expected_profit,
            ..
        } = converted
        else {
            panic!("expected a sized trade");
        };
        assert_eq!(start_point, StartPoint::Base);
        assert_eq!(expected_profit.asset, AssetRole::Base);
        assert!(expected_profit.amount > U256::ZERO);

        let raw = find_max_buy(&a, &b, false).unwrap();
        let TradeDetails::Trade {
            expected_profit, ..
        } = raw
        else {
            panic!("expected a sized trade");
        };
        assert_eq!(expected_profit.asset, AssetRole::Alt);
    }

    #[test]
    fn near_exhausted_reserve_degrades_to_none() {
        // Single-unit reserves floor the optimal loan to zero, which trips
        // the quoting preconditions; the solver must swallow that.
        let details = find_max_buy(&pool(2, 1), &pool(1, 1), true).unwrap();
        assert_eq!(details, TradeDetails::None);

        // The 0.3% sizing discount can also eat a sub-fee spread outright.
        let details = find_max_buy(&pool(1000, 1000), &pool(1000, 999), false).unwrap();
        assert_eq!(details, TradeDetails::None);
    }

    #[test]
    fn zero_reserve_is_a_hard_error() {
        let err = find_max_buy(&pool(0, 1000), &pool(1000, 1000), true);
        assert_eq!(err, Err(SolverError::InsufficientLiquidity));
    }

    #[test]
    fn recommended_loan_beats_neighbouring_sizes() {
        let scale = 1_000_000_000_000u64;
        let a = pool(scale, scale);
        let b = pool(scale, scale / 100 * 95);
        let details = find_max_buy(&a, &b, true).unwrap();
        let loan = match &details {
            TradeDetails::Trade { initial_loan, .. } => initial_loan.amount,
            TradeDetails::None => panic!("expected a trade"),
        };
        let sp = details.start_point().unwrap();

        let at = |size: U256| calc_arb(size, sp, a.base, a.alt, b.base, b.alt).unwrap();
        let best = at(loan);
        assert!(best > I256::ZERO);

        let delta = loan / u(10);
        assert!(best >= at(loan - delta));
        assert!(best >= at(loan + delta));
    }

    #[test]
    fn calc_arb_balanced_pools_loses_the_fees() {
        let profit = calc_arb(
            u(1000),
            StartPoint::Base,
            u(1_000_000),
            u(1_000_000),
            u(1_000_000),
            u(1_000_000),
        )
        .unwrap();
        assert!(profit < I256::ZERO);
    }

    #[test]
    fn sqrt_fixed_is_exact_on_squares() {
        let r = sqrt_fixed(U256::from(1_000_000u64));
        assert_eq!(r, BigRational::from_integer(1000.into()));
    }
}
