//! Constant-product quoting primitives (Uniswap V2 math).
//!
//! All amounts are `U256` in the token's smallest unit. Fees live on a
//! per-mille grid: the pair contracts themselves quote in thousandths
//! (`997/1000` for the standard 0.3% tier), so anything finer is not
//! representable on-chain and is rejected up front.

use alloy_primitives::U256;
use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;

use super::SolverError;

const FEE_DENOMINATOR: u64 = 1000;

/// A pool fee expressed in per-mille ticks.
///
/// Legal values are zero or at least one tick (0.1%), matching the
/// minimum fee the V2 quoting formula can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fee {
    per_mille: u16,
}

impl Fee {
    pub const ZERO: Fee = Fee { per_mille: 0 };
    /// The 0.3% tier used by virtually every V2 fork.
    pub const STANDARD: Fee = Fee { per_mille: 3 };

    /// Parse a fee fraction (e.g. `0.003`) onto the per-mille grid.
    pub fn from_fraction(fraction: f64) -> Result<Self, SolverError> {
        if !(0.0..1.0).contains(&fraction) {
            return Err(SolverError::InvalidArgument("fee must be in [0, 1)"));
        }
        if fraction != 0.0 && fraction < 0.001 {
            return Err(SolverError::InvalidArgument("non-zero fee below minimum tick"));
        }
        let scaled = fraction * FEE_DENOMINATOR as f64;
        if (scaled - scaled.round()).abs() > 1e-9 {
            return Err(SolverError::InvalidArgument("fee is not a per-mille tick"));
        }
        Ok(Fee {
            per_mille: scaled.round() as u16,
        })
    }

    /// The input share kept after the fee, in thousandths (997 for 0.3%).
    pub fn retained_per_mille(&self) -> u64 {
        FEE_DENOMINATOR - self.per_mille as u64
    }

    pub fn fraction(&self) -> f64 {
        self.per_mille as f64 / FEE_DENOMINATOR as f64
    }
}

/// Maximum output for a given input, fee taken from the input leg.
///
/// `out = floor(in' * reserve_out / (reserve_in * 1000 + in'))` with
/// `in' = in * (1000 - fee_per_mille)`.
pub fn get_amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee: Fee,
) -> Result<U256, SolverError> {
    if amount_in.is_zero() {
        return Err(SolverError::InvalidArgument("amount_in must be positive"));
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(SolverError::InvalidArgument("reserves must be positive"));
    }

    let amount_in_with_fee = amount_in * U256::from(fee.retained_per_mille());
    let numerator = amount_in_with_fee * reserve_out;
    let denominator = reserve_in * U256::from(FEE_DENOMINATOR) + amount_in_with_fee;

    Ok(numerator / denominator)
}

/// A quote together with the pool state it would leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOutcome {
    pub amount_out: U256,
    pub reserve_in: U256,
    pub reserve_out: U256,
}

/// `get_amount_out` plus the post-trade reserves, for chained simulation.
pub fn get_amount_out_simulate(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee: Fee,
) -> Result<SwapOutcome, SolverError> {
    let amount_out = get_amount_out(amount_in, reserve_in, reserve_out, fee)?;
    Ok(SwapOutcome {
        amount_out,
        reserve_in: reserve_in + amount_in,
        reserve_out: reserve_out - amount_out,
    })
}

/// Required input to withdraw exactly `amount_out` from the pool.
///
/// Fails with `InsufficientLiquidity` when the pool cannot cover the
/// requested output.
pub fn get_amount_in(
    amount_out: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee: Fee,
) -> Result<U256, SolverError> {
    if amount_out.is_zero() {
        return Err(SolverError::InvalidArgument("amount_out must be positive"));
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(SolverError::InvalidArgument("reserves must be positive"));
    }
    if reserve_out <= amount_out {
        return Err(SolverError::InsufficientLiquidity);
    }

    let numerator = reserve_in * amount_out * U256::from(FEE_DENOMINATOR);
    let denominator = (reserve_out - amount_out) * U256::from(fee.retained_per_mille());

    Ok(numerator / denominator)
}

/// Marginal execution price of a hypothetical swap, kept rational.
///
/// This is a price, not a settled amount, so it is deliberately not
/// floored: `price = (1-f) * reserve_out / (amount_in * (1-f) + reserve_in)`.
pub fn execution_price(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee: Fee,
) -> Result<BigRational, SolverError> {
    if amount_in.is_zero() {
        return Err(SolverError::InvalidArgument("amount_in must be positive"));
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(SolverError::InvalidArgument("reserves must be positive"));
    }

    let retained = BigRational::new(
        BigInt::from(fee.retained_per_mille()),
        BigInt::from(FEE_DENOMINATOR),
    );
    let numerator = &retained * u256_to_rational(reserve_out);
    let denominator = u256_to_rational(amount_in) * &retained + u256_to_rational(reserve_in);

    Ok(numerator / denominator)
}

// ============================================
// U256 <-> bignum bridges
// ============================================

pub(crate) fn u256_to_biguint(value: U256) -> BigUint {
    BigUint::from_bytes_be(&value.to_be_bytes::<32>())
}

pub(crate) fn u256_to_bigint(value: U256) -> BigInt {
    BigInt::from(u256_to_biguint(value))
}

pub(crate) fn u256_to_rational(value: U256) -> BigRational {
    BigRational::from_integer(u256_to_bigint(value))
}

pub(crate) fn biguint_to_u256(value: &BigUint) -> Option<U256> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return None;
    }
    Some(U256::from_be_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::ToPrimitive;

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    #[test]
    fn fee_ticks_validate() {
        assert_eq!(Fee::from_fraction(0.0).unwrap(), Fee::ZERO);
        assert_eq!(Fee::from_fraction(0.003).unwrap(), Fee::STANDARD);
        assert_eq!(Fee::from_fraction(0.001).unwrap().retained_per_mille(), 999);
        assert!(Fee::from_fraction(0.0005).is_err());
        assert!(Fee::from_fraction(0.0031).is_err());
        assert!(Fee::from_fraction(1.0).is_err());
        assert!(Fee::from_fraction(-0.003).is_err());
    }

    #[test]
    fn amount_out_matches_reference() {
        // 997 * 100 * 1000 / (1000 * 1000 + 997 * 100) = 90.66... -> 90
        let out = get_amount_out(u(100), u(1000), u(1000), Fee::STANDARD).unwrap();
        assert_eq!(out, u(90));
    }

    #[test]
    fn amount_out_monotone_and_bounded() {
        let mut prev = U256::ZERO;
        for amount in [1u64, 10, 100, 1_000, 10_000, 1_000_000] {
            let out = get_amount_out(u(amount), u(50_000), u(80_000), Fee::STANDARD).unwrap();
            assert!(out >= prev, "output must grow with input");
            assert!(out < u(80_000), "output can never drain the reserve");
            prev = out;
        }
    }

    #[test]
    fn amount_out_rejects_bad_arguments() {
        assert_eq!(
            get_amount_out(U256::ZERO, u(1000), u(1000), Fee::STANDARD),
            Err(SolverError::InvalidArgument("amount_in must be positive"))
        );
        assert!(get_amount_out(u(10), U256::ZERO, u(1000), Fee::STANDARD).is_err());
        assert!(get_amount_out(u(10), u(1000), U256::ZERO, Fee::STANDARD).is_err());
    }

    #[test]
    fn amount_in_round_trips_within_rounding() {
        let r_in = u(1_000_000);
        let r_out = u(2_500_000);
        for x in [500u64, 3_000, 40_000, 250_000] {
            let out = get_amount_out(u(x), r_in, r_out, Fee::STANDARD).unwrap();
            let back = get_amount_in(out, r_in, r_out, Fee::STANDARD).unwrap();
            // Floor division moves each direction by at most a few units.
            let diff = if back > u(x) { back - u(x) } else { u(x) - back };
            assert!(diff <= u(3), "round trip drifted by {diff} for input {x}");
        }
    }

    #[test]
    fn amount_in_requires_cover() {
        assert_eq!(
            get_amount_in(u(1000), u(1000), u(1000), Fee::STANDARD),
            Err(SolverError::InsufficientLiquidity)
        );
        assert_eq!(
            get_amount_in(u(1001), u(1000), u(1000), Fee::STANDARD),
            Err(SolverError::InsufficientLiquidity)
        );
        assert!(get_amount_in(u(999), u(1000), u(1000), Fee::STANDARD).is_ok());
    }

    #[test]
    fn simulate_tracks_reserves() {
        let outcome = get_amount_out_simulate(u(100), u(1000), u(1000), Fee::STANDARD).unwrap();
        assert_eq!(outcome.amount_out, u(90));
        assert_eq!(outcome.reserve_in, u(1100));
        assert_eq!(outcome.reserve_out, u(910));
    }

    #[test]
    fn execution_price_sits_below_spot() {
        // Spot price is reserve_out/reserve_in = 2.0; execution must be worse.
        let price = execution_price(u(1000), u(10_000), u(20_000), Fee::STANDARD).unwrap();
        let approx = price.to_f64().unwrap();
        assert!(approx < 2.0);
        assert!(approx > 1.7);
    }

    #[test]
    fn biguint_bridge_round_trips() {
        let big = U256::MAX - U256::from(7u64);
        assert_eq!(biguint_to_u256(&u256_to_biguint(big)).unwrap(), big);
        let over = u256_to_biguint(U256::MAX) + BigUint::from(1u8);
        assert!(biguint_to_u256(&over).is_none());
    }
}
