//! The Brain - arbitrage sizing over constant-product venues.
//!
//! Pure and synchronous: everything here operates on integer reserves and
//! per-mille fee ticks, never on floats, so results match the on-chain
//! arithmetic bit for bit.

mod amm_math;
mod max_buy;
mod types;

pub use amm_math::{
    execution_price, get_amount_in, get_amount_out, get_amount_out_simulate, Fee, SwapOutcome,
};
pub use max_buy::{calc_arb, find_max_buy, trade_direction};
pub use types::{
    AssetRole, PoolReserves, Quantity, StartPoint, TradeDetails, TradeRecommendation,
};

/// Failures of the pure math layer.
///
/// `InvalidArgument` is a caller bug and is never retried;
/// `InsufficientLiquidity` is a market condition that `find_max_buy`
/// downgrades to a `TradeDetails::None` internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SolverError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("insufficient liquidity")]
    InsufficientLiquidity,
}
