//! Core types for the arbitrage sizing engine.
//!
//! A trade is always expressed in asset *roles* (base/alt), never token
//! addresses: which concrete token the loan is denominated in depends on
//! the orientation of the candidate pair, not on token identity.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::amm_math::Fee;

/// Which asset role must be flash-borrowed to capture the spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StartPoint {
    /// Borrow the base asset (stable/WETH side), sell it on exchange B.
    Base,
    /// Borrow the alt asset, sell it on exchange B.
    Alt,
}

impl fmt::Display for StartPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartPoint::Base => write!(f, "BASE"),
            StartPoint::Alt => write!(f, "ALT"),
        }
    }
}

/// The role a quantity is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetRole {
    Base,
    Alt,
}

impl From<StartPoint> for AssetRole {
    fn from(sp: StartPoint) -> Self {
        match sp {
            StartPoint::Base => AssetRole::Base,
            StartPoint::Alt => AssetRole::Alt,
        }
    }
}

/// A token amount tagged with its logical role in the trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quantity {
    pub asset: AssetRole,
    pub amount: U256,
}

/// Outcome of the sizing pass.
///
/// `None` covers both "no exploitable spread" and "spread exists but the
/// pools are too shallow to realize it" - neither is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeDetails {
    None,
    Trade {
        start_point: StartPoint,
        initial_loan: Quantity,
        expected_profit: Quantity,
    },
}

impl TradeDetails {
    pub fn is_none(&self) -> bool {
        matches!(self, TradeDetails::None)
    }

    pub fn start_point(&self) -> Option<StartPoint> {
        match self {
            TradeDetails::None => None,
            TradeDetails::Trade { start_point, .. } => Some(*start_point),
        }
    }
}

/// One venue's view of the candidate pair: reserves by role plus the
/// venue's registered fee tier.
#[derive(Debug, Clone, Copy)]
pub struct PoolReserves {
    pub base: U256,
    pub alt: U256,
    pub fee: Fee,
}

impl PoolReserves {
    pub fn new(base: U256, alt: U256, fee: Fee) -> Self {
        Self { base, alt, fee }
    }
}

/// What we hand to the external flash-loan executor.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecommendation {
    pub base_token: Address,
    pub alt_token: Address,
    pub start_point: StartPoint,
    /// Derived from the start point: true when the executor should
    /// flash-borrow the base asset.
    pub flashloan_base_asset: bool,
    pub initial_loan: String,
    pub loan_asset: AssetRole,
    pub expected_profit: String,
    pub profit_asset: AssetRole,
}

impl TradeRecommendation {
    /// Build the executor payload from a sized trade. Returns `None` for
    /// a `TradeDetails::None` (nothing to execute).
    pub fn from_trade(base_token: Address, alt_token: Address, trade: &TradeDetails) -> Option<Self> {
        match trade {
            TradeDetails::None => None,
            TradeDetails::Trade {
                start_point,
                initial_loan,
                expected_profit,
            } => Some(Self {
                base_token,
                alt_token,
                start_point: *start_point,
                flashloan_base_asset: *start_point == StartPoint::Base,
                initial_loan: initial_loan.amount.to_string(),
                loan_asset: initial_loan.asset,
                expected_profit: expected_profit.amount.to_string(),
                profit_asset: expected_profit.asset,
            }),
        }
    }
}
