use fixed::types::I80F48;
use ledger_model::require;
use liquidation_engine::{collateral_ratio_bps, is_below_ratio, LiquidationError};
use log::debug;
use oracle_framework::{OracleSnapshot, ProtocolParameters, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lovelace per ADA. The oracle reference quantity is whole ADA, datum rates
/// are lovelace per synthetic unit.
pub const RATE_SCALE: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanQuote {
    /// Lovelace per synthetic unit, rounded up.
    pub rate: u64,
    /// Largest loan the collateral supports at `rate`.
    pub borrowable: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalculatorError {
    #[error("invalid oracle data: {0}")]
    InvalidOracleData(String),
    #[error("borrowable amount {borrowable} is below the protocol minimum {minimum}")]
    AmountBelowMinimum { borrowable: u64, minimum: u64 },
    #[error("overflow in loan calculation")]
    MathOverflow,
}

impl From<LiquidationError> for CalculatorError {
    fn from(_: LiquidationError) -> Self {
        CalculatorError::MathOverflow
    }
}

/// `ceil(reference_ada * RATE_SCALE / priced_balance)`. Rounding up values the
/// synthetic asset higher, which lends less.
pub fn collateral_rate(oracle: &OracleSnapshot) -> Result<u64, CalculatorError> {
    require!(
        oracle.priced_balance > 0,
        CalculatorError::InvalidOracleData(format!("oracle {} has an empty balance", oracle.out_ref))
    );
    require!(
        oracle.reference_ada > 0,
        CalculatorError::InvalidOracleData(format!("oracle {} has a zero reference", oracle.out_ref))
    );

    let scaled = (oracle.reference_ada as u128)
        .checked_mul(RATE_SCALE as u128)
        .ok_or(CalculatorError::MathOverflow)?;
    let balance = oracle.priced_balance as u128;
    let rate = scaled
        .checked_add(balance - 1)
        .ok_or(CalculatorError::MathOverflow)?
        / balance;
    u64::try_from(rate).map_err(|_| CalculatorError::MathOverflow)
}

/// `floor(collateral * 10_000 / (rate * ratio_bps))`.
pub fn max_borrowable(collateral: u64, rate: u64, ratio_bps: u64) -> Result<u64, CalculatorError> {
    let denominator = (rate as u128)
        .checked_mul(ratio_bps as u128)
        .ok_or(CalculatorError::MathOverflow)?;
    require!(
        denominator > 0,
        CalculatorError::InvalidOracleData("zero rate or collateral ratio".into())
    );
    let numerator = (collateral as u128)
        .checked_mul(BPS_DENOMINATOR as u128)
        .ok_or(CalculatorError::MathOverflow)?;
    u64::try_from(numerator / denominator).map_err(|_| CalculatorError::MathOverflow)
}

pub fn compute_loan(
    oracle: &OracleSnapshot,
    params: &ProtocolParameters,
    collateral: u64,
) -> Result<LoanQuote, CalculatorError> {
    let rate = collateral_rate(oracle)?;
    let borrowable = max_borrowable(collateral, rate, params.collateral_ratio_bps)?;
    debug!(
        "Loan quote: {} lovelace at {} lovelace/unit, {}bps -> {} borrowable",
        collateral, rate, params.collateral_ratio_bps, borrowable
    );
    require!(
        borrowable >= params.min_borrow,
        CalculatorError::AmountBelowMinimum {
            borrowable,
            minimum: params.min_borrow,
        }
    );
    Ok(LoanQuote { rate, borrowable })
}

/// `collateral * 10_000 >= borrowed * rate * ratio_bps`.
pub fn meets_collateral_ratio(
    collateral: u64,
    borrowed: u64,
    rate: u64,
    ratio_bps: u64,
) -> Result<bool, CalculatorError> {
    Ok(!is_below_ratio(collateral, borrowed, rate, ratio_bps)?)
}

/// Smallest collateral meeting `ratio_bps` for `borrowed` units at `rate`.
pub fn required_collateral(borrowed: u64, rate: u64, ratio_bps: u64) -> Result<u64, CalculatorError> {
    let weighted = (borrowed as u128)
        .checked_mul(rate as u128)
        .and_then(|v| v.checked_mul(ratio_bps as u128))
        .ok_or(CalculatorError::MathOverflow)?;
    let denominator = BPS_DENOMINATOR as u128;
    let required = weighted
        .checked_add(denominator - 1)
        .ok_or(CalculatorError::MathOverflow)?
        / denominator;
    u64::try_from(required).map_err(|_| CalculatorError::MathOverflow)
}

/// Collateral over debt value as a fixed-point multiple, for display.
pub fn collateral_ratio(collateral: u64, borrowed: u64, rate: u64) -> Option<I80F48> {
    let bps = collateral_ratio_bps(collateral, borrowed, rate).ok()??;
    Some(I80F48::from_num(bps) / I80F48::from_num(BPS_DENOMINATOR))
}
