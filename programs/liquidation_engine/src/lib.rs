use fixed::types::I80F48;
use log::{debug, info};
use oracle_framework::{ProtocolParameters, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lovelace value of `borrowed` synthetic units at `rate` lovelace per unit.
pub fn debt_value_lovelace(borrowed: u64, rate: u64) -> Result<u64, LiquidationError> {
    borrowed
        .checked_mul(rate)
        .ok_or(LiquidationError::MathOverflow)
}

/// `collateral * 10_000 < borrowed * rate * threshold_bps`, evaluated exactly.
pub fn is_below_ratio(
    collateral: u64,
    borrowed: u64,
    rate: u64,
    threshold_bps: u64,
) -> Result<bool, LiquidationError> {
    let lhs = (collateral as u128)
        .checked_mul(BPS_DENOMINATOR as u128)
        .ok_or(LiquidationError::MathOverflow)?;
    let rhs = (borrowed as u128)
        .checked_mul(rate as u128)
        .and_then(|v| v.checked_mul(threshold_bps as u128))
        .ok_or(LiquidationError::MathOverflow)?;
    Ok(lhs < rhs)
}

/// Collateral / debt ratio in basis points, floored. `None` when there is no debt.
pub fn collateral_ratio_bps(
    collateral: u64,
    borrowed: u64,
    rate: u64,
) -> Result<Option<u64>, LiquidationError> {
    let debt = (borrowed as u128)
        .checked_mul(rate as u128)
        .ok_or(LiquidationError::MathOverflow)?;
    if debt == 0 {
        return Ok(None);
    }
    let ratio = (collateral as u128)
        .checked_mul(BPS_DENOMINATOR as u128)
        .ok_or(LiquidationError::MathOverflow)?
        / debt;
    Ok(Some(u64::try_from(ratio).unwrap_or(u64::MAX)))
}

// ========== POSITION HEALTH ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionHealth {
    pub ratio_bps: Option<u64>,
    pub collateral_ratio_bps: u64,
    pub liquidation_ratio_bps: u64,
    /// Below the liquidation ratio at the assessed rate.
    pub liquidatable: bool,
    /// At or above the collateral ratio at the assessed rate.
    pub healthy: bool,
}

impl PositionHealth {
    /// Ratio as a fixed-point multiple (1.5 for 15_000 bps). Display only.
    pub fn display_ratio(&self) -> Option<I80F48> {
        self.ratio_bps
            .map(|bps| I80F48::from_num(bps) / I80F48::from_num(BPS_DENOMINATOR))
    }
}

pub fn assess(
    collateral: u64,
    borrowed: u64,
    rate: u64,
    params: &ProtocolParameters,
) -> Result<PositionHealth, LiquidationError> {
    let ratio_bps = collateral_ratio_bps(collateral, borrowed, rate)?;
    let liquidatable = is_below_ratio(collateral, borrowed, rate, params.liquidation_ratio_bps)?;
    let healthy = !is_below_ratio(collateral, borrowed, rate, params.collateral_ratio_bps)?;
    let health = PositionHealth {
        ratio_bps,
        collateral_ratio_bps: params.collateral_ratio_bps,
        liquidation_ratio_bps: params.liquidation_ratio_bps,
        liquidatable,
        healthy,
    };
    debug!(
        "Position health: ratio {:?}bps (min {}bps, liquidation {}bps)",
        ratio_bps, params.collateral_ratio_bps, params.liquidation_ratio_bps
    );
    Ok(health)
}

pub fn check_liquidation_trigger(health: &PositionHealth) -> Result<(), LiquidationError> {
    if !health.liquidatable {
        return Err(LiquidationError::ThresholdNotBreached {
            ratio_bps: health.ratio_bps,
            threshold_bps: health.liquidation_ratio_bps,
        });
    }
    Ok(())
}
// ========== END POSITION HEALTH ==========

// ========== COLLATERAL DISTRIBUTION ==========
/// How the seized collateral of a liquidated position is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationSplit {
    pub debt_value: u64,
    pub bonus: u64,
    /// Paid to the liquidator who burns the debt.
    pub liquidator_share: u64,
    /// Sent to the protocol treasury.
    pub remainder: u64,
}

/// Liquidator receives the debt value plus `bonus_bps` of it, capped at the
/// collateral. A remainder below `min_output` cannot form its own output and
/// goes to the liquidator as well.
pub fn distribute_collateral(
    collateral: u64,
    debt_value: u64,
    bonus_bps: u64,
    min_output: u64,
) -> Result<LiquidationSplit, LiquidationError> {
    let bonus = (debt_value as u128)
        .checked_mul(bonus_bps as u128)
        .and_then(|v| v.checked_div(BPS_DENOMINATOR as u128))
        .ok_or(LiquidationError::MathOverflow)? as u64;
    let claim = debt_value
        .checked_add(bonus)
        .ok_or(LiquidationError::MathOverflow)?;

    let mut liquidator_share = claim.min(collateral);
    let mut remainder = collateral
        .checked_sub(liquidator_share)
        .ok_or(LiquidationError::MathOverflow)?;
    if remainder > 0 && remainder < min_output {
        liquidator_share = collateral;
        remainder = 0;
    }

    info!(
        "✅ Liquidation split: debt value {} + bonus {} -> liquidator {}, treasury {}",
        debt_value, bonus, liquidator_share, remainder
    );

    Ok(LiquidationSplit {
        debt_value,
        bonus,
        liquidator_share,
        remainder,
    })
}
// ========== END COLLATERAL DISTRIBUTION ==========

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LiquidationError {
    #[error("liquidation threshold not breached: ratio {ratio_bps:?}bps, threshold {threshold_bps}bps")]
    ThresholdNotBreached {
        ratio_bps: Option<u64>,
        threshold_bps: u64,
    },
    #[error("overflow during liquidation math")]
    MathOverflow,
}
