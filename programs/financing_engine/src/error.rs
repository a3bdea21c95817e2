use ledger_model::{AssetUnit, LedgerError, OutRef};
use liquidation_engine::LiquidationError;
use oracle_framework::OracleError;
use thiserror::Error;

use crate::calculator::CalculatorError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FinancingError {
    #[error("no collateral deposit found for owner {owner}")]
    AccountNotFound { owner: String },
    #[error("loan position {out_ref} not found in the collateral pool")]
    PositionNotFound { out_ref: OutRef },
    #[error("wallet does not hold loan NFT {unit}")]
    LoanNftNotHeld { unit: AssetUnit },
    #[error("insufficient collateral: have {available} lovelace, need {required}")]
    InsufficientCollateral { required: u64, available: u64 },
    #[error("loan amount {amount} is below the protocol minimum {minimum}")]
    BelowMinimumBorrow { amount: u64, minimum: u64 },
    #[error("repay amount {amount} exceeds the borrowed amount {borrowed}")]
    RepayExceedsBorrowed { amount: u64, borrowed: u64 },
    #[error("partial repay of the whole borrowed amount {borrowed}: use a full repay")]
    UseFullRepay { borrowed: u64 },
    #[error("withdrawal of {requested} lovelace exceeds the deposit of {available}")]
    WithdrawExceedsDeposit { requested: u64, available: u64 },
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("{what} of {lovelace} lovelace is below the minimum output of {minimum}")]
    DustOutput {
        what: &'static str,
        lovelace: u64,
        minimum: u64,
    },
    #[error("position {out_ref} is not liquidatable: ratio {ratio_bps:?}bps, threshold {threshold_bps}bps")]
    NotLiquidatable {
        out_ref: OutRef,
        ratio_bps: Option<u64>,
        threshold_bps: u64,
    },
    #[error("oracle data is stale: {0}")]
    StaleOracleData(OracleError),
    #[error("pool UTxO {out_ref} was spent since the account was read")]
    StaleAccountState { out_ref: OutRef },
    #[error("invalid oracle data: {0}")]
    InvalidOracleData(String),
    #[error("overflow during loan math")]
    MathOverflow,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Liquidation(#[from] LiquidationError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<CalculatorError> for FinancingError {
    fn from(err: CalculatorError) -> Self {
        match err {
            CalculatorError::InvalidOracleData(msg) => FinancingError::InvalidOracleData(msg),
            CalculatorError::AmountBelowMinimum {
                borrowable,
                minimum,
            } => FinancingError::BelowMinimumBorrow {
                amount: borrowable,
                minimum,
            },
            CalculatorError::MathOverflow => FinancingError::MathOverflow,
        }
    }
}

/// Deployment configuration failure. Keeps only the rendered cause so
/// `FinancingError` stays `Clone + Eq`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0}")]
    Load(String),
    #[error("invalid deployment: {0}")]
    Invalid(String),
}
