use std::fmt;

use ledger_model::{require, AssetUnit, LedgerError, OutRef, PlutusData, Utxo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod reader;

pub use reader::{ensure_live, lookup, read_reference_data, ReferenceRefs};

/// Ratios and fees are expressed in basis points: 10_000 = 1.0.
pub const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceRole {
    Oracle,
    ProtocolParameters,
}

impl fmt::Display for ReferenceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceRole::Oracle => f.write_str("oracle"),
            ReferenceRole::ProtocolParameters => f.write_str("protocol parameters"),
        }
    }
}

/// Outcome of looking up a reference UTxO. Callers must handle the missing case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound(OutRef),
}

impl<T> Lookup<T> {
    pub fn found(self, role: ReferenceRole) -> Result<T, OracleError> {
        match self {
            Lookup::Found(value) => Ok(value),
            Lookup::NotFound(out_ref) => Err(OracleError::MissingReferenceInput { role, out_ref }),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

// ========== ORACLE SNAPSHOT ==========
/// Priced-asset balance of the oracle UTxO together with the reference
/// quantity (whole ADA) it prices, read from the inline datum `Constr0[Int]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSnapshot {
    pub out_ref: OutRef,
    pub priced_unit: AssetUnit,
    pub priced_balance: u64,
    pub reference_ada: u64,
}

impl OracleSnapshot {
    pub const DATUM_TAG: u64 = 0;

    pub fn from_utxo(utxo: &Utxo, priced_unit: &AssetUnit) -> Result<Self, OracleError> {
        let priced_balance = utxo.value().quantity_of(priced_unit);
        require!(
            priced_balance > 0,
            OracleError::InvalidOracleData(format!(
                "oracle {} holds no {}",
                utxo.out_ref(),
                priced_unit
            ))
        );

        let datum = utxo.datum().ok_or_else(|| {
            OracleError::InvalidOracleData(format!("oracle {} has no inline datum", utxo.out_ref()))
        })?;
        let reference_ada = datum
            .expect_constr(Self::DATUM_TAG, 1)
            .and_then(|mut fields| fields.u64("reference_ada"))
            .map_err(|e| OracleError::InvalidOracleData(e.to_string()))?;
        require!(
            reference_ada > 0,
            OracleError::InvalidOracleData("reference quantity must be positive".into())
        );

        Ok(Self {
            out_ref: utxo.out_ref().clone(),
            priced_unit: priced_unit.clone(),
            priced_balance,
            reference_ada,
        })
    }

    pub fn datum(reference_ada: u64) -> PlutusData {
        PlutusData::constr(Self::DATUM_TAG, vec![PlutusData::int(saturating_i64(reference_ada))])
    }
}
// ========== END ORACLE SNAPSHOT ==========

// ========== PROTOCOL PARAMETERS ==========
/// Protocol-wide configuration held in the parameters UTxO datum:
/// `Constr0[collateral_ratio_bps, liquidation_ratio_bps, min_borrow, liquidation_bonus_bps]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    pub out_ref: OutRef,
    /// Minimum collateral / debt ratio for a healthy position (15_000 = 150%).
    pub collateral_ratio_bps: u64,
    /// Below this ratio a position may be liquidated.
    pub liquidation_ratio_bps: u64,
    /// Smallest borrowable amount, in synthetic-asset units.
    pub min_borrow: u64,
    /// Share of the debt value paid to the liquidator on top of the debt.
    pub liquidation_bonus_bps: u64,
}

impl ProtocolParameters {
    pub const DATUM_TAG: u64 = 0;
    pub const DATUM_ARITY: usize = 4;

    pub fn from_utxo(utxo: &Utxo) -> Result<Self, OracleError> {
        let datum = utxo.datum().ok_or_else(|| {
            OracleError::InvalidProtocolParameters(format!(
                "parameters {} have no inline datum",
                utxo.out_ref()
            ))
        })?;
        let decoded = (|| -> Result<Self, LedgerError> {
            let mut fields = datum.expect_constr(Self::DATUM_TAG, Self::DATUM_ARITY)?;
            Ok(Self {
                out_ref: utxo.out_ref().clone(),
                collateral_ratio_bps: fields.u64("collateral_ratio_bps")?,
                liquidation_ratio_bps: fields.u64("liquidation_ratio_bps")?,
                min_borrow: fields.u64("min_borrow")?,
                liquidation_bonus_bps: fields.u64("liquidation_bonus_bps")?,
            })
        })()
        .map_err(|e| OracleError::InvalidProtocolParameters(e.to_string()))?;

        decoded.validate()?;
        Ok(decoded)
    }

    pub fn validate(&self) -> Result<(), OracleError> {
        require!(
            self.liquidation_ratio_bps > BPS_DENOMINATOR,
            OracleError::InvalidProtocolParameters(format!(
                "liquidation ratio {}bps must exceed 100%",
                self.liquidation_ratio_bps
            ))
        );
        require!(
            self.collateral_ratio_bps > self.liquidation_ratio_bps,
            OracleError::InvalidProtocolParameters(format!(
                "collateral ratio {}bps must exceed liquidation ratio {}bps",
                self.collateral_ratio_bps, self.liquidation_ratio_bps
            ))
        );
        require!(
            self.min_borrow > 0,
            OracleError::InvalidProtocolParameters("minimum borrow must be positive".into())
        );
        require!(
            self.liquidation_bonus_bps < BPS_DENOMINATOR,
            OracleError::InvalidProtocolParameters(format!(
                "liquidation bonus {}bps must be below 100%",
                self.liquidation_bonus_bps
            ))
        );
        Ok(())
    }

    pub fn to_datum(&self) -> PlutusData {
        PlutusData::constr(
            Self::DATUM_TAG,
            [
                self.collateral_ratio_bps,
                self.liquidation_ratio_bps,
                self.min_borrow,
                self.liquidation_bonus_bps,
            ]
            .into_iter()
            .map(|v| PlutusData::int(saturating_i64(v)))
            .collect(),
        )
    }
}
// ========== END PROTOCOL PARAMETERS ==========

/// Both reference reads for one planning cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub oracle: OracleSnapshot,
    pub parameters: ProtocolParameters,
}

impl ReferenceData {
    /// Read-only reference inputs for the transaction; never spent.
    pub fn reference_inputs(&self) -> Vec<OutRef> {
        vec![self.oracle.out_ref.clone(), self.parameters.out_ref.clone()]
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("{role} reference input {out_ref} not found on the ledger")]
    MissingReferenceInput { role: ReferenceRole, out_ref: OutRef },
    #[error("{role} reference input {out_ref} was spent since it was read")]
    StaleReference { role: ReferenceRole, out_ref: OutRef },
    #[error("invalid oracle data: {0}")]
    InvalidOracleData(String),
    #[error("invalid protocol parameters: {0}")]
    InvalidProtocolParameters(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
