use ledger_model::{
    encode_hex, require, AssetName, AssetUnit, KeyHash, LedgerError, PlutusData, PolicyId,
    ScriptHash, Utxo,
};
use serde::{Deserialize, Serialize};

use crate::error::FinancingError;
use crate::nft::LoanNftId;

/// Collateral asset tag stored in every position datum.
pub const COLLATERAL_ASSET_ADA: &str = "ada";

// ========== LOAN POSITION ==========
/// Open loan against ADA collateral. Field order is the on-chain datum order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanPosition {
    pub pool_hash: ScriptHash,
    pub borrowed_policy_id: PolicyId,
    pub borrowed_asset_name: AssetName,
    pub borrowed_amount: u64,
    pub loan_nft_policy_id: PolicyId,
    /// Lovelace per synthetic unit at the last transition.
    pub collateral_rate: u64,
    /// Hex of the collateral asset tag.
    pub collateral_asset: String,
    pub collateral_amount: u64,
}

impl LoanPosition {
    pub const DATUM_TAG: u64 = 0;
    pub const DATUM_ARITY: usize = 8;

    pub fn ada_collateral_tag() -> String {
        encode_hex(COLLATERAL_ASSET_ADA.as_bytes())
    }

    pub fn borrowed_unit(&self) -> AssetUnit {
        AssetUnit::new(self.borrowed_policy_id.clone(), self.borrowed_asset_name.clone())
    }

    pub fn to_datum(&self) -> Result<PlutusData, FinancingError> {
        Ok(PlutusData::constr(
            Self::DATUM_TAG,
            vec![
                PlutusData::bytes(self.pool_hash.as_str()),
                PlutusData::bytes(self.borrowed_policy_id.as_str()),
                PlutusData::bytes(self.borrowed_asset_name.as_str()),
                int_field(self.borrowed_amount)?,
                PlutusData::bytes(self.loan_nft_policy_id.as_str()),
                int_field(self.collateral_rate)?,
                PlutusData::bytes(self.collateral_asset.as_str()),
                int_field(self.collateral_amount)?,
            ],
        ))
    }

    pub fn from_datum(datum: &PlutusData) -> Result<Self, LedgerError> {
        let mut fields = datum.expect_constr(Self::DATUM_TAG, Self::DATUM_ARITY)?;
        Ok(Self {
            pool_hash: ScriptHash::new(fields.bytes("pool_hash")?)?,
            borrowed_policy_id: PolicyId::new(fields.bytes("borrowed_policy_id")?)?,
            borrowed_asset_name: AssetName::new(fields.bytes("borrowed_asset_name")?)?,
            borrowed_amount: fields.u64("borrowed_amount")?,
            loan_nft_policy_id: PolicyId::new(fields.bytes("loan_nft_policy_id")?)?,
            collateral_rate: fields.u64("collateral_rate")?,
            collateral_asset: fields.bytes("collateral_asset")?.to_string(),
            collateral_amount: fields.u64("collateral_amount")?,
        })
    }
}
// ========== END LOAN POSITION ==========

/// Datum of a collateral deposit: `Constr1[owner_vkh]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralDeposit {
    pub owner: KeyHash,
}

impl CollateralDeposit {
    pub const DATUM_TAG: u64 = 1;

    pub fn to_datum(&self) -> PlutusData {
        PlutusData::constr(Self::DATUM_TAG, vec![PlutusData::bytes(self.owner.as_str())])
    }

    pub fn from_datum(datum: &PlutusData) -> Result<Self, LedgerError> {
        let mut fields = datum.expect_constr(Self::DATUM_TAG, 1)?;
        Ok(Self {
            owner: KeyHash::new(fields.bytes("owner")?)?,
        })
    }
}

/// Decoded pool datum. The constructor tag picks the shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolDatum {
    Loan(LoanPosition),
    Deposit(CollateralDeposit),
}

impl PoolDatum {
    pub fn decode(datum: &PlutusData) -> Result<Self, LedgerError> {
        match datum.as_constr().map(|(tag, _)| tag) {
            Some(LoanPosition::DATUM_TAG) => LoanPosition::from_datum(datum).map(PoolDatum::Loan),
            Some(CollateralDeposit::DATUM_TAG) => {
                CollateralDeposit::from_datum(datum).map(PoolDatum::Deposit)
            }
            Some(other) => Err(LedgerError::MalformedData(format!(
                "unknown pool datum constructor {other}"
            ))),
            None => Err(LedgerError::MalformedData("pool datum is not a constructor".into())),
        }
    }

    pub fn from_utxo(utxo: &Utxo) -> Result<Self, LedgerError> {
        let datum = utxo.datum().ok_or_else(|| {
            LedgerError::MalformedData(format!("pool UTxO {} has no inline datum", utxo.out_ref()))
        })?;
        Self::decode(datum)
    }
}

/// A deposit UTxO together with its decoded datum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositUtxo {
    pub utxo: Utxo,
    pub deposit: CollateralDeposit,
}

impl DepositUtxo {
    pub fn amount(&self) -> u64 {
        self.utxo.coin()
    }
}

/// A loan position UTxO together with its decoded datum and the id of the
/// loan NFT pair it was minted with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanUtxo {
    pub utxo: Utxo,
    pub position: LoanPosition,
    pub nft: LoanNftId,
}

impl LoanUtxo {
    /// Pairs a pool UTxO with its loan datum. The locked lovelace must match
    /// the recorded collateral and the UTxO must lock one reference token.
    pub fn new(utxo: Utxo, position: LoanPosition) -> Result<Self, LedgerError> {
        require!(
            utxo.coin() == position.collateral_amount,
            LedgerError::MalformedData(format!(
                "position {} locks {} lovelace but records {}",
                utxo.out_ref(),
                utxo.coin(),
                position.collateral_amount
            ))
        );
        let nft = LoanNftId::locked_in(&position.loan_nft_policy_id, utxo.value())?;
        Ok(Self { utxo, position, nft })
    }

    pub fn borrower_nft(&self) -> Result<AssetUnit, LedgerError> {
        self.nft.borrower_unit(&self.position.loan_nft_policy_id)
    }

    pub fn reference_nft(&self) -> Result<AssetUnit, LedgerError> {
        self.nft.reference_unit(&self.position.loan_nft_policy_id)
    }
}

fn int_field(value: u64) -> Result<PlutusData, FinancingError> {
    i64::try_from(value)
        .map(PlutusData::int)
        .map_err(|_| FinancingError::MathOverflow)
}
