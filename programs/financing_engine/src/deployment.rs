use std::fs;
use std::path::Path;

use ledger_model::{require, Address, AssetName, AssetUnit, OutRef, PolicyId, ScriptHash};
use log::info;
use oracle_framework::ReferenceRefs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::position::LoanPosition;

pub const DEFAULT_MIN_OUTPUT_LOVELACE: u64 = 2_000_000;
pub const DEFAULT_COLLATERAL_PERCENTAGE: u64 = 150;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlutusVersion {
    V1,
    V2,
    #[default]
    V3,
}

/// Compiled script as its CBOR hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlutusScript {
    pub cbor: String,
    #[serde(default)]
    pub version: PlutusVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollateralValidator {
    pub address: Address,
    pub script_hash: ScriptHash,
    pub script: PlutusScript,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintingPolicy {
    pub policy_id: PolicyId,
    pub asset_name: AssetName,
    pub script: PlutusScript,
}

impl MintingPolicy {
    pub fn unit(&self) -> AssetUnit {
        AssetUnit::new(self.policy_id.clone(), self.asset_name.clone())
    }
}

/// Loan NFT policy. Asset names are per position, see [`crate::nft`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanNftPolicy {
    pub policy_id: PolicyId,
    pub script: PlutusScript,
}

/// Linear fee estimate in lovelace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeModel {
    pub base: u64,
    pub per_input: u64,
    pub per_output: u64,
    pub per_redeemer: u64,
    pub per_reference_input: u64,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            base: 200_000,
            per_input: 20_000,
            per_output: 15_000,
            per_redeemer: 150_000,
            per_reference_input: 5_000,
        }
    }
}

/// Shape of a transaction as far as the fee is concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxShape {
    pub inputs: usize,
    pub outputs: usize,
    pub redeemers: usize,
    pub reference_inputs: usize,
}

impl FeeModel {
    pub fn estimate(&self, shape: TxShape) -> Option<u64> {
        let term = |count: usize, price: u64| (count as u64).checked_mul(price);
        self.base
            .checked_add(term(shape.inputs, self.per_input)?)?
            .checked_add(term(shape.outputs, self.per_output)?)?
            .checked_add(term(shape.redeemers, self.per_redeemer)?)?
            .checked_add(term(shape.reference_inputs, self.per_reference_input)?)
    }
}

/// Everything the off-chain code needs to know about one protocol deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDeployment {
    pub collateral_validator: CollateralValidator,
    pub loan_nft: LoanNftPolicy,
    pub loan_token: MintingPolicy,
    pub oracle: OutRef,
    pub protocol_parameters: OutRef,
    pub treasury_address: Address,
    #[serde(default = "default_min_output_lovelace")]
    pub min_output_lovelace: u64,
    /// Collateral input must cover this percentage of the fee.
    #[serde(default = "default_collateral_percentage")]
    pub collateral_percentage: u64,
    #[serde(default)]
    pub fee_model: FeeModel,
}

fn default_min_output_lovelace() -> u64 {
    DEFAULT_MIN_OUTPUT_LOVELACE
}

fn default_collateral_percentage() -> u64 {
    DEFAULT_COLLATERAL_PERCENTAGE
}

impl ProtocolDeployment {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let deployment: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Load(format!("could not parse deployment: {e}")))?;
        deployment.validate()?;
        Ok(deployment)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("could not read {}: {e}", path.display())))?;
        let deployment = Self::from_json_str(&json)?;
        info!("✅ Deployment loaded from {}", path.display());
        Ok(deployment)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, script) in [
            ("collateral validator", &self.collateral_validator.script),
            ("loan NFT policy", &self.loan_nft.script),
            ("loan token policy", &self.loan_token.script),
        ] {
            require!(
                !script.cbor.is_empty()
                    && script.cbor.len() % 2 == 0
                    && script.cbor.bytes().all(|b| b.is_ascii_hexdigit()),
                ConfigError::Invalid(format!("{name} script is not CBOR hex"))
            );
        }
        require!(
            self.loan_nft.policy_id != self.loan_token.policy_id,
            ConfigError::Invalid("loan NFT and loan token must use distinct policies".into())
        );
        require!(
            self.oracle != self.protocol_parameters,
            ConfigError::Invalid("oracle and protocol parameters must be distinct UTxOs".into())
        );
        require!(
            self.min_output_lovelace > 0,
            ConfigError::Invalid("minimum output lovelace must be positive".into())
        );
        require!(
            self.collateral_percentage > 0,
            ConfigError::Invalid("collateral percentage must be positive".into())
        );
        Ok(())
    }

    pub fn loan_token_unit(&self) -> AssetUnit {
        self.loan_token.unit()
    }

    /// Whether `position` was opened under this deployment's policies.
    pub fn issued(&self, position: &LoanPosition) -> bool {
        position.loan_nft_policy_id == self.loan_nft.policy_id
            && position.borrowed_unit() == self.loan_token_unit()
    }

    pub fn reference_refs(&self) -> ReferenceRefs {
        ReferenceRefs {
            oracle: self.oracle.clone(),
            parameters: self.protocol_parameters.clone(),
            priced_unit: self.loan_token_unit(),
        }
    }

    pub fn pool_address(&self) -> &Address {
        &self.collateral_validator.address
    }
}
