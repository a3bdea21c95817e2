//! Per-position loan NFT names.
//!
//! Each Borrow mints a pair under the loan NFT policy sharing one 28-byte
//! suffix: the borrower token, sent to the wallet and presented to mutate or
//! close the position, and the reference token, locked in the position UTxO
//! so the position names its own borrower token. Labels follow CIP-68.

use std::collections::BTreeSet;

use ledger_model::{AssetName, AssetUnit, LedgerError, OutRef, PolicyId, Value};
use serde::{Deserialize, Serialize};

/// Prefix of the token held by the borrower (CIP-68 label 222).
pub const BORROWER_LABEL: &str = "000de140";
/// Prefix of the token locked with the position (CIP-68 label 100).
pub const REFERENCE_LABEL: &str = "000643b0";

const ID_HEX_LEN: usize = 56;
const SEED_HASH_HEX_LEN: usize = 48;

/// Suffix shared by the two tokens of one position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanNftId(String);

impl LoanNftId {
    /// Id for the position created by spending `seed`. An output is spent at
    /// most once, so two positions never share an id.
    pub fn from_seed(seed: &OutRef) -> Self {
        let hash = seed.tx_hash.as_str();
        Self(format!(
            "{}{:08x}",
            &hash[..SEED_HASH_HEX_LEN],
            seed.output_index
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn labelled(&self, policy_id: &PolicyId, label: &str) -> Result<AssetUnit, LedgerError> {
        let name = AssetName::new(format!("{label}{}", self.0))?;
        Ok(AssetUnit::new(policy_id.clone(), name))
    }

    pub fn borrower_unit(&self, policy_id: &PolicyId) -> Result<AssetUnit, LedgerError> {
        self.labelled(policy_id, BORROWER_LABEL)
    }

    pub fn reference_unit(&self, policy_id: &PolicyId) -> Result<AssetUnit, LedgerError> {
        self.labelled(policy_id, REFERENCE_LABEL)
    }

    fn parse(unit: &AssetUnit, policy_id: &PolicyId, label: &str) -> Option<Self> {
        if &unit.policy_id != policy_id {
            return None;
        }
        unit.asset_name
            .as_str()
            .strip_prefix(label)
            .filter(|id| id.len() == ID_HEX_LEN)
            .map(|id| Self(id.to_string()))
    }

    /// Ids of every borrower token under `policy_id` in `value`.
    pub fn held_in(policy_id: &PolicyId, value: &Value) -> BTreeSet<Self> {
        value
            .assets()
            .filter_map(|(unit, _)| Self::parse(unit, policy_id, BORROWER_LABEL))
            .collect()
    }

    /// The id of the single reference token a position UTxO locks.
    pub fn locked_in(policy_id: &PolicyId, value: &Value) -> Result<Self, LedgerError> {
        let mut ids = value
            .assets()
            .filter_map(|(unit, quantity)| {
                Self::parse(unit, policy_id, REFERENCE_LABEL).map(|id| (id, quantity))
            });
        match (ids.next(), ids.next()) {
            (Some((id, 1)), None) => Ok(id),
            (None, _) => Err(LedgerError::MalformedData(
                "position locks no loan NFT reference token".into(),
            )),
            _ => Err(LedgerError::MalformedData(
                "position must lock exactly one loan NFT reference token".into(),
            )),
        }
    }
}

impl std::fmt::Display for LoanNftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
