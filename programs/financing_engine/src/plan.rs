use ledger_model::{Address, AssetUnit, KeyHash, LedgerError, OutRef, PlutusData, Utxo, Value};
use serde::{Deserialize, Serialize};

use crate::error::FinancingError;
use crate::position::LoanPosition;
use crate::redeemer::{CollateralRedeemer, MintRedeemer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Deposit,
    Borrow,
    IncreaseCollateral,
    PartialRepay,
    Repay,
    PartialWithdraw,
    Withdraw,
    Liquidate,
}

/// A pool UTxO consumed through the collateral validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSpend {
    pub utxo: Utxo,
    pub redeemer: CollateralRedeemer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyRole {
    LoanNft,
    LoanToken,
}

/// Signed mint quantity under one of the deployment's policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintEntry {
    pub role: PolicyRole,
    pub unit: AssetUnit,
    pub quantity: i64,
    pub redeemer: MintRedeemer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputRole {
    LoanPosition,
    Deposit,
    BorrowerProceeds,
    TreasuryRemainder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedOutput {
    pub role: OutputRole,
    pub address: Address,
    pub value: Value,
    pub datum: Option<PlutusData>,
}

/// The complete state change of one action, ready to be rendered into a
/// transaction. Plans are never mutated after planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPlan {
    pub action: ActionKind,
    pub spends: Vec<ScriptSpend>,
    pub mints: Vec<MintEntry>,
    pub outputs: Vec<PlannedOutput>,
    pub reference_inputs: Vec<OutRef>,
    pub required_signers: Vec<KeyHash>,
    /// Units the wallet must spend and receive back as proof of control.
    pub presented: Vec<AssetUnit>,
    /// Lovelace leaving protocol custody to the transaction's wallet.
    pub released_lovelace: u64,
}

impl TransitionPlan {
    pub fn new(action: ActionKind, reference_inputs: Vec<OutRef>) -> Self {
        Self {
            action,
            spends: Vec::new(),
            mints: Vec::new(),
            outputs: Vec::new(),
            reference_inputs,
            required_signers: Vec::new(),
            presented: Vec::new(),
            released_lovelace: 0,
        }
    }

    pub fn consumed_lovelace(&self) -> Result<u64, FinancingError> {
        self.spends.iter().try_fold(0u64, |acc, spend| {
            acc.checked_add(spend.utxo.coin())
                .ok_or(FinancingError::MathOverflow)
        })
    }

    pub fn produced_lovelace(&self) -> Result<u64, FinancingError> {
        self.outputs.iter().try_fold(0u64, |acc, output| {
            acc.checked_add(output.value.coin())
                .ok_or(FinancingError::MathOverflow)
        })
    }

    /// Lovelace the wallet adds so that
    /// `consumed + contribution = produced + released`.
    pub fn wallet_contribution(&self) -> Result<u64, FinancingError> {
        let owed = self
            .produced_lovelace()?
            .checked_add(self.released_lovelace)
            .ok_or(FinancingError::MathOverflow)?;
        owed.checked_sub(self.consumed_lovelace()?).ok_or_else(|| {
            FinancingError::Ledger(LedgerError::MalformedData(format!(
                "plan releases less than it consumes: produced + released {owed}"
            )))
        })
    }

    pub fn outputs_with_role(&self, role: OutputRole) -> impl Iterator<Item = &PlannedOutput> {
        self.outputs.iter().filter(move |output| output.role == role)
    }

    /// Decoded datum of the produced loan position, if any.
    pub fn produced_position(&self) -> Option<LoanPosition> {
        self.outputs_with_role(OutputRole::LoanPosition)
            .find_map(|output| output.datum.as_ref())
            .and_then(|datum| LoanPosition::from_datum(datum).ok())
    }

    pub fn spent_out_refs(&self) -> impl Iterator<Item = &OutRef> {
        self.spends.iter().map(|spend| spend.utxo.out_ref())
    }
}
