use financing_engine::FinancingError;
use ledger_model::{AssetUnit, LedgerError, OutRef, PolicyId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("wallet cannot cover {unit}: have {available}, need {required}")]
    InsufficientWalletFunds {
        unit: String,
        available: u64,
        required: u64,
    },
    #[error("no spendable wallet UTxO carries {unit}")]
    MissingPresentedAsset { unit: AssetUnit },
    #[error("invalid collateral input: {0}")]
    InvalidCollateralInput(String),
    #[error("output {index} carries {lovelace} lovelace, below the minimum {minimum}")]
    DustOutput {
        index: usize,
        lovelace: u64,
        minimum: u64,
    },
    #[error("transaction does not balance in {unit}: inputs + mint {inputs}, outputs + burn + fee {outputs}")]
    Unbalanced {
        unit: String,
        inputs: u64,
        outputs: u64,
    },
    #[error("policy {policy_id} is given more than one redeemer")]
    ConflictingMintRedeemer { policy_id: PolicyId },
    #[error("script input {out_ref} has no inline datum")]
    MissingInlineDatum { out_ref: OutRef },
    #[error("script input {out_ref} is not locked at the collateral pool")]
    ForeignScriptInput { out_ref: OutRef },
    #[error("fee estimate overflowed")]
    FeeOverflow,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl AssemblyError {
    /// True for broken assembly invariants, as opposed to problems with the
    /// wallet the user can fix.
    pub fn is_internal(&self) -> bool {
        !matches!(
            self,
            AssemblyError::InsufficientWalletFunds { .. }
                | AssemblyError::MissingPresentedAsset { .. }
                | AssemblyError::InvalidCollateralInput(_)
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("wallet refused to sign: {0}")]
    Rejected(String),
    #[error("submission failed: {0}")]
    Submission(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error(transparent)]
    Financing(#[from] FinancingError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Signer(#[from] SignerError),
}
