use std::collections::BTreeSet;

use ledger_model::{AssetUnit, KeyHash, OutRef, Utxo};
use liquidation_engine::{assess, PositionHealth};
use log::debug;
use oracle_framework::ReferenceData;
use serde::{Deserialize, Serialize};

use crate::calculator::{collateral_rate, compute_loan, LoanQuote};
use crate::deployment::ProtocolDeployment;
use crate::error::FinancingError;
use crate::nft::LoanNftId;
use crate::position::{DepositUtxo, LoanPosition, LoanUtxo, PoolDatum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountPhase {
    NoAccount,
    HasDeposit,
    HasLoan,
}

/// One owner's slice of the collateral pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub owner: KeyHash,
    /// Sorted by out-ref.
    pub deposits: Vec<DepositUtxo>,
    /// Positions the wallet controls through the loan NFT, sorted by out-ref.
    pub loans: Vec<LoanUtxo>,
}

impl AccountState {
    /// Picks the owner's deposits and the deployment's loan positions whose
    /// borrower token is in `held` out of the pool UTxOs. Anything else is skipped.
    pub fn scan(
        owner: &KeyHash,
        deployment: &ProtocolDeployment,
        pool_utxos: impl IntoIterator<Item = Utxo>,
        held: &BTreeSet<LoanNftId>,
    ) -> Self {
        let mut deposits = Vec::new();
        let mut loans = Vec::new();
        for utxo in pool_utxos {
            match PoolDatum::from_utxo(&utxo) {
                Ok(PoolDatum::Deposit(deposit)) if &deposit.owner == owner => {
                    deposits.push(DepositUtxo { utxo, deposit });
                }
                Ok(PoolDatum::Loan(position)) if deployment.issued(&position) => {
                    match LoanUtxo::new(utxo, position) {
                        Ok(loan) if held.contains(&loan.nft) => loans.push(loan),
                        Ok(_) => {}
                        Err(e) => debug!("Skipping pool UTxO: {}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("Skipping pool UTxO {}: {}", utxo.out_ref(), e),
            }
        }
        deposits.sort_by(|a, b| a.utxo.out_ref().cmp(b.utxo.out_ref()));
        loans.sort_by(|a, b| a.utxo.out_ref().cmp(b.utxo.out_ref()));

        Self {
            owner: owner.clone(),
            deposits,
            loans,
        }
    }

    /// Slot holding only the position a liquidator targets.
    pub fn liquidation_target(liquidator: &KeyHash, target: LoanUtxo) -> Self {
        Self {
            owner: liquidator.clone(),
            deposits: Vec::new(),
            loans: vec![target],
        }
    }

    pub fn phase(&self) -> AccountPhase {
        if !self.loans.is_empty() {
            AccountPhase::HasLoan
        } else if !self.deposits.is_empty() {
            AccountPhase::HasDeposit
        } else {
            AccountPhase::NoAccount
        }
    }

    pub fn deposit_total(&self) -> Result<u64, FinancingError> {
        self.deposits.iter().try_fold(0u64, |acc, d| {
            acc.checked_add(d.amount()).ok_or(FinancingError::MathOverflow)
        })
    }

    /// Deposit total, failing with `AccountNotFound` when there is none.
    pub fn require_deposit(&self) -> Result<u64, FinancingError> {
        if self.deposits.is_empty() {
            return Err(FinancingError::AccountNotFound {
                owner: self.owner.to_string(),
            });
        }
        self.deposit_total()
    }

    pub fn loan(&self, out_ref: &OutRef) -> Result<&LoanUtxo, FinancingError> {
        self.loans
            .iter()
            .find(|loan| loan.utxo.out_ref() == out_ref)
            .ok_or_else(|| FinancingError::PositionNotFound {
                out_ref: out_ref.clone(),
            })
    }
}

/// A listed position with its health at the live rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionView {
    pub out_ref: OutRef,
    /// Borrower token controlling the position.
    pub loan_nft: AssetUnit,
    pub position: LoanPosition,
    pub live_rate: u64,
    pub health: PositionHealth,
}

pub fn list_positions(
    account: &AccountState,
    references: &ReferenceData,
) -> Result<Vec<PositionView>, FinancingError> {
    let live_rate = collateral_rate(&references.oracle)?;
    account
        .loans
        .iter()
        .map(|loan| {
            let health = assess(
                loan.position.collateral_amount,
                loan.position.borrowed_amount,
                live_rate,
                &references.parameters,
            )?;
            Ok(PositionView {
                out_ref: loan.utxo.out_ref().clone(),
                loan_nft: loan.borrower_nft()?,
                position: loan.position.clone(),
                live_rate,
                health,
            })
        })
        .collect()
}

/// Largest loan the current deposit supports.
pub fn quote_max_borrow(
    account: &AccountState,
    references: &ReferenceData,
) -> Result<LoanQuote, FinancingError> {
    let deposit = account.require_deposit()?;
    Ok(compute_loan(&references.oracle, &references.parameters, deposit)?)
}
