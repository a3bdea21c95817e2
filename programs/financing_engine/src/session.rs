use ledger_model::{Address, KeyHash, LedgerError, LedgerQuery, OutRef, Utxo, Value};
use log::{info, warn};
use oracle_framework::{ensure_live, read_reference_data, OracleError, ReferenceData};
use serde::{Deserialize, Serialize};

use crate::account::{list_positions, quote_max_borrow, AccountState, PositionView};
use crate::calculator::LoanQuote;
use crate::deployment::ProtocolDeployment;
use crate::error::FinancingError;
use crate::lifecycle::{plan_transition, LoanAction, PlanningContext};
use crate::nft::LoanNftId;
use crate::plan::TransitionPlan;
use crate::position::{LoanUtxo, PoolDatum};

/// Wallet identity and spendable UTxOs, supplied by the wallet collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletContext {
    pub address: Address,
    pub key_hash: KeyHash,
    /// Pure-ADA UTxO set aside as script collateral. Never selected as an input.
    pub collateral: Utxo,
    pub utxos: Vec<Utxo>,
}

impl WalletContext {
    /// Wallet UTxOs available to coin selection.
    pub fn spendable(&self) -> impl Iterator<Item = &Utxo> {
        self.utxos
            .iter()
            .filter(move |utxo| utxo.out_ref() != self.collateral.out_ref())
    }

    pub fn holdings(&self) -> Result<Value, LedgerError> {
        Value::sum(self.spendable().map(Utxo::value))
    }
}

/// Everything planned for one action from a single snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTransition {
    pub references: ReferenceData,
    pub account: AccountState,
    pub plan: TransitionPlan,
}

/// Explicit per-request context: deployment, wallet and ledger handle.
pub struct LendingSession<'a, Q: ?Sized> {
    pub deployment: &'a ProtocolDeployment,
    pub wallet: &'a WalletContext,
    pub ledger: &'a Q,
}

impl<'a, Q> LendingSession<'a, Q>
where
    Q: LedgerQuery + ?Sized,
{
    pub fn new(deployment: &'a ProtocolDeployment, wallet: &'a WalletContext, ledger: &'a Q) -> Self {
        Self {
            deployment,
            wallet,
            ledger,
        }
    }

    pub async fn read_references(&self) -> Result<ReferenceData, FinancingError> {
        Ok(read_reference_data(self.ledger, &self.deployment.reference_refs()).await?)
    }

    /// The wallet owner's deposits plus the positions whose borrower token
    /// the wallet holds.
    pub async fn load_account(&self) -> Result<AccountState, FinancingError> {
        let pool_utxos = self.ledger.utxos_at(self.deployment.pool_address()).await?;
        let held = LoanNftId::held_in(&self.deployment.loan_nft.policy_id, &self.wallet.holdings()?);
        let account = AccountState::scan(&self.wallet.key_hash, self.deployment, pool_utxos, &held);
        info!(
            "✅ Account {} loaded: {} deposits, {} positions",
            account.owner,
            account.deposits.len(),
            account.loans.len()
        );
        Ok(account)
    }

    /// Any open position of the deployment, whoever holds its borrower token.
    pub async fn load_position(&self, out_ref: &OutRef) -> Result<LoanUtxo, FinancingError> {
        let not_found = || FinancingError::PositionNotFound {
            out_ref: out_ref.clone(),
        };
        let utxo = self.ledger.utxo(out_ref).await?.ok_or_else(not_found)?;
        if utxo.output.address != *self.deployment.pool_address() {
            return Err(not_found());
        }
        match PoolDatum::from_utxo(&utxo)? {
            PoolDatum::Loan(position) if self.deployment.issued(&position) => {
                Ok(LoanUtxo::new(utxo, position)?)
            }
            _ => Err(not_found()),
        }
    }

    pub fn planning_context<'b>(&'b self, references: &'b ReferenceData) -> Result<PlanningContext<'b>, FinancingError> {
        Ok(PlanningContext {
            deployment: self.deployment,
            references,
            owner: self.wallet.key_hash.clone(),
            wallet_address: self.wallet.address.clone(),
            wallet_holdings: self.wallet.holdings()?,
        })
    }

    /// Reads references and the account slot, then plans `action`.
    pub async fn plan(&self, action: &LoanAction) -> Result<PlannedTransition, FinancingError> {
        let references = self.read_references().await?;
        let account = match action {
            LoanAction::Liquidate { position } => {
                let target = self.load_position(position).await?;
                AccountState::liquidation_target(&self.wallet.key_hash, target)
            }
            _ => self.load_account().await?,
        };
        let plan = plan_transition(&self.planning_context(&references)?, &account, action)?;
        Ok(PlannedTransition {
            references,
            account,
            plan,
        })
    }

    /// Fails when a reference or a consumed pool UTxO was spent since it was read.
    pub async fn ensure_fresh(&self, planned: &PlannedTransition) -> Result<(), FinancingError> {
        ensure_live(self.ledger, &planned.references)
            .await
            .map_err(|e| match e {
                stale @ OracleError::StaleReference { .. } => {
                    FinancingError::StaleOracleData(stale)
                }
                other => FinancingError::Oracle(other),
            })?;
        for out_ref in planned.plan.spent_out_refs() {
            if self.ledger.utxo(out_ref).await?.is_none() {
                warn!("Pool UTxO {} spent since planning", out_ref);
                return Err(FinancingError::StaleAccountState {
                    out_ref: out_ref.clone(),
                });
            }
        }
        Ok(())
    }

    pub async fn quote_max_borrow(&self) -> Result<LoanQuote, FinancingError> {
        let references = self.read_references().await?;
        let account = self.load_account().await?;
        quote_max_borrow(&account, &references)
    }

    pub async fn list_loan_positions(&self) -> Result<Vec<PositionView>, FinancingError> {
        let references = self.read_references().await?;
        let account = self.load_account().await?;
        list_positions(&account, &references)
    }
}
