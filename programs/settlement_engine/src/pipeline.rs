use async_trait::async_trait;
use financing_engine::{LendingSession, LoanAction, PlannedTransition};
use ledger_model::{LedgerQuery, TxHash};
use log::info;
use serde::{Deserialize, Serialize};

use crate::assembly::{assemble, UnsignedTransaction};
use crate::error::{SettlementError, SignerError};

/// Witnessed transaction in the wallet's wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub cbor_hex: String,
}

/// Signing and submission belong to the user's wallet.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletSigner: Send + Sync {
    async fn sign(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction, SignerError>;

    async fn submit(&self, tx: &SignedTransaction) -> Result<TxHash, SignerError>;
}

/// A planned and assembled action waiting for the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedTransaction {
    pub planned: PlannedTransition,
    pub tx: UnsignedTransaction,
}

/// Runs an action end to end: read, plan, check freshness, assemble, sign, submit.
pub struct LendingClient<'a, Q: ?Sized, S: ?Sized> {
    session: LendingSession<'a, Q>,
    signer: &'a S,
}

impl<'a, Q, S> LendingClient<'a, Q, S>
where
    Q: LedgerQuery + ?Sized,
    S: WalletSigner + ?Sized,
{
    pub fn new(session: LendingSession<'a, Q>, signer: &'a S) -> Self {
        Self { session, signer }
    }

    pub fn session(&self) -> &LendingSession<'a, Q> {
        &self.session
    }

    pub async fn prepare(&self, action: &LoanAction) -> Result<PreparedTransaction, SettlementError> {
        let planned = self.session.plan(action).await?;
        self.session.ensure_fresh(&planned).await?;
        let tx = assemble(&planned.plan, self.session.deployment, self.session.wallet)?;
        Ok(PreparedTransaction { planned, tx })
    }

    /// Signs and submits. A rejected transaction is not retried; prepare again
    /// from fresh reads.
    pub async fn submit(&self, prepared: &PreparedTransaction) -> Result<TxHash, SettlementError> {
        let signed = self.signer.sign(&prepared.tx).await?;
        let tx_hash = self.signer.submit(&signed).await?;
        info!("✅ {:?} submitted as {}", prepared.planned.plan.action, tx_hash);
        Ok(tx_hash)
    }

    pub async fn execute(&self, action: &LoanAction) -> Result<TxHash, SettlementError> {
        let prepared = self.prepare(action).await?;
        self.submit(&prepared).await
    }
}
