use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::types::{Address, OutRef};
use crate::utxo::{TxOutput, Utxo};
use crate::value::AssetUnit;

/// Read-only view of the ledger's UTxO set. Implemented by network providers
/// outside this workspace; freshness of the answers is the provider's policy.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    async fn utxos_at(&self, address: &Address) -> Result<Vec<Utxo>, LedgerError>;

    async fn utxos_with_unit(&self, unit: &AssetUnit) -> Result<Vec<Utxo>, LedgerError>;

    /// `Ok(None)` when the output does not exist or has been spent.
    async fn utxo(&self, out_ref: &OutRef) -> Result<Option<Utxo>, LedgerError>;
}

/// In-memory UTxO set, loadable from a JSON dump of `Utxo`s.
#[derive(Debug, Clone, Default)]
pub struct SnapshotLedger {
    utxos: BTreeMap<OutRef, TxOutput>,
}

impl SnapshotLedger {
    pub fn new(utxos: impl IntoIterator<Item = Utxo>) -> Self {
        let mut ledger = Self::default();
        for utxo in utxos {
            ledger.insert(utxo);
        }
        ledger
    }

    pub fn from_json_str(json: &str) -> Result<Self, LedgerError> {
        let utxos: Vec<Utxo> =
            serde_json::from_str(json).map_err(|e| LedgerError::Snapshot(e.to_string()))?;
        Ok(Self::new(utxos))
    }

    pub fn insert(&mut self, utxo: Utxo) {
        self.utxos.insert(utxo.input, utxo.output);
    }

    /// Removes an output, as a confirmed spend would.
    pub fn spend(&mut self, out_ref: &OutRef) -> Option<Utxo> {
        self.utxos.remove(out_ref).map(|output| Utxo {
            input: out_ref.clone(),
            output,
        })
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    fn filtered(&self, keep: impl Fn(&TxOutput) -> bool) -> Vec<Utxo> {
        self.utxos
            .iter()
            .filter(|(_, output)| keep(output))
            .map(|(input, output)| Utxo {
                input: input.clone(),
                output: output.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl LedgerQuery for SnapshotLedger {
    async fn utxos_at(&self, address: &Address) -> Result<Vec<Utxo>, LedgerError> {
        Ok(self.filtered(|output| &output.address == address))
    }

    async fn utxos_with_unit(&self, unit: &AssetUnit) -> Result<Vec<Utxo>, LedgerError> {
        Ok(self.filtered(|output| output.amount.quantity_of(unit) > 0))
    }

    async fn utxo(&self, out_ref: &OutRef) -> Result<Option<Utxo>, LedgerError> {
        Ok(self.utxos.get(out_ref).map(|output| Utxo {
            input: out_ref.clone(),
            output: output.clone(),
        }))
    }
}
