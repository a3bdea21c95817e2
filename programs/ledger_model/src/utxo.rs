use serde::{Deserialize, Serialize};

use crate::plutus::PlutusData;
use crate::types::{Address, OutRef};
use crate::value::Value;

/// An unspent output as returned by the ledger query collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub input: OutRef,
    pub output: TxOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutput {
    pub address: Address,
    pub amount: Value,
    /// Inline datum, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plutus_data: Option<PlutusData>,
}

impl Utxo {
    pub fn new(input: OutRef, address: Address, amount: Value) -> Self {
        Self {
            input,
            output: TxOutput {
                address,
                amount,
                plutus_data: None,
            },
        }
    }

    pub fn with_datum(mut self, datum: PlutusData) -> Self {
        self.output.plutus_data = Some(datum);
        self
    }

    pub fn out_ref(&self) -> &OutRef {
        &self.input
    }

    pub fn value(&self) -> &Value {
        &self.output.amount
    }

    pub fn coin(&self) -> u64 {
        self.output.amount.coin()
    }

    pub fn datum(&self) -> Option<&PlutusData> {
        self.output.plutus_data.as_ref()
    }
}
