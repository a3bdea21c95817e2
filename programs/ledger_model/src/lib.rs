//! UTxO ledger primitives shared by the Statera off-chain crates: identifiers,
//! multi-asset values, structured (Plutus) data and the ledger query seam.

pub mod error;
pub mod plutus;
pub mod query;
pub mod types;
pub mod utxo;
pub mod value;

pub use error::LedgerError;
pub use plutus::{ConstrFields, PlutusData, PlutusPair};
pub use query::{LedgerQuery, SnapshotLedger};
pub use types::{encode_hex, Address, AssetName, KeyHash, OutRef, PolicyId, ScriptHash, TxHash};
pub use utxo::{TxOutput, Utxo};
pub use value::{Asset, AssetUnit, Value, LOVELACE_UNIT};

/// Early-return guard used across the workspace: `require!(cond, Error::Variant)`.
#[macro_export]
macro_rules! require {
    ($cond:expr, $err:expr $(,)?) => {
        if !($cond) {
            return Err($err.into());
        }
    };
}
