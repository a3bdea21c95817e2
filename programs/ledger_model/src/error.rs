use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid {kind}: {value:?}")]
    InvalidHex { kind: &'static str, value: String },
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
    #[error("invalid asset unit: {0:?}")]
    InvalidAssetUnit(String),
    #[error("invalid quantity {quantity:?} for unit {unit}")]
    InvalidQuantity { unit: String, quantity: String },
    #[error("value overflow while adding {unit}")]
    ValueOverflow { unit: String },
    #[error("insufficient {unit}: have {available}, need {required}")]
    InsufficientValue {
        unit: String,
        available: u64,
        required: u64,
    },
    #[error("malformed structured data: {0}")]
    MalformedData(String),
    #[error("ledger snapshot could not be parsed: {0}")]
    Snapshot(String),
    #[error("ledger provider failure: {0}")]
    Provider(String),
}
