use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

fn is_hex(s: &str) -> bool {
    s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Lower-case hex encoding of arbitrary bytes.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident, $len_ok:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(hex: impl Into<String>) -> Result<Self, LedgerError> {
                let hex = hex.into().to_ascii_lowercase();
                let len_ok: fn(usize) -> bool = $len_ok;
                if !is_hex(&hex) || !len_ok(hex.len()) {
                    return Err(LedgerError::InvalidHex {
                        kind: stringify!($name),
                        value: hex,
                    });
                }
                Ok(Self(hex))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = LedgerError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

hex_id!(
    /// Blake2b-256 transaction id.
    TxHash,
    |len| len == 64
);
hex_id!(
    /// Minting policy id (28-byte script hash).
    PolicyId,
    |len| len == 56
);
hex_id!(
    /// Hash of a spending validator.
    ScriptHash,
    |len| len == 56
);
hex_id!(
    /// Payment verification key hash.
    KeyHash,
    |len| len == 56
);
hex_id!(
    /// Asset name, at most 32 bytes.
    AssetName,
    |len| len <= 64
);

impl AssetName {
    pub fn from_utf8(name: &str) -> Result<Self, LedgerError> {
        Self::new(encode_hex(name.as_bytes()))
    }
}

/// Bech32 address, treated as opaque.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Result<Self, LedgerError> {
        let address = address.into();
        if address.is_empty() || address.chars().any(char::is_whitespace) {
            return Err(LedgerError::InvalidAddress(address));
        }
        Ok(Self(address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> String {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger reference to a transaction output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutRef {
    pub tx_hash: TxHash,
    pub output_index: u32,
}

impl OutRef {
    pub fn new(tx_hash: TxHash, output_index: u32) -> Self {
        Self {
            tx_hash,
            output_index,
        }
    }
}

impl fmt::Display for OutRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.output_index)
    }
}
