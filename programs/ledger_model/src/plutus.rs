//! Structured on-chain data in the detailed JSON schema
//! (`{"constructor":n,"fields":[..]}`, `{"int":n}`, `{"bytes":"hex"}`, ...).

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlutusData {
    Constr {
        constructor: u64,
        fields: Vec<PlutusData>,
    },
    Map {
        map: Vec<PlutusPair>,
    },
    List {
        list: Vec<PlutusData>,
    },
    Int {
        int: i64,
    },
    Bytes {
        bytes: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlutusPair {
    pub k: PlutusData,
    pub v: PlutusData,
}

impl PlutusData {
    pub fn constr(constructor: u64, fields: Vec<PlutusData>) -> Self {
        PlutusData::Constr {
            constructor,
            fields,
        }
    }

    /// Constructor without fields, the shape of every action redeemer.
    pub fn tag(constructor: u64) -> Self {
        Self::constr(constructor, Vec::new())
    }

    pub fn int(int: i64) -> Self {
        PlutusData::Int { int }
    }

    pub fn bytes(hex: impl Into<String>) -> Self {
        PlutusData::Bytes { bytes: hex.into() }
    }

    pub fn as_constr(&self) -> Option<(u64, &[PlutusData])> {
        match self {
            PlutusData::Constr {
                constructor,
                fields,
            } => Some((*constructor, fields.as_slice())),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PlutusData::Int { int } => Some(*int),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&str> {
        match self {
            PlutusData::Bytes { bytes } => Some(bytes),
            _ => None,
        }
    }

    /// Opens a positional record, checking constructor tag and arity.
    pub fn expect_constr(&self, tag: u64, arity: usize) -> Result<ConstrFields<'_>, LedgerError> {
        let (constructor, fields) = self
            .as_constr()
            .ok_or_else(|| LedgerError::MalformedData("expected a constructor".into()))?;
        if constructor != tag {
            return Err(LedgerError::MalformedData(format!(
                "expected constructor {tag}, found {constructor}"
            )));
        }
        if fields.len() != arity {
            return Err(LedgerError::MalformedData(format!(
                "constructor {tag} expects {arity} fields, found {}",
                fields.len()
            )));
        }
        Ok(ConstrFields { fields, next: 0 })
    }
}

/// Cursor over the fields of a positional record.
pub struct ConstrFields<'a> {
    fields: &'a [PlutusData],
    next: usize,
}

impl<'a> ConstrFields<'a> {
    fn field(&mut self, name: &str) -> Result<&'a PlutusData, LedgerError> {
        let field = self
            .fields
            .get(self.next)
            .ok_or_else(|| LedgerError::MalformedData(format!("missing field {name}")))?;
        self.next += 1;
        Ok(field)
    }

    pub fn int(&mut self, name: &str) -> Result<i64, LedgerError> {
        self.field(name)?
            .as_int()
            .ok_or_else(|| LedgerError::MalformedData(format!("field {name} is not an integer")))
    }

    /// Non-negative integer field.
    pub fn u64(&mut self, name: &str) -> Result<u64, LedgerError> {
        let int = self.int(name)?;
        u64::try_from(int)
            .map_err(|_| LedgerError::MalformedData(format!("field {name} is negative: {int}")))
    }

    pub fn bytes(&mut self, name: &str) -> Result<&'a str, LedgerError> {
        self.field(name)?
            .as_bytes()
            .ok_or_else(|| LedgerError::MalformedData(format!("field {name} is not bytes")))
    }
}
