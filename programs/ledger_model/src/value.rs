use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::types::{AssetName, PolicyId};

pub const LOVELACE_UNIT: &str = "lovelace";

/// Native asset identifier: policy id followed by the hex asset name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetUnit {
    pub policy_id: PolicyId,
    pub asset_name: AssetName,
}

impl AssetUnit {
    pub fn new(policy_id: PolicyId, asset_name: AssetName) -> Self {
        Self {
            policy_id,
            asset_name,
        }
    }

    /// Parses the concatenated `policy_id ++ asset_name` form used on the wire.
    pub fn parse(unit: &str) -> Result<Self, LedgerError> {
        if unit.len() < 56 || !unit.is_char_boundary(56) {
            return Err(LedgerError::InvalidAssetUnit(unit.to_string()));
        }
        let (policy, name) = unit.split_at(56);
        let policy_id =
            PolicyId::new(policy).map_err(|_| LedgerError::InvalidAssetUnit(unit.to_string()))?;
        let asset_name =
            AssetName::new(name).map_err(|_| LedgerError::InvalidAssetUnit(unit.to_string()))?;
        Ok(Self::new(policy_id, asset_name))
    }
}

impl fmt::Display for AssetUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.policy_id, self.asset_name)
    }
}

/// Wire form of one entry of a UTxO amount list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub unit: String,
    pub quantity: String,
}

/// Lovelace plus a bundle of native assets. Zero entries are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Asset>", into = "Vec<Asset>")]
pub struct Value {
    lovelace: u64,
    assets: BTreeMap<AssetUnit, u64>,
}

impl Value {
    pub fn lovelace(lovelace: u64) -> Self {
        Self {
            lovelace,
            assets: BTreeMap::new(),
        }
    }

    pub fn with_asset(mut self, unit: AssetUnit, quantity: u64) -> Self {
        if quantity > 0 {
            self.assets.insert(unit, quantity);
        }
        self
    }

    pub fn coin(&self) -> u64 {
        self.lovelace
    }

    pub fn quantity_of(&self, unit: &AssetUnit) -> u64 {
        self.assets.get(unit).copied().unwrap_or(0)
    }

    pub fn assets(&self) -> impl Iterator<Item = (&AssetUnit, u64)> {
        self.assets.iter().map(|(unit, quantity)| (unit, *quantity))
    }

    pub fn is_pure_ada(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn is_zero(&self) -> bool {
        self.lovelace == 0 && self.assets.is_empty()
    }

    pub fn checked_add(&self, other: &Value) -> Result<Value, LedgerError> {
        let mut sum = self.clone();
        sum.lovelace = sum
            .lovelace
            .checked_add(other.lovelace)
            .ok_or_else(|| LedgerError::ValueOverflow {
                unit: LOVELACE_UNIT.to_string(),
            })?;
        for (unit, quantity) in other.assets() {
            let entry = sum.assets.entry(unit.clone()).or_insert(0);
            *entry = entry
                .checked_add(quantity)
                .ok_or_else(|| LedgerError::ValueOverflow {
                    unit: unit.to_string(),
                })?;
        }
        Ok(sum)
    }

    pub fn checked_sub(&self, other: &Value) -> Result<Value, LedgerError> {
        let mut rest = self.clone();
        rest.lovelace = rest.lovelace.checked_sub(other.lovelace).ok_or_else(|| {
            LedgerError::InsufficientValue {
                unit: LOVELACE_UNIT.to_string(),
                available: self.lovelace,
                required: other.lovelace,
            }
        })?;
        for (unit, quantity) in other.assets() {
            let available = rest.quantity_of(unit);
            let left = available
                .checked_sub(quantity)
                .ok_or_else(|| LedgerError::InsufficientValue {
                    unit: unit.to_string(),
                    available,
                    required: quantity,
                })?;
            if left == 0 {
                rest.assets.remove(unit);
            } else {
                rest.assets.insert(unit.clone(), left);
            }
        }
        Ok(rest)
    }

    /// True when every quantity in `other` is available in `self`.
    pub fn covers(&self, other: &Value) -> bool {
        self.lovelace >= other.lovelace
            && other
                .assets()
                .all(|(unit, quantity)| self.quantity_of(unit) >= quantity)
    }

    /// Units present in `self` whose quantity exceeds what `other` holds.
    pub fn missing_from(&self, other: &Value) -> Vec<AssetUnit> {
        self.assets()
            .filter(|(unit, quantity)| other.quantity_of(unit) < *quantity)
            .map(|(unit, _)| unit.clone())
            .collect()
    }

    pub fn sum<'a>(values: impl IntoIterator<Item = &'a Value>) -> Result<Value, LedgerError> {
        values
            .into_iter()
            .try_fold(Value::default(), |acc, value| acc.checked_add(value))
    }
}

impl TryFrom<Vec<Asset>> for Value {
    type Error = LedgerError;

    fn try_from(amount: Vec<Asset>) -> Result<Self, Self::Error> {
        let mut value = Value::default();
        for asset in amount {
            let quantity: u64 =
                asset
                    .quantity
                    .parse()
                    .map_err(|_| LedgerError::InvalidQuantity {
                        unit: asset.unit.clone(),
                        quantity: asset.quantity.clone(),
                    })?;
            let entry = if asset.unit == LOVELACE_UNIT {
                Value::lovelace(quantity)
            } else {
                Value::default().with_asset(AssetUnit::parse(&asset.unit)?, quantity)
            };
            value = value.checked_add(&entry)?;
        }
        Ok(value)
    }
}

impl From<Value> for Vec<Asset> {
    fn from(value: Value) -> Self {
        let mut amount = vec![Asset {
            unit: LOVELACE_UNIT.to_string(),
            quantity: value.lovelace.to_string(),
        }];
        amount.extend(value.assets.into_iter().map(|(unit, quantity)| Asset {
            unit: unit.to_string(),
            quantity: quantity.to_string(),
        }));
        amount
    }
}
