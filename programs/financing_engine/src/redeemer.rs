use ledger_model::PlutusData;
use serde::{Deserialize, Serialize};

/// Spend redeemers of the collateral pool validator, `Constr n []`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollateralRedeemer {
    Withdraw = 0,
    IncreaseDeposit = 1,
    Borrow = 2,
    IncreaseCollateral = 3,
    PartialRepay = 4,
    Repay = 5,
    Liquidate = 6,
}

impl CollateralRedeemer {
    pub fn tag(self) -> u64 {
        self as u64
    }

    pub fn to_data(self) -> PlutusData {
        PlutusData::tag(self.tag())
    }
}

/// Redeemers shared by the loan NFT and loan token minting policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MintRedeemer {
    Mint = 0,
    Burn = 1,
}

impl MintRedeemer {
    pub fn tag(self) -> u64 {
        self as u64
    }

    pub fn to_data(self) -> PlutusData {
        PlutusData::tag(self.tag())
    }

    pub fn for_quantity(quantity: i64) -> Self {
        if quantity < 0 {
            MintRedeemer::Burn
        } else {
            MintRedeemer::Mint
        }
    }
}
