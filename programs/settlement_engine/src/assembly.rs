use std::collections::BTreeMap;

use financing_engine::{
    MintRedeemer, PlutusScript, PolicyRole, ProtocolDeployment, TransitionPlan, TxShape,
    WalletContext,
};
use ledger_model::{
    require, Address, AssetName, AssetUnit, KeyHash, LedgerError, OutRef, PlutusData, PolicyId,
    TxOutput, Utxo, Value, LOVELACE_UNIT,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::AssemblyError;

/// A pool UTxO spent through the collateral validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptInput {
    pub utxo: Utxo,
    pub script: PlutusScript,
    pub redeemer: PlutusData,
}

/// Everything minted or burned under one policy, with its single redeemer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintGroup {
    pub policy_id: PolicyId,
    pub script: PlutusScript,
    pub redeemer: PlutusData,
    pub assets: BTreeMap<AssetName, i64>,
}

/// Balanced transaction body handed to the wallet for signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTransaction {
    pub script_inputs: Vec<ScriptInput>,
    pub wallet_inputs: Vec<Utxo>,
    /// Present whenever a script runs.
    pub collateral_input: Option<Utxo>,
    pub total_collateral: u64,
    pub reference_inputs: Vec<OutRef>,
    pub mints: Vec<MintGroup>,
    /// Planned outputs in plan order, then change when there is any.
    pub outputs: Vec<TxOutput>,
    pub change_address: Address,
    pub required_signers: Vec<KeyHash>,
    pub fee: u64,
}

impl UnsignedTransaction {
    pub fn shape(&self) -> TxShape {
        TxShape {
            inputs: self.script_inputs.len() + self.wallet_inputs.len(),
            outputs: self.outputs.len(),
            redeemers: self.script_inputs.len() + self.mints.len(),
            reference_inputs: self.reference_inputs.len(),
        }
    }

    pub fn input_value(&self) -> Result<Value, LedgerError> {
        Value::sum(
            self.script_inputs
                .iter()
                .map(|input| input.utxo.value())
                .chain(self.wallet_inputs.iter().map(Utxo::value)),
        )
    }

    pub fn output_value(&self) -> Result<Value, LedgerError> {
        Value::sum(self.outputs.iter().map(|output| &output.amount))
    }

    /// Minted and burned quantities as two non-negative values.
    pub fn mint_value(&self) -> Result<(Value, Value), LedgerError> {
        mint_values(&self.mints)
    }

    pub fn change(&self) -> Option<&TxOutput> {
        self.outputs
            .last()
            .filter(|output| output.address == self.change_address && output.plutus_data.is_none())
    }
}

/// Renders `plan` into a balanced transaction, selecting wallet UTxOs to
/// cover outputs, burns and the fee.
pub fn assemble(
    plan: &TransitionPlan,
    deployment: &ProtocolDeployment,
    wallet: &WalletContext,
) -> Result<UnsignedTransaction, AssemblyError> {
    let script_inputs = script_inputs(plan, deployment)?;
    let mints = mint_groups(plan, deployment)?;
    let (minted, burned) = mint_values(&mints)?;

    let min_output = deployment.min_output_lovelace;
    let outputs: Vec<TxOutput> = plan
        .outputs
        .iter()
        .map(|planned| TxOutput {
            address: planned.address.clone(),
            amount: planned.value.clone(),
            plutus_data: planned.datum.clone(),
        })
        .collect();
    for (index, output) in outputs.iter().enumerate() {
        require!(
            output.amount.coin() >= min_output,
            AssemblyError::DustOutput {
                index,
                lovelace: output.amount.coin(),
                minimum: min_output,
            }
        );
    }

    // ========== COIN SELECTION ==========
    let supplied = Value::sum(script_inputs.iter().map(|input| input.utxo.value()))?
        .checked_add(&minted)?;
    let owed_before_fee = Value::sum(outputs.iter().map(|output| &output.amount))?
        .checked_add(&burned)?;

    let mut candidates: Vec<&Utxo> = wallet.spendable().collect();
    candidates.sort_by(|a, b| b.coin().cmp(&a.coin()).then_with(|| a.out_ref().cmp(b.out_ref())));
    let mut selected: Vec<Utxo> = Vec::new();

    for unit in &plan.presented {
        if selected.iter().any(|utxo| utxo.value().quantity_of(unit) > 0) {
            continue;
        }
        let index = candidates
            .iter()
            .position(|utxo| utxo.value().quantity_of(unit) > 0)
            .ok_or_else(|| AssemblyError::MissingPresentedAsset { unit: unit.clone() })?;
        selected.push(candidates.remove(index).clone());
    }

    let redeemers = script_inputs.len() + mints.len();
    let (fee, change) = loop {
        let shape = TxShape {
            inputs: script_inputs.len() + selected.len(),
            outputs: outputs.len() + 1,
            redeemers,
            reference_inputs: plan.reference_inputs.len(),
        };
        let fee = deployment
            .fee_model
            .estimate(shape)
            .ok_or(AssemblyError::FeeOverflow)?;
        let owed = owed_before_fee.checked_add(&Value::lovelace(fee))?;
        let available = supplied.checked_add(&Value::sum(selected.iter().map(Utxo::value))?)?;

        if available.covers(&owed) {
            let change = available.checked_sub(&owed)?;
            if change.is_zero() {
                break (fee, None);
            }
            if change.coin() >= min_output {
                break (fee, Some(change));
            }
            // Change too small for an output of its own: add another input first.
            if !candidates.is_empty() {
                selected.push(candidates.remove(0).clone());
                continue;
            }
            if change.is_pure_ada() {
                // Nothing left to select: leave the dust to the fee.
                debug!("Folding {} lovelace of dust change into the fee", change.coin());
                let fee = fee
                    .checked_add(change.coin())
                    .ok_or(AssemblyError::FeeOverflow)?;
                break (fee, None);
            }
            // Change carries assets but not enough lovelace to hold them.
            let required = owed
                .coin()
                .checked_add(min_output - change.coin())
                .ok_or(AssemblyError::FeeOverflow)?;
            return Err(AssemblyError::InsufficientWalletFunds {
                unit: LOVELACE_UNIT.to_string(),
                available: available.coin(),
                required,
            });
        }

        let missing = owed.missing_from(&available);
        let pick = if missing.is_empty() {
            (!candidates.is_empty()).then_some(0)
        } else {
            candidates
                .iter()
                .position(|utxo| missing.iter().any(|unit| utxo.value().quantity_of(unit) > 0))
        };
        match pick {
            Some(index) => selected.push(candidates.remove(index).clone()),
            None => return Err(shortfall(&available, &owed)),
        }
    };
    // ========== END COIN SELECTION ==========

    let (collateral_input, total_collateral) = if redeemers > 0 {
        let total = check_collateral(wallet, deployment, fee)?;
        (Some(wallet.collateral.clone()), total)
    } else {
        (None, 0)
    };

    let mut required_signers = plan.required_signers.clone();
    required_signers.sort();
    required_signers.dedup();
    selected.sort_by(|a, b| a.out_ref().cmp(b.out_ref()));

    let mut outputs = outputs;
    if let Some(change) = change {
        outputs.push(TxOutput {
            address: wallet.address.clone(),
            amount: change,
            plutus_data: None,
        });
    }

    let tx = UnsignedTransaction {
        script_inputs,
        wallet_inputs: selected,
        collateral_input,
        total_collateral,
        reference_inputs: plan.reference_inputs.clone(),
        mints,
        outputs,
        change_address: wallet.address.clone(),
        required_signers,
        fee,
    };
    verify_balance(&tx)?;

    info!(
        "✅ {:?} assembled: {} script inputs, {} wallet inputs, {} outputs, fee {} lovelace",
        plan.action,
        tx.script_inputs.len(),
        tx.wallet_inputs.len(),
        tx.outputs.len(),
        tx.fee
    );
    Ok(tx)
}

fn script_inputs(
    plan: &TransitionPlan,
    deployment: &ProtocolDeployment,
) -> Result<Vec<ScriptInput>, AssemblyError> {
    plan.spends
        .iter()
        .map(|spend| {
            let out_ref = spend.utxo.out_ref();
            require!(
                spend.utxo.datum().is_some(),
                AssemblyError::MissingInlineDatum {
                    out_ref: out_ref.clone()
                }
            );
            require!(
                spend.utxo.output.address == *deployment.pool_address(),
                AssemblyError::ForeignScriptInput {
                    out_ref: out_ref.clone()
                }
            );
            Ok(ScriptInput {
                utxo: spend.utxo.clone(),
                script: deployment.collateral_validator.script.clone(),
                redeemer: spend.redeemer.to_data(),
            })
        })
        .collect()
}

fn mint_groups(
    plan: &TransitionPlan,
    deployment: &ProtocolDeployment,
) -> Result<Vec<MintGroup>, AssemblyError> {
    let mut groups: BTreeMap<PolicyId, (MintRedeemer, MintGroup)> = BTreeMap::new();
    for entry in &plan.mints {
        let script = match entry.role {
            PolicyRole::LoanNft => &deployment.loan_nft.script,
            PolicyRole::LoanToken => &deployment.loan_token.script,
        };
        let (redeemer, group) = groups
            .entry(entry.unit.policy_id.clone())
            .or_insert_with(|| {
                (
                    entry.redeemer,
                    MintGroup {
                        policy_id: entry.unit.policy_id.clone(),
                        script: script.clone(),
                        redeemer: entry.redeemer.to_data(),
                        assets: BTreeMap::new(),
                    },
                )
            });
        require!(
            *redeemer == entry.redeemer,
            AssemblyError::ConflictingMintRedeemer {
                policy_id: entry.unit.policy_id.clone()
            }
        );
        let quantity = group.assets.entry(entry.unit.asset_name.clone()).or_insert(0);
        *quantity = quantity
            .checked_add(entry.quantity)
            .ok_or_else(|| LedgerError::ValueOverflow {
                unit: entry.unit.to_string(),
            })?;
    }

    Ok(groups
        .into_values()
        .filter_map(|(_, mut group)| {
            group.assets.retain(|_, quantity| *quantity != 0);
            (!group.assets.is_empty()).then_some(group)
        })
        .collect())
}

fn mint_values(mints: &[MintGroup]) -> Result<(Value, Value), LedgerError> {
    let mut minted = Value::default();
    let mut burned = Value::default();
    for group in mints {
        for (name, quantity) in &group.assets {
            let unit = AssetUnit::new(group.policy_id.clone(), name.clone());
            let amount = Value::default().with_asset(unit, quantity.unsigned_abs());
            if *quantity > 0 {
                minted = minted.checked_add(&amount)?;
            } else {
                burned = burned.checked_add(&amount)?;
            }
        }
    }
    Ok((minted, burned))
}

/// Lovelace the collateral input must hold: `ceil(fee * percentage / 100)`.
fn check_collateral(
    wallet: &WalletContext,
    deployment: &ProtocolDeployment,
    fee: u64,
) -> Result<u64, AssemblyError> {
    let collateral = &wallet.collateral;
    require!(
        collateral.value().is_pure_ada(),
        AssemblyError::InvalidCollateralInput(format!(
            "{} carries native assets",
            collateral.out_ref()
        ))
    );
    let required = (fee as u128 * deployment.collateral_percentage as u128).div_ceil(100);
    let required = u64::try_from(required).map_err(|_| AssemblyError::FeeOverflow)?;
    require!(
        collateral.coin() >= required,
        AssemblyError::InvalidCollateralInput(format!(
            "{} holds {} lovelace, fee {} needs {}",
            collateral.out_ref(),
            collateral.coin(),
            fee,
            required
        ))
    );
    Ok(required)
}

fn shortfall(available: &Value, owed: &Value) -> AssemblyError {
    match available.checked_sub(owed) {
        Err(LedgerError::InsufficientValue {
            unit,
            available,
            required,
        }) => AssemblyError::InsufficientWalletFunds {
            unit,
            available,
            required,
        },
        Err(other) => AssemblyError::Ledger(other),
        Ok(_) => AssemblyError::InsufficientWalletFunds {
            unit: LOVELACE_UNIT.to_string(),
            available: available.coin(),
            required: owed.coin(),
        },
    }
}

/// Checks `inputs + mint = outputs + burn + fee` for every unit.
pub fn verify_balance(tx: &UnsignedTransaction) -> Result<(), AssemblyError> {
    let (minted, burned) = tx.mint_value()?;
    let inputs = tx.input_value()?.checked_add(&minted)?;
    let outputs = tx
        .output_value()?
        .checked_add(&burned)?
        .checked_add(&Value::lovelace(tx.fee))?;
    if inputs == outputs {
        return Ok(());
    }

    if inputs.coin() != outputs.coin() {
        return Err(AssemblyError::Unbalanced {
            unit: LOVELACE_UNIT.to_string(),
            inputs: inputs.coin(),
            outputs: outputs.coin(),
        });
    }
    let unit = inputs
        .missing_from(&outputs)
        .into_iter()
        .chain(outputs.missing_from(&inputs))
        .next();
    Err(match unit {
        Some(unit) => AssemblyError::Unbalanced {
            inputs: inputs.quantity_of(&unit),
            outputs: outputs.quantity_of(&unit),
            unit: unit.to_string(),
        },
        None => AssemblyError::Unbalanced {
            unit: "unknown".into(),
            inputs: 0,
            outputs: 0,
        },
    })
}
