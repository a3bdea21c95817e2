use ledger_model::{require, Address, AssetUnit, KeyHash, OutRef, Value};
use liquidation_engine::{
    assess, check_liquidation_trigger, debt_value_lovelace, distribute_collateral, LiquidationError,
};
use log::{debug, info};
use oracle_framework::ReferenceData;
use serde::{Deserialize, Serialize};

use crate::account::AccountState;
use crate::calculator::{
    collateral_rate, collateral_ratio, compute_loan, meets_collateral_ratio, required_collateral,
};
use crate::deployment::ProtocolDeployment;
use crate::error::FinancingError;
use crate::nft::LoanNftId;
use crate::plan::{ActionKind, MintEntry, OutputRole, PlannedOutput, PolicyRole, ScriptSpend, TransitionPlan};
use crate::position::{CollateralDeposit, LoanPosition, LoanUtxo};
use crate::redeemer::{CollateralRedeemer, MintRedeemer};

/// User intent. Amounts are lovelace, except loan and repay amounts which are
/// synthetic-asset units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LoanAction {
    Deposit {
        amount: u64,
    },
    Borrow {
        collateral: u64,
        /// Defaults to the largest borrowable amount.
        #[serde(default)]
        loan_amount: Option<u64>,
    },
    IncreaseCollateral {
        position: OutRef,
        amount: u64,
    },
    PartialRepay {
        position: OutRef,
        amount: u64,
    },
    Repay {
        position: OutRef,
    },
    PartialWithdraw {
        amount: u64,
    },
    Withdraw,
    Liquidate {
        position: OutRef,
    },
}

impl LoanAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            LoanAction::Deposit { .. } => ActionKind::Deposit,
            LoanAction::Borrow { .. } => ActionKind::Borrow,
            LoanAction::IncreaseCollateral { .. } => ActionKind::IncreaseCollateral,
            LoanAction::PartialRepay { .. } => ActionKind::PartialRepay,
            LoanAction::Repay { .. } => ActionKind::Repay,
            LoanAction::PartialWithdraw { .. } => ActionKind::PartialWithdraw,
            LoanAction::Withdraw => ActionKind::Withdraw,
            LoanAction::Liquidate { .. } => ActionKind::Liquidate,
        }
    }

    /// Position the action targets, if any.
    pub fn position(&self) -> Option<&OutRef> {
        match self {
            LoanAction::IncreaseCollateral { position, .. }
            | LoanAction::PartialRepay { position, .. }
            | LoanAction::Repay { position }
            | LoanAction::Liquidate { position } => Some(position),
            _ => None,
        }
    }
}

/// Inputs the planner reads besides the account slot.
#[derive(Debug, Clone)]
pub struct PlanningContext<'a> {
    pub deployment: &'a ProtocolDeployment,
    pub references: &'a ReferenceData,
    pub owner: KeyHash,
    pub wallet_address: Address,
    pub wallet_holdings: Value,
}

impl PlanningContext<'_> {
    fn min_output(&self) -> u64 {
        self.deployment.min_output_lovelace
    }

    /// Borrower token of `loan`, which the wallet must hold.
    fn require_loan_nft(&self, loan: &LoanUtxo) -> Result<AssetUnit, FinancingError> {
        let unit = loan.borrower_nft()?;
        require!(
            self.wallet_holdings.quantity_of(&unit) > 0,
            FinancingError::LoanNftNotHeld { unit }
        );
        Ok(unit)
    }

    fn require_not_dust(&self, what: &'static str, lovelace: u64) -> Result<(), FinancingError> {
        require!(
            lovelace >= self.min_output(),
            FinancingError::DustOutput {
                what,
                lovelace,
                minimum: self.min_output(),
            }
        );
        Ok(())
    }

    fn deposit_output(&self, lovelace: u64) -> PlannedOutput {
        PlannedOutput {
            role: OutputRole::Deposit,
            address: self.deployment.pool_address().clone(),
            value: Value::lovelace(lovelace),
            datum: Some(
                CollateralDeposit {
                    owner: self.owner.clone(),
                }
                .to_datum(),
            ),
        }
    }

    /// Position output locking the collateral and the reference token of `nft`.
    fn position_output(
        &self,
        position: &LoanPosition,
        nft: &LoanNftId,
    ) -> Result<PlannedOutput, FinancingError> {
        let reference = nft.reference_unit(&self.deployment.loan_nft.policy_id)?;
        Ok(PlannedOutput {
            role: OutputRole::LoanPosition,
            address: self.deployment.pool_address().clone(),
            value: Value::lovelace(position.collateral_amount).with_asset(reference, 1),
            datum: Some(position.to_datum()?),
        })
    }

    fn mint(&self, role: PolicyRole, unit: AssetUnit, quantity: i64) -> MintEntry {
        MintEntry {
            role,
            unit,
            quantity,
            redeemer: MintRedeemer::for_quantity(quantity),
        }
    }

    fn mint_tokens(&self, quantity: i64) -> MintEntry {
        self.mint(PolicyRole::LoanToken, self.deployment.loan_token_unit(), quantity)
    }

    /// Mints (`quantity` 1) or burns (-1) both tokens of a loan NFT pair.
    fn mint_nft_pair(&self, nft: &LoanNftId, quantity: i64) -> Result<[MintEntry; 2], FinancingError> {
        let policy = &self.deployment.loan_nft.policy_id;
        Ok([
            self.mint(PolicyRole::LoanNft, nft.borrower_unit(policy)?, quantity),
            self.mint(PolicyRole::LoanNft, nft.reference_unit(policy)?, quantity),
        ])
    }
}

/// Computes the next state of `account` under `action`. Pure: the same
/// inputs always give the same plan.
pub fn plan_transition(
    ctx: &PlanningContext<'_>,
    account: &AccountState,
    action: &LoanAction,
) -> Result<TransitionPlan, FinancingError> {
    debug!("Planning {:?} for {} ({:?})", action.kind(), account.owner, account.phase());
    let plan = match action {
        LoanAction::Deposit { amount } => plan_deposit(ctx, account, *amount)?,
        LoanAction::Borrow {
            collateral,
            loan_amount,
        } => plan_borrow(ctx, account, *collateral, *loan_amount)?,
        LoanAction::IncreaseCollateral { position, amount } => {
            plan_increase_collateral(ctx, account, position, *amount)?
        }
        LoanAction::PartialRepay { position, amount } => {
            plan_partial_repay(ctx, account, position, *amount)?
        }
        LoanAction::Repay { position } => plan_repay(ctx, account, position)?,
        LoanAction::PartialWithdraw { amount } => plan_partial_withdraw(ctx, account, *amount)?,
        LoanAction::Withdraw => plan_withdraw(ctx, account)?,
        LoanAction::Liquidate { position } => plan_liquidation(ctx, account, position)?,
    };
    info!(
        "✅ {:?} planned: {} spends, {} mints, {} outputs",
        plan.action,
        plan.spends.len(),
        plan.mints.len(),
        plan.outputs.len()
    );
    Ok(plan)
}

fn new_plan(ctx: &PlanningContext<'_>, action: ActionKind) -> TransitionPlan {
    TransitionPlan::new(action, ctx.references.reference_inputs())
}

fn spend_deposits(plan: &mut TransitionPlan, account: &AccountState, redeemer: CollateralRedeemer) {
    plan.spends.extend(account.deposits.iter().map(|deposit| ScriptSpend {
        utxo: deposit.utxo.clone(),
        redeemer,
    }));
}

fn require_positive(amount: u64, what: &str) -> Result<(), FinancingError> {
    require!(
        amount > 0,
        FinancingError::InvalidAmount(format!("{what} must be positive"))
    );
    Ok(())
}

// ========== DEPOSIT ==========
fn plan_deposit(
    ctx: &PlanningContext<'_>,
    account: &AccountState,
    amount: u64,
) -> Result<TransitionPlan, FinancingError> {
    require_positive(amount, "deposit amount")?;
    let existing = account.deposit_total()?;
    let total = existing
        .checked_add(amount)
        .ok_or(FinancingError::MathOverflow)?;
    ctx.require_not_dust("deposit", total)?;

    let mut plan = new_plan(ctx, ActionKind::Deposit);
    if !account.deposits.is_empty() {
        spend_deposits(&mut plan, account, CollateralRedeemer::IncreaseDeposit);
        plan.required_signers.push(ctx.owner.clone());
        debug!("  consolidating {} deposits of {} lovelace", account.deposits.len(), existing);
    }
    plan.outputs.push(ctx.deposit_output(total));
    Ok(plan)
}
// ========== END DEPOSIT ==========

// ========== BORROW ==========
fn plan_borrow(
    ctx: &PlanningContext<'_>,
    account: &AccountState,
    collateral: u64,
    loan_amount: Option<u64>,
) -> Result<TransitionPlan, FinancingError> {
    let deposit = account.require_deposit()?;
    require_positive(collateral, "collateral")?;
    require!(
        collateral <= deposit,
        FinancingError::InsufficientCollateral {
            required: collateral,
            available: deposit,
        }
    );
    ctx.require_not_dust("loan position", collateral)?;

    let params = &ctx.references.parameters;
    let quote = compute_loan(&ctx.references.oracle, params, collateral)?;
    let loan = loan_amount.unwrap_or(quote.borrowable);
    require!(
        loan >= params.min_borrow,
        FinancingError::BelowMinimumBorrow {
            amount: loan,
            minimum: params.min_borrow,
        }
    );
    require!(
        loan <= quote.borrowable,
        FinancingError::InsufficientCollateral {
            required: required_collateral(loan, quote.rate, params.collateral_ratio_bps)?,
            available: collateral,
        }
    );

    let change = deposit - collateral;
    if change > 0 {
        ctx.require_not_dust("deposit change", change)?;
    }

    // All deposits are consumed, so the first one seeds a fresh NFT id.
    let seed = account
        .deposits
        .first()
        .map(|deposit| deposit.utxo.out_ref())
        .ok_or_else(|| FinancingError::AccountNotFound {
            owner: account.owner.to_string(),
        })?;
    let nft = LoanNftId::from_seed(seed);
    let borrower_nft = nft.borrower_unit(&ctx.deployment.loan_nft.policy_id)?;

    let position = LoanPosition {
        pool_hash: ctx.deployment.collateral_validator.script_hash.clone(),
        borrowed_policy_id: ctx.deployment.loan_token.policy_id.clone(),
        borrowed_asset_name: ctx.deployment.loan_token.asset_name.clone(),
        borrowed_amount: loan,
        loan_nft_policy_id: ctx.deployment.loan_nft.policy_id.clone(),
        collateral_rate: quote.rate,
        collateral_asset: LoanPosition::ada_collateral_tag(),
        collateral_amount: collateral,
    };
    let minted = i64::try_from(loan).map_err(|_| FinancingError::MathOverflow)?;

    let mut plan = new_plan(ctx, ActionKind::Borrow);
    spend_deposits(&mut plan, account, CollateralRedeemer::Borrow);
    plan.mints.extend(ctx.mint_nft_pair(&nft, 1)?);
    plan.mints.push(ctx.mint_tokens(minted));
    plan.outputs.push(ctx.position_output(&position, &nft)?);
    if change > 0 {
        plan.outputs.push(ctx.deposit_output(change));
    }
    plan.outputs.push(PlannedOutput {
        role: OutputRole::BorrowerProceeds,
        address: ctx.wallet_address.clone(),
        value: Value::lovelace(ctx.min_output())
            .with_asset(borrower_nft, 1)
            .with_asset(ctx.deployment.loan_token_unit(), loan),
        datum: None,
    });
    plan.required_signers.push(ctx.owner.clone());

    info!(
        "💰 Borrow: {} units against {} lovelace at {} lovelace/unit (max {}, ratio {:?}, NFT {})",
        loan,
        collateral,
        quote.rate,
        quote.borrowable,
        collateral_ratio(collateral, loan, quote.rate),
        nft
    );
    Ok(plan)
}
// ========== END BORROW ==========

// ========== POSITION MUTATIONS ==========
/// Position with its rate refreshed to the live rate, checked against the
/// collateral ratio.
fn refreshed_position(
    ctx: &PlanningContext<'_>,
    current: &LoanPosition,
    borrowed_amount: u64,
    collateral_amount: u64,
) -> Result<LoanPosition, FinancingError> {
    let rate = collateral_rate(&ctx.references.oracle)?;
    let ratio = ctx.references.parameters.collateral_ratio_bps;
    require!(
        meets_collateral_ratio(collateral_amount, borrowed_amount, rate, ratio)?,
        FinancingError::InsufficientCollateral {
            required: required_collateral(borrowed_amount, rate, ratio)?,
            available: collateral_amount,
        }
    );
    Ok(LoanPosition {
        borrowed_amount,
        collateral_amount,
        collateral_rate: rate,
        ..current.clone()
    })
}

fn plan_increase_collateral(
    ctx: &PlanningContext<'_>,
    account: &AccountState,
    position_ref: &OutRef,
    amount: u64,
) -> Result<TransitionPlan, FinancingError> {
    let loan = account.loan(position_ref)?;
    let nft = ctx.require_loan_nft(loan)?;
    let deposit = account.require_deposit()?;
    require_positive(amount, "collateral increase")?;
    require!(
        amount <= deposit,
        FinancingError::InsufficientCollateral {
            required: amount,
            available: deposit,
        }
    );
    let change = deposit - amount;
    if change > 0 {
        ctx.require_not_dust("deposit change", change)?;
    }

    let collateral = loan
        .position
        .collateral_amount
        .checked_add(amount)
        .ok_or(FinancingError::MathOverflow)?;
    let updated = refreshed_position(ctx, &loan.position, loan.position.borrowed_amount, collateral)?;

    let mut plan = new_plan(ctx, ActionKind::IncreaseCollateral);
    plan.spends.push(ScriptSpend {
        utxo: loan.utxo.clone(),
        redeemer: CollateralRedeemer::IncreaseCollateral,
    });
    spend_deposits(&mut plan, account, CollateralRedeemer::IncreaseCollateral);
    plan.outputs.push(ctx.position_output(&updated, &loan.nft)?);
    if change > 0 {
        plan.outputs.push(ctx.deposit_output(change));
    }
    plan.presented.push(nft);
    plan.required_signers.push(ctx.owner.clone());

    info!(
        "📈 Collateral of {} raised to {} lovelace",
        position_ref, updated.collateral_amount
    );
    Ok(plan)
}

fn plan_partial_repay(
    ctx: &PlanningContext<'_>,
    account: &AccountState,
    position_ref: &OutRef,
    amount: u64,
) -> Result<TransitionPlan, FinancingError> {
    let loan = account.loan(position_ref)?;
    let nft = ctx.require_loan_nft(loan)?;
    let borrowed = loan.position.borrowed_amount;
    require_positive(amount, "repay amount")?;
    require!(
        amount <= borrowed,
        FinancingError::RepayExceedsBorrowed { amount, borrowed }
    );
    require!(amount != borrowed, FinancingError::UseFullRepay { borrowed });

    let remaining = borrowed - amount;
    let minimum = ctx.references.parameters.min_borrow;
    require!(
        remaining >= minimum,
        FinancingError::BelowMinimumBorrow {
            amount: remaining,
            minimum,
        }
    );
    let updated = refreshed_position(ctx, &loan.position, remaining, loan.position.collateral_amount)?;
    let burned = i64::try_from(amount).map_err(|_| FinancingError::MathOverflow)?;

    let mut plan = new_plan(ctx, ActionKind::PartialRepay);
    plan.spends.push(ScriptSpend {
        utxo: loan.utxo.clone(),
        redeemer: CollateralRedeemer::PartialRepay,
    });
    plan.mints.push(ctx.mint_tokens(-burned));
    plan.outputs.push(ctx.position_output(&updated, &loan.nft)?);
    plan.presented.push(nft);

    info!("💸 Repaid {} of {} units on {}", amount, borrowed, position_ref);
    Ok(plan)
}

fn plan_repay(
    ctx: &PlanningContext<'_>,
    account: &AccountState,
    position_ref: &OutRef,
) -> Result<TransitionPlan, FinancingError> {
    let loan = account.loan(position_ref)?;
    ctx.require_loan_nft(loan)?;
    let released = loan.position.collateral_amount;
    let total = account
        .deposit_total()?
        .checked_add(released)
        .ok_or(FinancingError::MathOverflow)?;
    let burned = i64::try_from(loan.position.borrowed_amount).map_err(|_| FinancingError::MathOverflow)?;

    let mut plan = new_plan(ctx, ActionKind::Repay);
    plan.spends.push(ScriptSpend {
        utxo: loan.utxo.clone(),
        redeemer: CollateralRedeemer::Repay,
    });
    if !account.deposits.is_empty() {
        spend_deposits(&mut plan, account, CollateralRedeemer::IncreaseDeposit);
        plan.required_signers.push(ctx.owner.clone());
    }
    plan.mints.extend(ctx.mint_nft_pair(&loan.nft, -1)?);
    plan.mints.push(ctx.mint_tokens(-burned));
    plan.outputs.push(ctx.deposit_output(total));

    info!(
        "✅ Loan {} repaid, {} lovelace back to deposit",
        position_ref, released
    );
    Ok(plan)
}
// ========== END POSITION MUTATIONS ==========

// ========== WITHDRAWALS ==========
fn plan_partial_withdraw(
    ctx: &PlanningContext<'_>,
    account: &AccountState,
    amount: u64,
) -> Result<TransitionPlan, FinancingError> {
    let deposit = account.require_deposit()?;
    require_positive(amount, "withdrawal")?;
    require!(
        amount <= deposit,
        FinancingError::WithdrawExceedsDeposit {
            requested: amount,
            available: deposit,
        }
    );
    let remainder = deposit - amount;
    if remainder > 0 {
        ctx.require_not_dust("remaining deposit", remainder)?;
    }

    let mut plan = new_plan(ctx, ActionKind::PartialWithdraw);
    spend_deposits(&mut plan, account, CollateralRedeemer::Withdraw);
    if remainder > 0 {
        plan.outputs.push(ctx.deposit_output(remainder));
    }
    plan.released_lovelace = amount;
    plan.required_signers.push(ctx.owner.clone());
    Ok(plan)
}

fn plan_withdraw(
    ctx: &PlanningContext<'_>,
    account: &AccountState,
) -> Result<TransitionPlan, FinancingError> {
    let deposit = account.require_deposit()?;

    let mut plan = new_plan(ctx, ActionKind::Withdraw);
    spend_deposits(&mut plan, account, CollateralRedeemer::Withdraw);
    plan.released_lovelace = deposit;
    plan.required_signers.push(ctx.owner.clone());
    Ok(plan)
}
// ========== END WITHDRAWALS ==========

// ========== LIQUIDATION ==========
fn plan_liquidation(
    ctx: &PlanningContext<'_>,
    account: &AccountState,
    position_ref: &OutRef,
) -> Result<TransitionPlan, FinancingError> {
    let loan = account.loan(position_ref)?;
    let position = &loan.position;
    let rate = collateral_rate(&ctx.references.oracle)?;
    let health = assess(
        position.collateral_amount,
        position.borrowed_amount,
        rate,
        &ctx.references.parameters,
    )?;
    check_liquidation_trigger(&health).map_err(|e| match e {
        LiquidationError::ThresholdNotBreached {
            ratio_bps,
            threshold_bps,
        } => FinancingError::NotLiquidatable {
            out_ref: position_ref.clone(),
            ratio_bps,
            threshold_bps,
        },
        other => FinancingError::Liquidation(other),
    })?;

    let debt_value = debt_value_lovelace(position.borrowed_amount, rate)?;
    let split = distribute_collateral(
        position.collateral_amount,
        debt_value,
        ctx.references.parameters.liquidation_bonus_bps,
        ctx.min_output(),
    )?;
    let burned = i64::try_from(position.borrowed_amount).map_err(|_| FinancingError::MathOverflow)?;

    let mut plan = new_plan(ctx, ActionKind::Liquidate);
    plan.spends.push(ScriptSpend {
        utxo: loan.utxo.clone(),
        redeemer: CollateralRedeemer::Liquidate,
    });
    // The borrower token stays in the borrower's wallet and no longer names a position.
    plan.mints.push(ctx.mint(PolicyRole::LoanNft, loan.reference_nft()?, -1));
    plan.mints.push(ctx.mint_tokens(-burned));
    if split.remainder > 0 {
        plan.outputs.push(PlannedOutput {
            role: OutputRole::TreasuryRemainder,
            address: ctx.deployment.treasury_address.clone(),
            value: Value::lovelace(split.remainder),
            datum: None,
        });
    }
    plan.released_lovelace = split.liquidator_share;

    info!(
        "⚠️ Liquidating {} at ratio {:?}bps (threshold {}bps)",
        position_ref, health.ratio_bps, health.liquidation_ratio_bps
    );
    Ok(plan)
}
// ========== END LIQUIDATION ==========
