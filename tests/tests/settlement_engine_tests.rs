
use anyhow::Result;
use common::setup::{ada, out_ref, Fixture};
use financing_engine::{
    LoanAction, MintEntry, MintRedeemer, PlannedTransition, PolicyRole, WalletContext,
};
use ledger_model::{Address, LedgerError, Utxo, Value, LOVELACE_UNIT};
use settlement_engine::{assemble, verify_balance, AssemblyError, UnsignedTransaction};

async fn assembled(
    fixture: &Fixture,
    action: &LoanAction,
) -> Result<(PlannedTransition, UnsignedTransaction)> {
    let planned = fixture.plan(action).await?;
    let tx = assemble(&planned.plan, &fixture.deployment, &fixture.wallet)?;
    Ok((planned, tx))
}

fn borrowing_fixture() -> Fixture {
    let mut fixture = Fixture::new();
    fixture.add_deposit(0xd1, ada(400));
    fixture
}

const BORROW: LoanAction = LoanAction::Borrow {
    collateral: 300_000_000,
    loan_amount: None,
};

// ========== BALANCING ==========
#[tokio::test]
async fn test_deposit_needs_no_script_collateral() -> Result<()> {
    let fixture = Fixture::new();
    let (_, tx) = assembled(&fixture, &LoanAction::Deposit { amount: ada(50) }).await?;

    assert!(tx.script_inputs.is_empty());
    assert!(tx.mints.is_empty());
    assert!(tx.collateral_input.is_none());
    assert_eq!(tx.total_collateral, 0);
    // base + 1 input + 2 outputs + 2 reference inputs
    assert_eq!(tx.fee, 260_000);
    assert_eq!(tx.outputs.len(), 2);
    let change = tx.change().expect("change output");
    assert_eq!(change.amount.coin(), ada(950) - 260_000);
    verify_balance(&tx)?;
    Ok(())
}

#[tokio::test]
async fn test_dust_change_is_folded_into_fee() -> Result<()> {
    let fixture = Fixture::new();
    let amount = ada(1_000) - 260_000 - ada(1);
    let (_, tx) = assembled(&fixture, &LoanAction::Deposit { amount }).await?;

    assert_eq!(tx.outputs.len(), 1);
    assert!(tx.change().is_none());
    assert_eq!(tx.fee, 260_000 + ada(1));
    verify_balance(&tx)?;
    Ok(())
}

#[tokio::test]
async fn test_dust_change_takes_another_input_first() -> Result<()> {
    let mut fixture = Fixture::new();
    fixture.ledger.spend(&out_ref(0xa1, 0));
    fixture.wallet.utxos.clear();
    let large = fixture.fund_wallet(0xa2, Value::lovelace(ada(50)));
    let small = fixture.fund_wallet(0xa3, Value::lovelace(ada(10)));

    // One input would leave 1 ADA of change.
    let amount = ada(50) - 260_000 - ada(1);
    let (_, tx) = assembled(&fixture, &LoanAction::Deposit { amount }).await?;

    let inputs: Vec<_> = tx.wallet_inputs.iter().map(|utxo| utxo.out_ref().clone()).collect();
    assert_eq!(inputs, vec![large, small]);
    // base + 2 inputs + 2 outputs + 2 reference inputs
    assert_eq!(tx.fee, 280_000);
    let change = tx.change().expect("change output");
    assert_eq!(change.amount.coin(), ada(11) - 20_000);
    verify_balance(&tx)?;
    Ok(())
}

#[tokio::test]
async fn test_borrow_groups_mints_and_attaches_collateral() -> Result<()> {
    let fixture = borrowing_fixture();
    let (_, tx) = assembled(&fixture, &BORROW).await?;

    assert_eq!(tx.script_inputs.len(), 1);
    assert_eq!(
        &tx.script_inputs[0].script,
        &fixture.deployment.collateral_validator.script
    );
    assert_eq!(tx.mints.len(), 2);
    for group in &tx.mints {
        assert_eq!(group.redeemer, MintRedeemer::Mint.to_data());
    }
    // Borrower and reference tokens share the NFT policy's group.
    let nft_group = tx
        .mints
        .iter()
        .find(|group| group.policy_id == fixture.deployment.loan_nft.policy_id)
        .expect("loan NFT group");
    assert_eq!(nft_group.assets.len(), 2);
    assert!(nft_group.assets.values().all(|quantity| *quantity == 1));

    // 2 inputs, 3 planned outputs + change, 3 redeemers, 2 reference inputs
    assert_eq!(tx.fee, 760_000);
    assert_eq!(tx.collateral_input.as_ref(), Some(&fixture.wallet.collateral));
    assert_eq!(tx.total_collateral, 1_140_000);
    assert_eq!(tx.required_signers, vec![fixture.wallet.key_hash.clone()]);
    assert_eq!(tx.reference_inputs.len(), 2);
    verify_balance(&tx)?;
    Ok(())
}

#[tokio::test]
async fn test_tampered_fee_breaks_balance() -> Result<()> {
    let fixture = borrowing_fixture();
    let (_, mut tx) = assembled(&fixture, &BORROW).await?;
    tx.fee += 1;

    assert!(matches!(
        verify_balance(&tx),
        Err(AssemblyError::Unbalanced { ref unit, .. }) if unit == LOVELACE_UNIT
    ));
    Ok(())
}
// ========== END BALANCING ==========

// ========== PRESENTED ASSETS ==========
#[tokio::test]
async fn test_loan_nft_utxo_is_selected_for_mutation() -> Result<()> {
    let mut fixture = Fixture::new();
    let position = fixture.add_position(0xe1, 4_799, ada(300), 41_667);
    let nft_utxo = fixture.give_loan_nft(0xf1, &position, 4_799);

    let (_, tx) = assembled(
        &fixture,
        &LoanAction::PartialRepay {
            position: position.clone(),
            amount: 1_000,
        },
    )
    .await?;

    assert!(tx.wallet_inputs.iter().any(|utxo| utxo.out_ref() == &nft_utxo));
    let change = tx.change().expect("change output");
    assert_eq!(change.amount.quantity_of(&fixture.loan_nft(&position)), 1);
    assert_eq!(change.amount.quantity_of(&fixture.tusd()), 3_799);
    assert_eq!(tx.mints.len(), 1);
    assert_eq!(tx.mints[0].redeemer, MintRedeemer::Burn.to_data());
    verify_balance(&tx)?;
    Ok(())
}

#[tokio::test]
async fn test_liquidator_keeps_share_through_change() -> Result<()> {
    let mut fixture = Fixture::new();
    let position = fixture.add_position(0xe1, 4_799, ada(300), 41_667);
    fixture.give_tusd(0xf1, 4_799);
    fixture.set_oracle(19, 1);

    let (planned, tx) = assembled(
        &fixture,
        &LoanAction::Liquidate {
            position: position.clone(),
        },
    )
    .await?;

    let change = tx.change().expect("change output");
    assert_eq!(
        change.amount.coin(),
        planned.plan.released_lovelace + ada(2) - tx.fee
    );
    assert_eq!(change.amount.quantity_of(&fixture.loan_nft(&position)), 0);
    assert_eq!(change.amount.quantity_of(&fixture.tusd()), 0);
    // Only the reference token is burned; it came from the position.
    let nft_group = tx
        .mints
        .iter()
        .find(|group| group.policy_id == fixture.deployment.loan_nft.policy_id)
        .expect("loan NFT group");
    assert_eq!(nft_group.assets.values().collect::<Vec<_>>(), vec![&-1]);
    verify_balance(&tx)?;
    Ok(())
}

#[tokio::test]
async fn test_liquidation_without_loan_tokens_is_underfunded() -> Result<()> {
    let mut fixture = Fixture::new();
    let position = fixture.add_position(0xe1, 4_799, ada(300), 41_667);
    fixture.give_tusd(0xf1, 0);
    fixture.set_oracle(19, 1);

    let planned = fixture.plan(&LoanAction::Liquidate { position }).await?;
    let err = assemble(&planned.plan, &fixture.deployment, &fixture.wallet).unwrap_err();
    assert_eq!(
        err,
        AssemblyError::InsufficientWalletFunds {
            unit: fixture.tusd().to_string(),
            available: 0,
            required: 4_799,
        }
    );
    assert!(!err.is_internal());
    Ok(())
}
// ========== END PRESENTED ASSETS ==========

// ========== COLLATERAL INPUT ==========
#[tokio::test]
async fn test_collateral_with_assets_is_rejected() -> Result<()> {
    let mut fixture = borrowing_fixture();
    let address = fixture.wallet.address.clone();
    let unit = fixture.tusd();
    fixture.wallet = WalletContext {
        collateral: Utxo::new(out_ref(0xc1, 0), address, Value::lovelace(ada(5)).with_asset(unit, 1)),
        ..fixture.wallet.clone()
    };

    let planned = fixture.plan(&BORROW).await?;
    assert!(matches!(
        assemble(&planned.plan, &fixture.deployment, &fixture.wallet),
        Err(AssemblyError::InvalidCollateralInput(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_collateral_must_cover_fee_percentage() -> Result<()> {
    let mut fixture = borrowing_fixture();
    fixture.wallet.collateral = Utxo::new(
        out_ref(0xc1, 0),
        fixture.wallet.address.clone(),
        Value::lovelace(1_000_000),
    );

    let planned = fixture.plan(&BORROW).await?;
    let err = assemble(&planned.plan, &fixture.deployment, &fixture.wallet).unwrap_err();
    assert!(matches!(err, AssemblyError::InvalidCollateralInput(_)));
    Ok(())
}
// ========== END COLLATERAL INPUT ==========

// ========== PLAN DEFECTS ==========
#[tokio::test]
async fn test_conflicting_mint_redeemers_are_internal() -> Result<()> {
    let fixture = borrowing_fixture();
    let mut plan = fixture.plan(&BORROW).await?.plan;
    plan.mints.push(MintEntry {
        role: PolicyRole::LoanNft,
        unit: fixture.loan_nft(&out_ref(0xe9, 0)),
        quantity: -1,
        redeemer: MintRedeemer::Burn,
    });

    let err = assemble(&plan, &fixture.deployment, &fixture.wallet).unwrap_err();
    assert_eq!(
        err,
        AssemblyError::ConflictingMintRedeemer {
            policy_id: fixture.deployment.loan_nft.policy_id.clone(),
        }
    );
    assert!(err.is_internal());
    Ok(())
}

#[tokio::test]
async fn test_dust_planned_output_is_rejected() -> Result<()> {
    let fixture = borrowing_fixture();
    let mut plan = fixture.plan(&BORROW).await?.plan;
    plan.outputs[0].value = Value::lovelace(ada(1));

    assert_eq!(
        assemble(&plan, &fixture.deployment, &fixture.wallet).unwrap_err(),
        AssemblyError::DustOutput {
            index: 0,
            lovelace: ada(1),
            minimum: ada(2),
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_script_inputs_must_sit_at_the_pool() -> Result<()> {
    let fixture = borrowing_fixture();
    let mut plan = fixture.plan(&BORROW).await?.plan;
    let spent = plan.spends[0].utxo.out_ref().clone();

    let mut foreign = plan.clone();
    foreign.spends[0].utxo.output.address = Address::new("addr_test1wzelsewhere")?;
    assert_eq!(
        assemble(&foreign, &fixture.deployment, &fixture.wallet).unwrap_err(),
        AssemblyError::ForeignScriptInput {
            out_ref: spent.clone()
        }
    );

    plan.spends[0].utxo.output.plutus_data = None;
    assert_eq!(
        assemble(&plan, &fixture.deployment, &fixture.wallet).unwrap_err(),
        AssemblyError::MissingInlineDatum { out_ref: spent }
    );
    Ok(())
}

#[tokio::test]
async fn test_empty_wallet_cannot_pay_fee() -> Result<()> {
    let mut fixture = Fixture::new();
    fixture.add_deposit(0xd1, ada(100));
    fixture.wallet.utxos.clear();

    let planned = fixture.plan(&LoanAction::Withdraw).await?;
    let tx = assemble(&planned.plan, &fixture.deployment, &fixture.wallet)?;
    // The released deposit pays for itself.
    assert!(tx.wallet_inputs.is_empty());
    verify_balance(&tx)?;

    let planned = fixture.plan(&LoanAction::Deposit { amount: ada(10) }).await?;
    assert!(matches!(
        assemble(&planned.plan, &fixture.deployment, &fixture.wallet),
        Err(AssemblyError::InsufficientWalletFunds { .. })
    ));
    Ok(())
}

#[test]
fn test_ledger_errors_are_internal() {
    let err = AssemblyError::from(LedgerError::MalformedData("bad".into()));
    assert!(err.is_internal());
}
// ========== END PLAN DEFECTS ==========
