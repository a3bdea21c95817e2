
use anyhow::Result;
use common::setup::{ada, Fixture};
use financing_engine::{
    collateral_rate, meets_collateral_ratio, FinancingError, LoanAction, OutputRole,
};
use liquidation_engine::{debt_value_lovelace, is_below_ratio};
use oracle_framework::OracleSnapshot;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use settlement_engine::{assemble, verify_balance};

const ROUNDS: usize = 40;

/// Random deposit, collateral and oracle price; returns `None` for
/// combinations that leave a dust deposit behind.
fn draw(rng: &mut StdRng) -> Option<(u64, u64, u64)> {
    let deposit = rng.gen_range(50..=2_000u64);
    let collateral = rng.gen_range(10..=deposit);
    if deposit - collateral == 1 {
        return None;
    }
    Some((ada(deposit), ada(collateral), rng.gen_range(5..=200u64)))
}

#[tokio::test]
async fn test_borrow_is_maximal_and_balanced() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0x5747);
    for _ in 0..ROUNDS {
        let Some((deposit, collateral, balance)) = draw(&mut rng) else {
            continue;
        };
        let mut fixture = Fixture::new();
        fixture.set_oracle(balance, 1);
        fixture.add_deposit(0xd1, deposit);

        let planned = match fixture
            .plan(&LoanAction::Borrow {
                collateral,
                loan_amount: None,
            })
            .await
        {
            Ok(planned) => planned,
            Err(FinancingError::BelowMinimumBorrow { amount, minimum }) => {
                assert!(amount < minimum);
                continue;
            }
            Err(other) => panic!("unexpected error: {other}"),
        };

        let position = planned.plan.produced_position().expect("position output");
        let ratio = planned.references.parameters.collateral_ratio_bps;
        assert_eq!(position.collateral_amount, collateral);
        assert!(meets_collateral_ratio(
            collateral,
            position.borrowed_amount,
            position.collateral_rate,
            ratio
        )?);
        assert!(!meets_collateral_ratio(
            collateral,
            position.borrowed_amount + 1,
            position.collateral_rate,
            ratio
        )?);

        let change: u64 = planned
            .plan
            .outputs_with_role(OutputRole::Deposit)
            .map(|output| output.value.coin())
            .sum();
        assert_eq!(change + collateral, deposit);

        let tx = assemble(&planned.plan, &fixture.deployment, &fixture.wallet)?;
        verify_balance(&tx)?;
    }
    Ok(())
}

#[tokio::test]
async fn test_liquidation_follows_threshold_and_conserves_collateral() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0x11a0);
    let mut liquidated = 0;
    for round in 0..ROUNDS {
        let Some((deposit, collateral, balance)) = draw(&mut rng) else {
            continue;
        };
        let mut fixture = Fixture::new();
        fixture.set_oracle(balance, 1);
        fixture.add_deposit(0xd1, deposit);

        let borrow = LoanAction::Borrow {
            collateral,
            loan_amount: None,
        };
        let Ok(planned) = fixture.plan(&borrow).await else {
            continue;
        };
        let tx = assemble(&planned.plan, &fixture.deployment, &fixture.wallet)?;
        fixture.apply(&tx, 0x40);
        let position = fixture.session().list_loan_positions().await?[0].clone();

        // ADA loses up to half its value against the synthetic asset.
        let moved = (balance - rng.gen_range(0..=balance / 2)).max(1);
        fixture.set_oracle(moved, 1);
        let live_rate = collateral_rate(&OracleSnapshot {
            out_ref: fixture.deployment.oracle.clone(),
            priced_unit: fixture.tusd(),
            priced_balance: moved,
            reference_ada: 1,
        })?;
        let below = is_below_ratio(
            collateral,
            position.position.borrowed_amount,
            live_rate,
            planned.references.parameters.liquidation_ratio_bps,
        )?;

        let result = fixture
            .plan(&LoanAction::Liquidate {
                position: position.out_ref.clone(),
            })
            .await;
        match result {
            Ok(planned) => {
                assert!(below, "round {round}: healthy position liquidated");
                liquidated += 1;
                let plan = &planned.plan;
                let treasury: u64 = plan
                    .outputs_with_role(OutputRole::TreasuryRemainder)
                    .map(|output| output.value.coin())
                    .sum();
                assert_eq!(plan.released_lovelace + treasury, collateral);
                let debt = debt_value_lovelace(position.position.borrowed_amount, live_rate)?;
                assert!(plan.released_lovelace >= debt.min(collateral));

                let tx = assemble(plan, &fixture.deployment, &fixture.wallet)?;
                verify_balance(&tx)?;
            }
            Err(FinancingError::NotLiquidatable { .. }) => {
                assert!(!below, "round {round}: liquidatable position refused");
            }
            Err(other) => panic!("round {round}: unexpected error: {other}"),
        }
    }
    assert!(liquidated > 0);
    Ok(())
}

#[tokio::test]
async fn test_mutations_keep_collateral_ratio_at_live_rate() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0x1c0a);
    let mut accepted = 0;
    for round in 0..ROUNDS {
        let Some((deposit, collateral, balance)) = draw(&mut rng) else {
            continue;
        };
        let mut fixture = Fixture::new();
        fixture.set_oracle(balance, 1);
        fixture.add_deposit(0xd1, deposit);
        let Ok(planned) = fixture
            .plan(&LoanAction::Borrow {
                collateral,
                loan_amount: None,
            })
            .await
        else {
            continue;
        };
        let tx = assemble(&planned.plan, &fixture.deployment, &fixture.wallet)?;
        fixture.apply(&tx, 0x40);
        fixture.add_deposit(0xd2, ada(rng.gen_range(2..=500u64)));
        let view = fixture.session().list_loan_positions().await?[0].clone();
        let borrowed = view.position.borrowed_amount;

        // Price moves up to 30% either way.
        let moved = (balance * rng.gen_range(70..=130u64) / 100).max(1);
        fixture.set_oracle(moved, 1);

        let action = if rng.gen_bool(0.5) {
            LoanAction::IncreaseCollateral {
                position: view.out_ref.clone(),
                amount: ada(rng.gen_range(1..=500u64)),
            }
        } else {
            LoanAction::PartialRepay {
                position: view.out_ref.clone(),
                amount: rng.gen_range(1..=borrowed),
            }
        };

        match fixture.plan(&action).await {
            Ok(planned) => {
                accepted += 1;
                let position = planned.plan.produced_position().expect("position output");
                let rate = collateral_rate(&planned.references.oracle)?;
                assert_eq!(position.collateral_rate, rate);
                assert!(position.borrowed_amount >= planned.references.parameters.min_borrow);
                assert!(
                    meets_collateral_ratio(
                        position.collateral_amount,
                        position.borrowed_amount,
                        rate,
                        planned.references.parameters.collateral_ratio_bps,
                    )?,
                    "round {round}: {action:?} left an undercollateralized position"
                );
                let tx = assemble(&planned.plan, &fixture.deployment, &fixture.wallet)?;
                verify_balance(&tx)?;
            }
            Err(
                FinancingError::InsufficientCollateral { .. }
                | FinancingError::BelowMinimumBorrow { .. }
                | FinancingError::UseFullRepay { .. }
                | FinancingError::DustOutput { .. },
            ) => {}
            Err(other) => panic!("round {round}: unexpected error: {other}"),
        }
    }
    assert!(accepted > 0);
    Ok(())
}
