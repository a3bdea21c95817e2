
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use common::setup::{ada, out_ref, tx_hash, Fixture};
use financing_engine::{AccountPhase, FinancingError, LoanAction};
use ledger_model::TxHash;
use settlement_engine::{
    LendingClient, PreparedTransaction, SettlementError, SignedTransaction, SignerError,
    UnsignedTransaction, WalletSigner,
};

/// Wallet double: signs everything unless told to refuse, and records what it saw.
struct FakeWallet {
    next_hash: TxHash,
    refuse: bool,
    signed: Mutex<Vec<UnsignedTransaction>>,
}

impl FakeWallet {
    fn accepting(next_hash: TxHash) -> Self {
        Self {
            next_hash,
            refuse: false,
            signed: Mutex::new(Vec::new()),
        }
    }

    fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::accepting(tx_hash(0))
        }
    }
}

#[async_trait]
impl WalletSigner for FakeWallet {
    async fn sign(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction, SignerError> {
        if self.refuse {
            return Err(SignerError::Rejected("user declined".into()));
        }
        self.signed.lock().expect("signer lock").push(tx.clone());
        Ok(SignedTransaction {
            cbor_hex: "84a400".into(),
        })
    }

    async fn submit(&self, _tx: &SignedTransaction) -> Result<TxHash, SignerError> {
        Ok(self.next_hash.clone())
    }
}

/// Prepares, signs and submits `action`, then confirms it on the snapshot.
async fn confirm(fixture: &mut Fixture, action: &LoanAction, tag: u8) -> Result<PreparedTransaction> {
    let wallet = FakeWallet::accepting(tx_hash(tag));
    let prepared = {
        let client = LendingClient::new(fixture.session(), &wallet);
        let prepared = client.prepare(action).await?;
        assert_eq!(client.submit(&prepared).await?, tx_hash(tag));
        prepared
    };
    assert_eq!(wallet.signed.lock().expect("signer lock").len(), 1);
    fixture.apply(&prepared.tx, tag);
    Ok(prepared)
}

fn wallet_lovelace(fixture: &Fixture) -> u64 {
    fixture.wallet.spendable().map(|utxo| utxo.coin()).sum()
}

#[tokio::test]
async fn test_full_loan_lifecycle() -> Result<()> {
    let mut fixture = Fixture::new();
    let starting = wallet_lovelace(&fixture);
    let mut fees = 0;

    // ========== DEPOSIT ==========
    let prepared = confirm(&mut fixture, &LoanAction::Deposit { amount: ada(400) }, 0x21).await?;
    fees += prepared.tx.fee;
    let account = fixture.session().load_account().await?;
    assert_eq!(account.phase(), AccountPhase::HasDeposit);
    assert_eq!(account.deposit_total()?, ada(400));

    // ========== BORROW ==========
    let borrow = LoanAction::Borrow {
        collateral: ada(300),
        loan_amount: None,
    };
    let prepared = confirm(&mut fixture, &borrow, 0x22).await?;
    fees += prepared.tx.fee;
    let views = fixture.session().list_loan_positions().await?;
    assert_eq!(views.len(), 1);
    // The NFT is named after the deposit the borrow consumed.
    let loan_nft = views[0].loan_nft.clone();
    assert_eq!(loan_nft, fixture.loan_nft(&out_ref(0x21, 0)));
    let holdings = fixture.wallet.holdings()?;
    assert_eq!(holdings.quantity_of(&loan_nft), 1);
    assert_eq!(holdings.quantity_of(&fixture.tusd()), 4_799);
    assert_eq!(views[0].position.borrowed_amount, 4_799);
    assert!(views[0].health.healthy);
    let position = views[0].out_ref.clone();

    // ========== PARTIAL REPAY ==========
    let prepared = confirm(
        &mut fixture,
        &LoanAction::PartialRepay {
            position,
            amount: 1_000,
        },
        0x23,
    )
    .await?;
    fees += prepared.tx.fee;
    assert_eq!(fixture.wallet.holdings()?.quantity_of(&fixture.tusd()), 3_799);
    let views = fixture.session().list_loan_positions().await?;
    assert_eq!(views[0].position.borrowed_amount, 3_799);
    let position = views[0].out_ref.clone();

    // ========== REPAY ==========
    let prepared = confirm(&mut fixture, &LoanAction::Repay { position }, 0x24).await?;
    fees += prepared.tx.fee;
    let holdings = fixture.wallet.holdings()?;
    assert_eq!(holdings.quantity_of(&loan_nft), 0);
    assert_eq!(holdings.quantity_of(&fixture.tusd()), 0);
    let account = fixture.session().load_account().await?;
    assert_eq!(account.phase(), AccountPhase::HasDeposit);
    assert_eq!(account.deposits.len(), 1);
    assert_eq!(account.deposit_total()?, ada(400));

    // ========== WITHDRAW ==========
    let prepared = confirm(&mut fixture, &LoanAction::Withdraw, 0x25).await?;
    fees += prepared.tx.fee;
    let account = fixture.session().load_account().await?;
    assert_eq!(account.phase(), AccountPhase::NoAccount);

    // Everything except the fees came back to the wallet.
    assert_eq!(wallet_lovelace(&fixture) + fees, starting);
    Ok(())
}

#[tokio::test]
async fn test_liquidating_another_position_keeps_own_loan() -> Result<()> {
    let mut fixture = Fixture::new();
    fixture.add_deposit(0xd1, ada(400));
    confirm(
        &mut fixture,
        &LoanAction::Borrow {
            collateral: ada(300),
            loan_amount: Some(1_000),
        },
        0x22,
    )
    .await?;
    let own = fixture.session().list_loan_positions().await?[0].clone();

    // Someone else's position, liquidatable once ADA drops.
    let other = fixture.add_position(0xe1, 4_799, ada(300), 41_667);
    fixture.give_tusd(0xf1, 4_799);
    fixture.set_oracle(19, 1);

    let prepared = confirm(&mut fixture, &LoanAction::Liquidate { position: other }, 0x23).await?;
    assert!(prepared
        .planned
        .plan
        .mints
        .iter()
        .all(|mint| mint.unit != own.loan_nft));

    assert_eq!(fixture.wallet.holdings()?.quantity_of(&own.loan_nft), 1);
    let views = fixture.session().list_loan_positions().await?;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].out_ref, own.out_ref);
    assert_eq!(views[0].loan_nft, own.loan_nft);

    // Still controllable: the borrower can pay part of it back.
    let planned = fixture
        .plan(&LoanAction::PartialRepay {
            position: own.out_ref.clone(),
            amount: 500,
        })
        .await?;
    assert_eq!(planned.plan.presented, vec![own.loan_nft.clone()]);
    Ok(())
}

#[tokio::test]
async fn test_confirmed_position_decodes_to_planned_fields() -> Result<()> {
    let mut fixture = Fixture::new();
    fixture.add_deposit(0xd1, ada(400));
    let prepared = confirm(
        &mut fixture,
        &LoanAction::Borrow {
            collateral: ada(300),
            loan_amount: Some(4_000),
        },
        0x26,
    )
    .await?;
    let planned = prepared.planned.plan.produced_position().expect("position output");

    let account = fixture.session().load_account().await?;
    assert_eq!(account.phase(), AccountPhase::HasLoan);
    assert_eq!(account.loans.len(), 1);
    assert_eq!(account.loans[0].position, planned);

    // Feeding the decoded position back in plans the same next state.
    let first = fixture
        .plan(&LoanAction::PartialRepay {
            position: account.loans[0].utxo.out_ref().clone(),
            amount: 500,
        })
        .await?;
    let again = fixture
        .plan(&LoanAction::PartialRepay {
            position: account.loans[0].utxo.out_ref().clone(),
            amount: 500,
        })
        .await?;
    assert_eq!(first.plan.outputs, again.plan.outputs);
    let next = first.plan.produced_position().expect("position output");
    assert_eq!(next.borrowed_amount, 3_500);
    assert_eq!(next.collateral_amount, planned.collateral_amount);
    Ok(())
}

#[tokio::test]
async fn test_refused_signature_leaves_ledger_untouched() -> Result<()> {
    let fixture = Fixture::new();
    let wallet = FakeWallet::refusing();
    let client = LendingClient::new(fixture.session(), &wallet);

    let err = client
        .execute(&LoanAction::Deposit { amount: ada(10) })
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Signer(SignerError::Rejected(_))));
    assert_eq!(
        fixture.session().load_account().await?.phase(),
        AccountPhase::NoAccount
    );
    Ok(())
}

#[tokio::test]
async fn test_oracle_update_after_planning_is_stale() -> Result<()> {
    let mut fixture = Fixture::new();
    fixture.add_deposit(0xd1, ada(400));
    let planned = fixture
        .plan(&LoanAction::Borrow {
            collateral: ada(300),
            loan_amount: None,
        })
        .await?;

    fixture.ledger.spend(&fixture.deployment.oracle.clone());
    let err = fixture.session().ensure_fresh(&planned).await.unwrap_err();
    assert!(matches!(err, FinancingError::StaleOracleData(_)));
    Ok(())
}

#[tokio::test]
async fn test_second_transition_from_same_slot_is_stale() -> Result<()> {
    let mut fixture = Fixture::new();
    let deposit = fixture.add_deposit(0xd1, ada(100));

    let first = {
        let wallet = FakeWallet::accepting(tx_hash(0x31));
        let client = LendingClient::new(fixture.session(), &wallet);
        client.prepare(&LoanAction::Deposit { amount: ada(10) }).await?
    };
    let second = fixture
        .plan(&LoanAction::PartialWithdraw { amount: ada(20) })
        .await?;

    fixture.apply(&first.tx, 0x31);
    assert_eq!(
        fixture.session().ensure_fresh(&second).await.unwrap_err(),
        FinancingError::StaleAccountState { out_ref: deposit }
    );

    // Re-planning from fresh reads sees the consolidated deposit.
    let replanned = fixture
        .plan(&LoanAction::PartialWithdraw { amount: ada(20) })
        .await?;
    fixture.session().ensure_fresh(&replanned).await?;
    assert_eq!(replanned.plan.outputs[0].value.coin(), ada(90));
    Ok(())
}
