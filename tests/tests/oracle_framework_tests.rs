
use anyhow::Result;
use common::setup::{ada, deployment, out_ref, parameters, Fixture, ORACLE_BALANCE};
use ledger_model::{Address, SnapshotLedger, Utxo, Value};
use oracle_framework::{
    ensure_live, read_reference_data, OracleError, ProtocolParameters, ReferenceRole,
};

#[tokio::test]
async fn test_reads_oracle_and_parameters() -> Result<()> {
    let fixture = Fixture::new();
    let data = read_reference_data(&fixture.ledger, &fixture.deployment.reference_refs()).await?;

    assert_eq!(data.oracle.priced_balance, ORACLE_BALANCE);
    assert_eq!(data.oracle.reference_ada, 1);
    assert_eq!(data.oracle.priced_unit, fixture.tusd());
    assert_eq!(data.parameters, parameters());
    assert_eq!(
        data.reference_inputs(),
        vec![fixture.deployment.oracle.clone(), fixture.deployment.protocol_parameters.clone()]
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_oracle_names_its_role() {
    let mut fixture = Fixture::new();
    fixture.ledger.spend(&fixture.deployment.oracle.clone());

    let err = read_reference_data(&fixture.ledger, &fixture.deployment.reference_refs())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        OracleError::MissingReferenceInput {
            role: ReferenceRole::Oracle,
            out_ref: fixture.deployment.oracle.clone(),
        }
    );
}

#[tokio::test]
async fn test_empty_oracle_is_invalid() {
    let mut fixture = Fixture::new();
    fixture.set_oracle(0, 1);

    let err = read_reference_data(&fixture.ledger, &fixture.deployment.reference_refs())
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::InvalidOracleData(_)));
}

#[tokio::test]
async fn test_malformed_parameters_fail_fast() {
    let mut fixture = Fixture::new();
    fixture.ledger.insert(
        Utxo::new(
            out_ref(0x0b, 0),
            Address::new("addr_test1wzparams").unwrap(),
            Value::lovelace(ada(2)),
        )
        .with_datum(ProtocolParameters::to_datum(&ProtocolParameters {
            liquidation_ratio_bps: 16_000,
            ..parameters()
        })),
    );

    let err = read_reference_data(&fixture.ledger, &fixture.deployment.reference_refs())
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::InvalidProtocolParameters(_)));
}

#[tokio::test]
async fn test_spent_reference_is_stale() -> Result<()> {
    let mut fixture = Fixture::new();
    let data = read_reference_data(&fixture.ledger, &fixture.deployment.reference_refs()).await?;
    ensure_live(&fixture.ledger, &data).await?;

    fixture.ledger.spend(&fixture.deployment.protocol_parameters.clone());
    let err = ensure_live(&fixture.ledger, &data).await.unwrap_err();
    assert!(matches!(
        err,
        OracleError::StaleReference {
            role: ReferenceRole::ProtocolParameters,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn test_reads_from_json_snapshot() -> Result<()> {
    let deployment = deployment();
    let json = format!(
        r#"[
            {{
                "input": {{ "txHash": "{oracle}", "outputIndex": 0 }},
                "output": {{
                    "address": "addr_test1wzoracle",
                    "amount": [
                        {{ "unit": "lovelace", "quantity": "2000000" }},
                        {{ "unit": "{tusd}", "quantity": "30" }}
                    ],
                    "plutusData": {{ "constructor": 0, "fields": [{{ "int": 1 }}] }}
                }}
            }},
            {{
                "input": {{ "txHash": "{params}", "outputIndex": 0 }},
                "output": {{
                    "address": "addr_test1wzparams",
                    "amount": [{{ "unit": "lovelace", "quantity": "2000000" }}],
                    "plutusData": {{
                        "constructor": 0,
                        "fields": [{{ "int": 15000 }}, {{ "int": 12000 }}, {{ "int": 100 }}, {{ "int": 500 }}]
                    }}
                }}
            }}
        ]"#,
        oracle = deployment.oracle.tx_hash,
        params = deployment.protocol_parameters.tx_hash,
        tusd = deployment.loan_token_unit(),
    );
    let ledger = SnapshotLedger::from_json_str(&json)?;

    let data = read_reference_data(&ledger, &deployment.reference_refs()).await?;
    assert_eq!(data.oracle.priced_balance, 30);
    assert_eq!(data.parameters.min_borrow, 100);
    Ok(())
}
