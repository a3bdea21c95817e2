use ledger_model::{AssetUnit, LedgerQuery, OutRef, Utxo};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{Lookup, OracleError, OracleSnapshot, ProtocolParameters, ReferenceData, ReferenceRole};

/// Where the two reference UTxOs live and which asset the oracle prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRefs {
    pub oracle: OutRef,
    pub parameters: OutRef,
    pub priced_unit: AssetUnit,
}

pub async fn lookup<Q>(ledger: &Q, out_ref: &OutRef) -> Result<Lookup<Utxo>, OracleError>
where
    Q: LedgerQuery + ?Sized,
{
    Ok(match ledger.utxo(out_ref).await? {
        Some(utxo) => Lookup::Found(utxo),
        None => Lookup::NotFound(out_ref.clone()),
    })
}

/// Reads and decodes the oracle and protocol-parameter UTxOs.
pub async fn read_reference_data<Q>(ledger: &Q, refs: &ReferenceRefs) -> Result<ReferenceData, OracleError>
where
    Q: LedgerQuery + ?Sized,
{
    let oracle_utxo = lookup(ledger, &refs.oracle)
        .await?
        .found(ReferenceRole::Oracle)?;
    let parameters_utxo = lookup(ledger, &refs.parameters)
        .await?
        .found(ReferenceRole::ProtocolParameters)?;

    let oracle = OracleSnapshot::from_utxo(&oracle_utxo, &refs.priced_unit)?;
    let parameters = ProtocolParameters::from_utxo(&parameters_utxo)?;

    info!(
        "✅ Reference data read: oracle {} prices {} units per {} ADA",
        oracle.out_ref, oracle.priced_balance, oracle.reference_ada
    );
    debug!(
        "  collateral ratio {}bps, liquidation ratio {}bps, min borrow {}",
        parameters.collateral_ratio_bps, parameters.liquidation_ratio_bps, parameters.min_borrow
    );

    Ok(ReferenceData { oracle, parameters })
}

/// Fails with `StaleReference` when either reference UTxO was spent after it was read.
pub async fn ensure_live<Q>(ledger: &Q, data: &ReferenceData) -> Result<(), OracleError>
where
    Q: LedgerQuery + ?Sized,
{
    for (role, out_ref) in [
        (ReferenceRole::Oracle, &data.oracle.out_ref),
        (ReferenceRole::ProtocolParameters, &data.parameters.out_ref),
    ] {
        if !lookup(ledger, out_ref).await?.is_found() {
            return Err(OracleError::StaleReference {
                role,
                out_ref: out_ref.clone(),
            });
        }
    }
    Ok(())
}
