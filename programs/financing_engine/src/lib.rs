//! Loan amount calculator and loan position lifecycle for the Statera
//! collateral pool. Planning is pure: every action turns one account slot and
//! one oracle read into a declarative [`TransitionPlan`].

pub mod account;
pub mod calculator;
pub mod deployment;
pub mod error;
pub mod lifecycle;
pub mod nft;
pub mod plan;
pub mod position;
pub mod redeemer;
pub mod session;

pub use account::{list_positions, quote_max_borrow, AccountPhase, AccountState, PositionView};
pub use calculator::{
    collateral_rate, collateral_ratio, compute_loan, max_borrowable, meets_collateral_ratio,
    required_collateral, CalculatorError, LoanQuote, RATE_SCALE,
};
pub use deployment::{
    CollateralValidator, FeeModel, LoanNftPolicy, MintingPolicy, PlutusScript, PlutusVersion,
    ProtocolDeployment, TxShape,
};
pub use error::{ConfigError, FinancingError};
pub use lifecycle::{plan_transition, LoanAction, PlanningContext};
pub use nft::{LoanNftId, BORROWER_LABEL, REFERENCE_LABEL};
pub use plan::{
    ActionKind, MintEntry, OutputRole, PlannedOutput, PolicyRole, ScriptSpend, TransitionPlan,
};
pub use position::{
    CollateralDeposit, DepositUtxo, LoanPosition, LoanUtxo, PoolDatum, COLLATERAL_ASSET_ADA,
};
pub use redeemer::{CollateralRedeemer, MintRedeemer};
pub use session::{LendingSession, PlannedTransition, WalletContext};
