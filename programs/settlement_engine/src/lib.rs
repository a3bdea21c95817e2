//! Transaction assembly for planned Statera transitions and the sign/submit
//! pipeline around it.

pub mod assembly;
pub mod error;
pub mod pipeline;

pub use assembly::{assemble, verify_balance, MintGroup, ScriptInput, UnsignedTransaction};
pub use error::{AssemblyError, SettlementError, SignerError};
pub use pipeline::{LendingClient, PreparedTransaction, SignedTransaction, WalletSigner};
