//! # ora-chain
//!
//! Local development ledger for the ORA staking oracle.
//!
//! Stands in for the blockchain the oracle runs on: a totally ordered,
//! append-only log of blocks whose transactions execute atomically against
//! the [`StakingOracle`](ora_oracle::StakingOracle) and the ORA token
//! balances. Transactions queue in a pending pool and execute when a block
//! is mined, ordered by submission subject to per-sender nonces.
//!
//! ## Modules
//!
//! - [`tx`]: calls, transactions and receipts
//! - [`chain`]: the synchronous [`LocalChain`](chain::LocalChain)
//! - [`handle`]: shared async handle, receipt waiting and the interval miner

pub mod chain;
pub mod handle;
pub mod tx;

pub use chain::LocalChain;
pub use handle::ChainHandle;
pub use tx::{Call, Receipt, Transaction};

use ora_oracle::OracleError;

/// Error types for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The oracle rejected the call or its parameters.
    #[error("oracle: {0}")]
    Oracle(#[from] OracleError),

    /// A transaction's nonce was already used by its sender.
    #[error("nonce too low: expected {expected}, got {got}")]
    NonceTooLow {
        /// The sender's next nonce.
        expected: u64,
        /// The nonce on the transaction.
        got: u64,
    },

    /// No receipt appeared within the allowed time.
    #[error("timed out waiting for receipt of {0}")]
    ReceiptTimeout(String),

    /// The hash is neither pending nor mined.
    #[error("unknown transaction {0}")]
    UnknownTransaction(String),
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, ChainError>;
