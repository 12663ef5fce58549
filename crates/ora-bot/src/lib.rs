//! # ora-bot
//!
//! Off-chain coordinator for the ORA staking oracle.
//!
//! Drives liveness, not safety: each cycle it reports prices for the nodes
//! it manages, finalizes the previous bucket once quorum is visible, slashes
//! outliers when enabled, and claims rewards. Every step is best-effort. A
//! failed step is logged and skipped; the core's invariants make a partial
//! cycle safe to resume.
//!
//! ## Modules
//!
//! - [`config`]: TOML configuration and per-node behaviour
//! - [`accounts`]: the identities the bot acts for
//! - [`ack`]: concurrent receipt waiting
//! - [`price`]: base price sources
//! - [`policy`]: quorum threshold, skip decisions and price noise
//! - [`audit`]: report index reconstruction from the event log
//! - [`setup`]: idempotent node funding and registration
//! - [`cycle`]: the reporting cycle

pub mod accounts;
pub mod ack;
pub mod audit;
pub mod config;
pub mod cycle;
pub mod policy;
pub mod price;
pub mod setup;

use ora_chain::ChainError;

/// Error types for coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Configuration could not be read or parsed.
    #[error("config: {0}")]
    Config(String),

    /// I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The ledger rejected or lost a request.
    #[error("chain: {0}")]
    Chain(#[from] ChainError),

    /// No price is available to anchor reports.
    #[error("no base price available")]
    NoBasePrice,
}

/// Convenience result type for coordinator operations.
pub type Result<T> = std::result::Result<T, BotError>;
