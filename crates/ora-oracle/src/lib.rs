//! # ora-oracle
//!
//! Stake-weighted price oracle consensus core.
//!
//! Independent reporters stake ORA, submit one price per time bucket, and a
//! bucket's canonical value is the median of its reports once the bucket has
//! closed. Reports that deviate from the recorded median beyond a
//! basis-point threshold can be proven by anyone and are slashed; idle stake
//! decays; every accepted report earns a fixed reward.
//!
//! The core is a sequential state machine. Ordering and atomicity come from
//! the ledger that drives it: every operation validates all of its
//! preconditions before it touches state, so a failed call leaves nothing
//! behind.
//!
//! ## Modules
//!
//! - [`clock`]: block height to bucket mapping
//! - [`registry`]: staked participants and the swap-and-pop address list
//! - [`reports`]: per-bucket, order-preserving report storage
//! - [`median`]: median computation
//! - [`slashing`]: deviation checks and outlier detection
//! - [`accountant`]: effective stake decay and report rewards
//! - [`token`]: the token bank seam the oracle pays through
//! - [`params`]: deployment constants
//! - [`oracle`]: the [`StakingOracle`](oracle::StakingOracle) state machine

pub mod accountant;
pub mod clock;
pub mod median;
pub mod oracle;
pub mod params;
pub mod registry;
pub mod reports;
pub mod slashing;
pub mod token;

pub use oracle::{CallContext, StakingOracle};
pub use params::OracleParams;

use ora_types::{Amount, BucketNumber};

/// Error types for oracle operations.
///
/// Every variant is a violated precondition. None of them is worth retrying
/// unchanged; callers skip and move on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// Stake is below the minimum, or a zero stake top-up was attempted.
    #[error("insufficient stake")]
    InsufficientStake,

    /// The address already holds a registration.
    #[error("node already registered")]
    NodeAlreadyRegistered,

    /// The address is not an active node.
    #[error("node not registered")]
    NodeNotRegistered,

    /// Price must be strictly positive.
    #[error("invalid price")]
    InvalidPrice,

    /// The node already reported in this bucket.
    #[error("already reported in bucket {0}")]
    AlreadyReportedInCurrentBucket(BucketNumber),

    /// Only buckets strictly before the current one may be finalized or slashed.
    #[error("only past buckets allowed: bucket {bucket}, current {current}")]
    OnlyPastBucketsAllowed {
        /// The bucket that was requested.
        bucket: BucketNumber,
        /// The bucket at call time.
        current: BucketNumber,
    },

    /// The bucket has no recorded median.
    #[error("median not recorded for bucket {0}")]
    MedianNotRecorded(BucketNumber),

    /// The bucket's median is already recorded and cannot change.
    #[error("median already recorded for bucket {0}")]
    MedianAlreadyRecorded(BucketNumber),

    /// A bucket without reports cannot be finalized.
    #[error("no reports in bucket {0}")]
    NoReportsInBucket(BucketNumber),

    /// The report is within the allowed deviation from the median.
    #[error("price not deviated")]
    NotDeviated,

    /// The node was already slashed for this bucket.
    #[error("node already slashed for bucket {0}")]
    NodeAlreadySlashed(BucketNumber),

    /// An index argument is past the end of its list.
    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        /// The supplied index.
        index: u64,
        /// Length of the list at call time.
        len: u64,
    },

    /// The supplied index resolves to a different node.
    #[error("node not at given index {0}")]
    NodeNotAtGivenIndex(u64),

    /// Every accepted report has already been claimed.
    #[error("no rewards available")]
    NoRewardsAvailable,

    /// Exit requested before the waiting period elapsed.
    #[error("waiting period not over: {elapsed} of {required} buckets")]
    WaitingPeriodNotOver {
        /// Buckets since the node's last activity.
        elapsed: u64,
        /// Buckets that must elapse.
        required: u64,
    },

    /// The payer's token balance cannot cover the transfer.
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance {
        /// Amount required.
        needed: Amount,
        /// Amount held.
        available: Amount,
    },

    /// Arithmetic overflow in an amount computation.
    #[error("arithmetic overflow")]
    Overflow,

    /// Deployment parameters are unusable.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;
