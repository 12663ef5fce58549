//! Oracle events.
//!
//! Events are append-only and externally observable. Readers reconstruct
//! audit indices (a report's position inside its bucket) by ordering logged
//! events by [`LogPosition`], never by arrival time.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, BlockHeight, BucketNumber, Price};

/// All events emitted by the staking oracle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OracleEvent {
    NodeRegistered {
        node: Address,
        stake: Amount,
    },
    NodeExited {
        node: Address,
        amount: Amount,
    },
    StakeAdded {
        node: Address,
        amount: Amount,
    },
    PriceReported {
        node: Address,
        price: Price,
        bucket: BucketNumber,
        /// Zero-based position of this report within its bucket.
        report_index: u64,
    },
    BucketMedianRecorded {
        bucket: BucketNumber,
        median: Price,
    },
    NodeSlashed {
        node: Address,
        bucket: BucketNumber,
        amount: Amount,
    },
    RewardClaimed {
        node: Address,
        amount: Amount,
    },
}

impl OracleEvent {
    /// Event name as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeRegistered { .. } => "NodeRegistered",
            Self::NodeExited { .. } => "NodeExited",
            Self::StakeAdded { .. } => "StakeAdded",
            Self::PriceReported { .. } => "PriceReported",
            Self::BucketMedianRecorded { .. } => "BucketMedianRecorded",
            Self::NodeSlashed { .. } => "NodeSlashed",
            Self::RewardClaimed { .. } => "RewardClaimed",
        }
    }
}

/// Total ledger order: block height, then position inside the block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogPosition {
    pub height: BlockHeight,
    pub index: u32,
}

/// An event together with where the ledger placed it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub position: LogPosition,
    pub event: OracleEvent,
}
