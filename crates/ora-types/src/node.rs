//! Node record as exposed to readers of the oracle.

use serde::{Deserialize, Serialize};

use crate::{Amount, BucketNumber};

/// A staking participant's record.
///
/// `first_bucket == 0` means the address never registered (or was removed).
/// `claimed_report_count <= report_count` always holds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Nominal stake deposited, in base units.
    pub staked_amount: Amount,
    /// Last bucket this node successfully reported in (0 = never).
    pub last_reported_bucket: BucketNumber,
    /// Accepted reports over the node's lifetime.
    pub report_count: u64,
    /// Reports whose reward has already been claimed.
    pub claimed_report_count: u64,
    /// Bucket at registration.
    pub first_bucket: BucketNumber,
    /// False once the node exits or is slashed to zero.
    pub active: bool,
}

impl NodeInfo {
    /// Reports whose reward has not been claimed yet.
    pub fn unclaimed_reports(&self) -> u64 {
        self.report_count.saturating_sub(self.claimed_report_count)
    }

    /// Whether this address currently holds a registration.
    pub fn is_registered(&self) -> bool {
        self.first_bucket != 0
    }
}
