//! Stake and reward accounting.
//!
//! Idle stake decays: every completed bucket since registration in which the
//! node did not report costs `inactivity_penalty`. The current bucket is not
//! yet complete, so a report filed in it does not pay down past misses.

use ora_types::{Amount, BucketNumber, NodeInfo};

use crate::{OracleError, Result};

/// Completed buckets since registration in which `node` filed no report.
pub fn missed_reports(node: &NodeInfo, current_bucket: BucketNumber) -> u64 {
    if !node.active || current_bucket <= node.first_bucket {
        return 0;
    }
    let expected = current_bucket - node.first_bucket;
    let mut completed = node.report_count;
    if node.last_reported_bucket == current_bucket && completed > 0 {
        completed -= 1;
    }
    expected.saturating_sub(completed)
}

/// Staked amount minus accrued inactivity penalty, floored at zero.
///
/// Inactive nodes have no effective stake.
pub fn effective_stake(
    node: &NodeInfo,
    current_bucket: BucketNumber,
    inactivity_penalty: Amount,
) -> Amount {
    if !node.active {
        return 0;
    }
    let missed = Amount::from(missed_reports(node, current_bucket));
    let penalty = missed.saturating_mul(inactivity_penalty);
    node.staked_amount.saturating_sub(penalty)
}

/// Reward owed for `node`'s unclaimed reports.
///
/// # Errors
///
/// - [`OracleError::NoRewardsAvailable`] if every report is already claimed
/// - [`OracleError::Overflow`] if the reward does not fit
pub fn pending_reward(node: &NodeInfo, reward_per_report: Amount) -> Result<Amount> {
    let unclaimed = node.unclaimed_reports();
    if unclaimed == 0 {
        return Err(OracleError::NoRewardsAvailable);
    }
    reward_per_report
        .checked_mul(Amount::from(unclaimed))
        .ok_or(OracleError::Overflow)
}

/// Buckets elapsed since the node last did something.
///
/// Activity is the last report, or registration if it never reported.
pub fn idle_buckets(node: &NodeInfo, current_bucket: BucketNumber) -> u64 {
    let last_activity = if node.last_reported_bucket != 0 {
        node.last_reported_bucket
    } else {
        node.first_bucket
    };
    current_bucket.saturating_sub(last_activity)
}
