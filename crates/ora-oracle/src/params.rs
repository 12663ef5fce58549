//! Deployment constants.
//!
//! Fixed when the oracle is created and never mutated afterwards. The
//! defaults are the values of the reference deployment.

use ora_types::{ora, Amount, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};

use crate::clock::BucketClock;
use crate::{OracleError, Result};

/// Block heights per bucket.
pub const DEFAULT_BUCKET_WINDOW: u64 = 24;

/// Minimum effective stake to register and to report.
pub const DEFAULT_MINIMUM_STAKE: Amount = ora(100);

/// Stake decay per missed bucket.
pub const DEFAULT_INACTIVITY_PENALTY: Amount = ora(1);

/// Stake removed per proven misreport.
pub const DEFAULT_MISREPORT_PENALTY: Amount = ora(100);

/// Allowed deviation from the median (1000 bps = 10%).
pub const DEFAULT_MAX_DEVIATION_BPS: u128 = 1_000;

/// Share of the misreport penalty paid to the slasher.
pub const DEFAULT_SLASHER_REWARD_PERCENTAGE: u128 = 10;

/// Reward minted per accepted report.
pub const DEFAULT_REWARD_PER_REPORT: Amount = ora(1);

/// Buckets a node must stay idle before it may exit.
pub const DEFAULT_WAITING_PERIOD: u64 = 2;

/// The oracle's deployment constants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleParams {
    pub bucket_window: u64,
    pub minimum_stake: Amount,
    pub inactivity_penalty: Amount,
    pub misreport_penalty: Amount,
    pub max_deviation_bps: u128,
    pub slasher_reward_percentage: u128,
    pub reward_per_report: Amount,
    pub waiting_period: u64,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            bucket_window: DEFAULT_BUCKET_WINDOW,
            minimum_stake: DEFAULT_MINIMUM_STAKE,
            inactivity_penalty: DEFAULT_INACTIVITY_PENALTY,
            misreport_penalty: DEFAULT_MISREPORT_PENALTY,
            max_deviation_bps: DEFAULT_MAX_DEVIATION_BPS,
            slasher_reward_percentage: DEFAULT_SLASHER_REWARD_PERCENTAGE,
            reward_per_report: DEFAULT_REWARD_PER_REPORT,
            waiting_period: DEFAULT_WAITING_PERIOD,
        }
    }
}

impl OracleParams {
    /// Check the parameters are internally consistent.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidParams`] for a zero bucket window, a zero
    ///   minimum stake, a deviation threshold above 100%, or a slasher share
    ///   above 100%.
    pub fn validate(&self) -> Result<()> {
        if self.bucket_window == 0 {
            return Err(OracleError::InvalidParams(
                "bucket window must be positive".to_string(),
            ));
        }
        if self.minimum_stake == 0 {
            return Err(OracleError::InvalidParams(
                "minimum stake must be positive".to_string(),
            ));
        }
        if self.max_deviation_bps > BPS_DENOMINATOR {
            return Err(OracleError::InvalidParams(format!(
                "max deviation {} bps exceeds {BPS_DENOMINATOR}",
                self.max_deviation_bps
            )));
        }
        if self.slasher_reward_percentage > 100 {
            return Err(OracleError::InvalidParams(format!(
                "slasher reward {}% exceeds 100%",
                self.slasher_reward_percentage
            )));
        }
        Ok(())
    }

    /// The bucket clock these parameters define.
    pub fn clock(&self) -> BucketClock {
        BucketClock::new(self.bucket_window)
    }

    /// Slasher's cut of a penalty.
    pub fn slasher_reward(&self, penalty: Amount) -> Amount {
        penalty.saturating_mul(self.slasher_reward_percentage) / 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let params = OracleParams::default();
        params.validate().expect("defaults are valid");
        assert_eq!(params.bucket_window, 24);
        assert_eq!(params.max_deviation_bps, 1_000);
        assert_eq!(params.waiting_period, 2);
    }

    #[test]
    fn test_zero_window_rejected() {
        let params = OracleParams {
            bucket_window: 0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(OracleError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_slasher_share_over_100_rejected() {
        let params = OracleParams {
            slasher_reward_percentage: 101,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_slasher_reward() {
        let params = OracleParams::default();
        assert_eq!(params.slasher_reward(ora(100)), ora(10));
        assert_eq!(params.slasher_reward(0), 0);
    }

    #[test]
    fn test_params_from_json() {
        // amounts exceed i64, so they travel as plain u128 numbers
        let params: OracleParams = serde_json::from_str(
            r#"{
                "bucket_window": 10,
                "minimum_stake": 100000000000000000000,
                "inactivity_penalty": 1000000000000000000,
                "misreport_penalty": 100000000000000000000,
                "max_deviation_bps": 500,
                "slasher_reward_percentage": 20,
                "reward_per_report": 5,
                "waiting_period": 3
            }"#,
        )
        .expect("parse params");
        params.validate().expect("valid");
        assert_eq!(params.clock().window(), 10);
        assert_eq!(params.minimum_stake, ora(100));
        assert_eq!(params.inactivity_penalty, ora(1));

        let json = serde_json::to_string(&OracleParams::default()).expect("serialize");
        let back: OracleParams = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, OracleParams::default());
    }
}
