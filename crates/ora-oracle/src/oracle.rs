//! The staking oracle state machine.
//!
//! Every mutating operation follows the same shape: read the current bucket
//! from the call's block height, check every precondition, move tokens
//! through the [`TokenBank`] (the only step that can still fail), then
//! apply the state change and return the events it produced. Nothing is
//! mutated on an error path.

use ora_types::{Address, Amount, BlockHeight, BucketNumber, NodeInfo, OracleEvent, Price};
use tracing::{debug, info, warn};

use crate::accountant;
use crate::median;
use crate::params::OracleParams;
use crate::registry::NodeRegistry;
use crate::reports::ReportLedger;
use crate::slashing;
use crate::token::TokenBank;
use crate::{OracleError, Result};

/// Who is calling, and at what height the call executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub height: BlockHeight,
}

impl CallContext {
    /// Create a call context.
    pub fn new(caller: Address, height: BlockHeight) -> Self {
        Self { caller, height }
    }
}

/// Stake-weighted, bucketed price oracle.
#[derive(Clone, Debug)]
pub struct StakingOracle {
    params: OracleParams,
    registry: NodeRegistry,
    ledger: ReportLedger,
}

impl StakingOracle {
    /// Create an oracle with the given deployment parameters.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidParams`] if the parameters do not validate
    pub fn new(params: OracleParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            registry: NodeRegistry::new(),
            ledger: ReportLedger::new(),
        })
    }

    /// Deployment parameters.
    pub fn params(&self) -> &OracleParams {
        &self.params
    }

    /// The node registry.
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// The report ledger.
    pub fn ledger(&self) -> &ReportLedger {
        &self.ledger
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Bucket containing `height`.
    pub fn current_bucket_number(&self, height: BlockHeight) -> BucketNumber {
        self.params.clock().bucket_at(height)
    }

    /// Recorded median for `bucket`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::MedianNotRecorded`] if the bucket is not finalized
    pub fn get_past_price(&self, bucket: BucketNumber) -> Result<Price> {
        self.ledger
            .bucket(bucket)
            .and_then(|b| b.median())
            .ok_or(OracleError::MedianNotRecorded(bucket))
    }

    /// Recorded median of the bucket before the current one.
    ///
    /// # Errors
    ///
    /// - [`OracleError::MedianNotRecorded`] if that bucket is not finalized
    pub fn get_latest_price(&self, height: BlockHeight) -> Result<Price> {
        let current = self.current_bucket_number(height);
        self.get_past_price(current.saturating_sub(1))
    }

    /// Effective stake of `node` at `height`; 0 for unknown or inactive nodes.
    pub fn get_effective_stake(&self, node: &Address, height: BlockHeight) -> Amount {
        match self.registry.get(node) {
            Some(info) => accountant::effective_stake(
                info,
                self.current_bucket_number(height),
                self.params.inactivity_penalty,
            ),
            None => 0,
        }
    }

    /// Nodes whose report in `bucket` deviates from its recorded median.
    ///
    /// # Errors
    ///
    /// - [`OracleError::MedianNotRecorded`] if the bucket is not finalized
    pub fn get_outlier_nodes(&self, bucket: BucketNumber) -> Result<Vec<Address>> {
        let b = self
            .ledger
            .bucket(bucket)
            .ok_or(OracleError::MedianNotRecorded(bucket))?;
        let median = b.median().ok_or(OracleError::MedianNotRecorded(bucket))?;
        Ok(slashing::outliers(b, median, self.params.max_deviation_bps))
    }

    /// `(price, slashed)` for `node` in `bucket`.
    pub fn get_slashed_status(&self, node: &Address, bucket: BucketNumber) -> (Price, bool) {
        self.ledger.slashed_status(node, bucket)
    }

    /// Active node addresses in registry order.
    pub fn get_node_addresses(&self) -> Vec<Address> {
        self.registry.addresses().to_vec()
    }

    /// Full record of `node` (zeroed if unregistered).
    pub fn get_node_info(&self, node: &Address) -> NodeInfo {
        self.registry.info(node)
    }

    // ---------------------------------------------------------------------
    // Node registry
    // ---------------------------------------------------------------------

    /// Register the caller with `stake`, pulled from its balance.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InsufficientStake`] if `stake` is below the minimum
    /// - [`OracleError::NodeAlreadyRegistered`] if the caller is registered
    /// - [`OracleError::InsufficientBalance`] if the caller cannot pay
    pub fn register_node(
        &mut self,
        ctx: &CallContext,
        bank: &mut impl TokenBank,
        stake: Amount,
    ) -> Result<Vec<OracleEvent>> {
        if stake < self.params.minimum_stake {
            return Err(OracleError::InsufficientStake);
        }
        if self.registry.get(&ctx.caller).is_some() {
            return Err(OracleError::NodeAlreadyRegistered);
        }
        bank.deposit(&ctx.caller, stake)?;

        let bucket = self.current_bucket_number(ctx.height);
        self.registry.insert(ctx.caller, stake, bucket)?;
        info!(node = %ctx.caller, stake, bucket, "oracle: node registered");
        Ok(vec![OracleEvent::NodeRegistered {
            node: ctx.caller,
            stake,
        }])
    }

    /// Add `amount` to the caller's stake.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InsufficientStake`] if `amount` is zero
    /// - [`OracleError::NodeNotRegistered`] if the caller is not active
    /// - [`OracleError::InsufficientBalance`] if the caller cannot pay
    /// - [`OracleError::Overflow`] if the stake would overflow
    pub fn add_stake(
        &mut self,
        ctx: &CallContext,
        bank: &mut impl TokenBank,
        amount: Amount,
    ) -> Result<Vec<OracleEvent>> {
        if amount == 0 {
            return Err(OracleError::InsufficientStake);
        }
        let staked = self.registry.active(&ctx.caller)?.staked_amount;
        let new_stake = staked.checked_add(amount).ok_or(OracleError::Overflow)?;
        bank.deposit(&ctx.caller, amount)?;

        if let Some(node) = self.registry.get_mut(&ctx.caller) {
            node.staked_amount = new_stake;
        }
        debug!(node = %ctx.caller, amount, new_stake, "oracle: stake added");
        Ok(vec![OracleEvent::StakeAdded {
            node: ctx.caller,
            amount,
        }])
    }

    /// Exit the caller, paying out its effective stake.
    ///
    /// `index` is the caller's position in [`get_node_addresses`](Self::get_node_addresses)
    /// and is re-checked before anything moves.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NodeNotRegistered`] if the caller is not active
    /// - [`OracleError::WaitingPeriodNotOver`] if the caller was active too recently
    /// - [`OracleError::IndexOutOfBounds`] / [`OracleError::NodeNotAtGivenIndex`]
    ///   if `index` does not resolve to the caller
    pub fn exit_node(
        &mut self,
        ctx: &CallContext,
        bank: &mut impl TokenBank,
        index: u64,
    ) -> Result<Vec<OracleEvent>> {
        let current = self.current_bucket_number(ctx.height);
        let node = self.registry.active(&ctx.caller)?;
        let elapsed = accountant::idle_buckets(node, current);
        if elapsed < self.params.waiting_period {
            return Err(OracleError::WaitingPeriodNotOver {
                elapsed,
                required: self.params.waiting_period,
            });
        }
        self.registry.verify_index(index, &ctx.caller)?;

        let payout = accountant::effective_stake(node, current, self.params.inactivity_penalty);
        bank.withdraw(&ctx.caller, payout)?;
        self.registry.remove(&ctx.caller, index)?;

        info!(node = %ctx.caller, payout, bucket = current, "oracle: node exited");
        Ok(vec![OracleEvent::NodeExited {
            node: ctx.caller,
            amount: payout,
        }])
    }

    // ---------------------------------------------------------------------
    // Reporting and finalization
    // ---------------------------------------------------------------------

    /// Record the caller's price for the current bucket.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NodeNotRegistered`] if the caller is not active
    /// - [`OracleError::InvalidPrice`] if `price` is zero
    /// - [`OracleError::InsufficientStake`] if effective stake is below the minimum
    /// - [`OracleError::AlreadyReportedInCurrentBucket`] on a second report
    pub fn report_price(&mut self, ctx: &CallContext, price: Price) -> Result<Vec<OracleEvent>> {
        let current = self.current_bucket_number(ctx.height);
        let node = self.registry.active(&ctx.caller)?;
        if price == 0 {
            return Err(OracleError::InvalidPrice);
        }
        let effective =
            accountant::effective_stake(node, current, self.params.inactivity_penalty);
        if effective < self.params.minimum_stake {
            return Err(OracleError::InsufficientStake);
        }
        if node.last_reported_bucket == current || self.ledger.has_reported(&ctx.caller, current) {
            return Err(OracleError::AlreadyReportedInCurrentBucket(current));
        }

        let report_index = self.ledger.append(current, ctx.caller, price)?;
        if let Some(node) = self.registry.get_mut(&ctx.caller) {
            node.last_reported_bucket = current;
            node.report_count += 1;
        }
        debug!(node = %ctx.caller, price, bucket = current, report_index, "oracle: price reported");
        Ok(vec![OracleEvent::PriceReported {
            node: ctx.caller,
            price,
            bucket: current,
            report_index,
        }])
    }

    /// Finalize the median of a past bucket.
    ///
    /// The median covers every report in the bucket. Quorum is the caller's
    /// policy, not a precondition here.
    ///
    /// # Errors
    ///
    /// - [`OracleError::OnlyPastBucketsAllowed`] unless `bucket` is strictly past
    /// - [`OracleError::MedianAlreadyRecorded`] if already finalized
    /// - [`OracleError::NoReportsInBucket`] if nobody reported
    pub fn record_bucket_median(
        &mut self,
        ctx: &CallContext,
        bucket: BucketNumber,
    ) -> Result<Vec<OracleEvent>> {
        self.require_past(bucket, ctx.height)?;
        let b = self
            .ledger
            .bucket(bucket)
            .ok_or(OracleError::NoReportsInBucket(bucket))?;
        if b.median().is_some() {
            return Err(OracleError::MedianAlreadyRecorded(bucket));
        }
        let median =
            median::median(&b.prices()).ok_or(OracleError::NoReportsInBucket(bucket))?;
        let reports = b.len();

        self.ledger.record_median(bucket, median)?;
        info!(bucket, median, reports, "oracle: bucket median recorded");
        Ok(vec![OracleEvent::BucketMedianRecorded { bucket, median }])
    }

    // ---------------------------------------------------------------------
    // Slashing
    // ---------------------------------------------------------------------

    /// Slash `node` for its report in `bucket`.
    ///
    /// The penalty is seized from escrow. The caller receives
    /// `slasher_reward_percentage` of it and the remainder is burned.
    ///
    /// `report_index` is the report's position in the bucket and
    /// `registry_index` the node's current position in the registry list.
    /// Both are verified against `node` rather than trusted.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NodeNotRegistered`] if `node` is not active
    /// - [`OracleError::OnlyPastBucketsAllowed`] unless `bucket` is strictly past
    /// - [`OracleError::MedianNotRecorded`] if `bucket` is not finalized
    /// - [`OracleError::IndexOutOfBounds`] / [`OracleError::NodeNotAtGivenIndex`]
    ///   if either index does not resolve to `node`
    /// - [`OracleError::NotDeviated`] if the report is within the threshold
    /// - [`OracleError::NodeAlreadySlashed`] if already slashed for `bucket`
    pub fn slash_node(
        &mut self,
        ctx: &CallContext,
        bank: &mut impl TokenBank,
        node: Address,
        bucket: BucketNumber,
        report_index: u64,
        registry_index: u64,
    ) -> Result<Vec<OracleEvent>> {
        let staked = self.registry.active(&node)?.staked_amount;
        self.require_past(bucket, ctx.height)?;
        let b = self
            .ledger
            .bucket(bucket)
            .ok_or(OracleError::MedianNotRecorded(bucket))?;
        let median = b.median().ok_or(OracleError::MedianNotRecorded(bucket))?;
        let price = b.verified_report(report_index, &node)?;
        self.registry.verify_index(registry_index, &node)?;
        if !slashing::is_deviated(price, median, self.params.max_deviation_bps) {
            return Err(OracleError::NotDeviated);
        }
        if b.is_slashed(&node) {
            return Err(OracleError::NodeAlreadySlashed(bucket));
        }

        let penalty = self.params.misreport_penalty.min(staked);
        let reward = self.params.slasher_reward(penalty);
        bank.forfeit(penalty, &ctx.caller, reward)?;

        self.ledger.mark_slashed(bucket, node)?;
        let remaining = staked - penalty;
        let mut events = vec![OracleEvent::NodeSlashed {
            node,
            bucket,
            amount: penalty,
        }];
        if remaining == 0 {
            self.registry.remove(&node, registry_index)?;
            events.push(OracleEvent::NodeExited { node, amount: 0 });
        } else if let Some(info) = self.registry.get_mut(&node) {
            info.staked_amount = remaining;
        }

        warn!(
            %node,
            bucket,
            price,
            median,
            penalty,
            remaining,
            slasher = %ctx.caller,
            reward,
            "oracle: node slashed"
        );
        Ok(events)
    }

    // ---------------------------------------------------------------------
    // Rewards
    // ---------------------------------------------------------------------

    /// Mint the caller's reward for every unclaimed report.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NoRewardsAvailable`] if nothing is unclaimed
    pub fn claim_reward(
        &mut self,
        ctx: &CallContext,
        bank: &mut impl TokenBank,
    ) -> Result<Vec<OracleEvent>> {
        let node = self
            .registry
            .get(&ctx.caller)
            .ok_or(OracleError::NoRewardsAvailable)?;
        let amount = accountant::pending_reward(node, self.params.reward_per_report)?;
        let report_count = node.report_count;
        bank.mint(&ctx.caller, amount)?;

        if let Some(node) = self.registry.get_mut(&ctx.caller) {
            node.claimed_report_count = report_count;
        }
        debug!(node = %ctx.caller, amount, report_count, "oracle: reward claimed");
        Ok(vec![OracleEvent::RewardClaimed {
            node: ctx.caller,
            amount,
        }])
    }

    fn require_past(&self, bucket: BucketNumber, height: BlockHeight) -> Result<()> {
        let current = self.current_bucket_number(height);
        if bucket >= current {
            return Err(OracleError::OnlyPastBucketsAllowed { bucket, current });
        }
        Ok(())
    }
}
