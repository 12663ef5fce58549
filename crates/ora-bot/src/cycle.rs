//! The coordinator's reporting cycle.
//!
//! One cycle, in order:
//!
//! 1. refresh the base price from the previous bucket's median
//! 2. fan out one price report per eligible managed node, then join the
//!    acknowledgements
//! 3. finalize the previous bucket once `ceil(2N / 3)` of the `N`
//!    registered nodes reported in it
//! 4. slash the previous bucket's outliers, if enabled
//! 5. after a settle delay, claim rewards for every node with unclaimed
//!    reports
//!
//! Each step tolerates failure of the others. Errors are logged and the
//! cycle moves on.

use ora_chain::{Call, ChainError, ChainHandle, Transaction};
use ora_oracle::OracleError;
use ora_types::{Address, BucketNumber, Price};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::accounts::Accounts;
use crate::config::BotConfig;
use crate::price::PriceSource;
use crate::{ack, audit, policy};

/// State carried from one cycle to the next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleState {
    /// Price the last cycle anchored its reports on.
    pub base_price: Option<Price>,
}

/// What a cycle accomplished.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub bucket: BucketNumber,
    pub base_price: Option<Price>,
    /// Reports acknowledged as accepted.
    pub reported: usize,
    /// Nodes that sat this bucket out.
    pub skipped: usize,
    /// Reports rejected or never acknowledged.
    pub failed: usize,
    /// Bucket finalized by this cycle.
    pub finalized: Option<BucketNumber>,
    pub slashed: Vec<Address>,
    /// Successful reward claims.
    pub claimed: usize,
}

/// Drives the managed nodes against a ledger.
pub struct Coordinator {
    chain: ChainHandle,
    accounts: Accounts,
    config: BotConfig,
    price_source: Box<dyn PriceSource>,
    rng: StdRng,
}

impl Coordinator {
    /// Create a coordinator. A configured `seed` makes reports reproducible.
    pub fn new(
        chain: ChainHandle,
        accounts: Accounts,
        config: BotConfig,
        price_source: Box<dyn PriceSource>,
    ) -> Self {
        let rng = match config.bot.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            chain,
            accounts,
            config,
            price_source,
            rng,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Swap in a freshly loaded configuration for the next cycle.
    pub fn set_config(&mut self, config: BotConfig) {
        self.config = config;
    }

    /// Managed identities.
    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    /// Run one cycle.
    pub async fn run_cycle(&mut self, state: CycleState) -> (CycleState, CycleSummary) {
        let current = self.chain.read(|c| c.current_bucket_number()).await;
        let previous = current.saturating_sub(1);
        let mut summary = CycleSummary {
            bucket: current,
            ..CycleSummary::default()
        };

        let base = self.resolve_base_price(state, previous).await;
        summary.base_price = base;
        match base {
            Some(base) => self.report_prices(current, base, &mut summary).await,
            None => warn!(bucket = current, "bot: no base price, skipping reports"),
        }

        if previous > 0 {
            if self.finalize(previous).await {
                summary.finalized = Some(previous);
            }
            if self.config.bot.auto_slash {
                summary.slashed = self.slash_outliers(previous).await;
            }
        }

        let delay = self.config.bot.claim_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        summary.claimed = self.claim_rewards().await;

        info!(
            bucket = current,
            base = ?base,
            reported = summary.reported,
            skipped = summary.skipped,
            failed = summary.failed,
            finalized = ?summary.finalized,
            slashed = summary.slashed.len(),
            claimed = summary.claimed,
            "bot: cycle complete"
        );
        (
            CycleState {
                base_price: base.or(state.base_price),
            },
            summary,
        )
    }

    /// Previous bucket's median, else the carried price, else the most
    /// recent finalized median, else the cold-start source.
    async fn resolve_base_price(&self, state: CycleState, previous: BucketNumber) -> Option<Price> {
        if previous > 0 {
            if let Ok(median) = self.chain.read(|c| c.get_past_price(previous)).await {
                return Some(median);
            }
        }
        if state.base_price.is_some() {
            return state.base_price;
        }
        let recent = self
            .chain
            .read(|c| (1..previous).rev().find_map(|b| c.get_past_price(b).ok()))
            .await;
        if recent.is_some() {
            return recent;
        }
        match self.price_source.fetch() {
            Ok(price) => Some(price),
            Err(e) => {
                warn!(error = %e, "bot: price source unavailable");
                None
            }
        }
    }

    async fn report_prices(&mut self, current: BucketNumber, base: Price, summary: &mut CycleSummary) {
        let infos = self
            .chain
            .read(|c| {
                self.accounts
                    .nodes
                    .iter()
                    .map(|n| (*n, c.get_node_info(n)))
                    .collect::<Vec<_>>()
            })
            .await;

        let mut pending = Vec::new();
        for (node, info) in infos {
            if !info.active || info.last_reported_bucket == current {
                continue;
            }
            let behavior = self.config.behavior_for(&node);
            if policy::should_skip(&mut self.rng, behavior.probability_of_skipping_report) {
                debug!(%node, bucket = current, "bot: skipping report");
                summary.skipped += 1;
                continue;
            }
            let price = policy::perturb_price(&mut self.rng, base, behavior.price_variance);
            let tx = Transaction::new(node, Call::ReportPrice { price });
            match self.chain.submit(tx).await {
                Ok(hash) => pending.push((node, hash)),
                Err(e) => {
                    warn!(%node, error = %e, "bot: report not queued");
                    summary.failed += 1;
                }
            }
        }

        let timeout = self.config.bot.receipt_timeout();
        for (node, result) in ack::join_receipts(&self.chain, pending, timeout).await {
            match result {
                Ok(receipt) if receipt.success() => summary.reported += 1,
                Ok(receipt) => {
                    debug!(%node, error = ?receipt.error, "bot: report rejected");
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(%node, error = %e, "bot: report not acknowledged");
                    summary.failed += 1;
                }
            }
        }
    }

    /// Finalize `bucket` if it has quorum and no median yet.
    async fn finalize(&self, bucket: BucketNumber) -> bool {
        let (recorded, active, reported) = self
            .chain
            .read(|c| {
                let nodes = c.get_node_addresses();
                let reported = nodes
                    .iter()
                    .filter(|n| c.get_slashed_status(n, bucket).0 > 0)
                    .count();
                (c.get_past_price(bucket).is_ok(), nodes.len(), reported)
            })
            .await;
        if recorded {
            return false;
        }
        if !policy::has_quorum(reported, active) {
            debug!(
                bucket,
                reported,
                required = policy::required_reports(active),
                active,
                "bot: no quorum yet"
            );
            return false;
        }

        let tx = Transaction::new(self.accounts.operator, Call::RecordBucketMedian { bucket });
        match self
            .chain
            .submit_and_wait(tx, self.config.bot.receipt_timeout())
            .await
        {
            Ok(receipt) if receipt.success() => {
                info!(bucket, reported, active, "bot: bucket finalized");
                true
            }
            Ok(receipt) => {
                match receipt.error {
                    Some(ChainError::Oracle(OracleError::MedianAlreadyRecorded(_))) => {
                        debug!(bucket, "bot: bucket finalized by someone else");
                    }
                    other => warn!(bucket, error = ?other, "bot: finalize rejected"),
                }
                false
            }
            Err(e) => {
                warn!(bucket, error = %e, "bot: finalize not acknowledged");
                false
            }
        }
    }

    /// Slash every outlier of `bucket`, one at a time.
    ///
    /// Registry indices are read right before each slash because a slash that
    /// drains a node removes it and reorders the address list.
    async fn slash_outliers(&self, bucket: BucketNumber) -> Vec<Address> {
        let outliers = match self.chain.read(|c| c.get_outlier_nodes(bucket)).await {
            Ok(o) => o,
            Err(e) => {
                debug!(bucket, error = %e, "bot: outliers unavailable");
                return Vec::new();
            }
        };
        if outliers.is_empty() {
            return Vec::new();
        }
        let reports = self.chain.read(|c| c.price_reports(bucket)).await;
        let timeout = self.config.bot.receipt_timeout();

        let mut slashed = Vec::new();
        for node in outliers {
            let Some(report_index) = audit::report_index(&reports, bucket, &node) else {
                warn!(%node, bucket, "bot: outlier report not found in log");
                continue;
            };
            let (already, registry_index) = self
                .chain
                .read(|c| {
                    (
                        c.get_slashed_status(&node, bucket).1,
                        c.get_node_addresses().iter().position(|a| *a == node),
                    )
                })
                .await;
            if already {
                continue;
            }
            let Some(registry_index) = registry_index else {
                debug!(%node, "bot: outlier no longer registered");
                continue;
            };

            let tx = Transaction::new(
                self.accounts.operator,
                Call::SlashNode {
                    node,
                    bucket,
                    report_index,
                    registry_index: registry_index as u64,
                },
            );
            match self.chain.submit_and_wait(tx, timeout).await {
                Ok(receipt) if receipt.success() => {
                    info!(%node, bucket, report_index, registry_index, "bot: node slashed");
                    slashed.push(node);
                }
                Ok(receipt) => warn!(%node, bucket, error = ?receipt.error, "bot: slash rejected"),
                Err(e) => warn!(%node, bucket, error = %e, "bot: slash not acknowledged"),
            }
        }
        slashed
    }

    async fn claim_rewards(&self) -> usize {
        let claimable: Vec<Address> = self
            .chain
            .read(|c| {
                self.accounts
                    .nodes
                    .iter()
                    .filter(|n| c.get_node_info(n).unclaimed_reports() > 0)
                    .copied()
                    .collect()
            })
            .await;

        let mut pending = Vec::new();
        for node in claimable {
            match self.chain.submit(Transaction::new(node, Call::ClaimReward)).await {
                Ok(hash) => pending.push((node, hash)),
                Err(e) => warn!(%node, error = %e, "bot: claim not queued"),
            }
        }
        let results = ack::join_receipts(&self.chain, pending, self.config.bot.receipt_timeout()).await;
        for (node, result) in &results {
            match result {
                Ok(r) if r.success() => {}
                Ok(r) => debug!(%node, error = ?r.error, "bot: claim rejected"),
                Err(e) => warn!(%node, error = %e, "bot: claim not acknowledged"),
            }
        }
        ack::successes(&results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeBehavior;
    use crate::price::FixedPrice;
    use crate::setup;
    use ora_chain::LocalChain;
    use ora_oracle::OracleParams;
    use ora_types::ora;
    use std::time::Duration;

    const WINDOW: u64 = 100;

    fn config(auto_slash: bool) -> BotConfig {
        let mut config = BotConfig::default();
        config.bot.claim_delay_ms = 0;
        config.bot.receipt_timeout_ms = 1_000;
        config.bot.auto_slash = auto_slash;
        config.bot.initial_price = 4_000;
        config.bot.seed = Some(11);
        config
    }

    /// Automining chain with `n` staked managed nodes, sitting in bucket 2.
    async fn staked(n: usize) -> (ChainHandle, Accounts) {
        let params = OracleParams {
            bucket_window: WINDOW,
            ..OracleParams::default()
        };
        let chain = ChainHandle::new(LocalChain::new(params).expect("chain").with_automine(true));
        let accounts = Accounts::dev(n);
        chain
            .write(|c| {
                c.mine_to_next_bucket();
                c.faucet(&accounts.operator, ora(100_000))
            })
            .await
            .expect("faucet");
        let summary =
            setup::ensure_nodes(&chain, &accounts, ora(500), Duration::from_secs(1)).await;
        assert_eq!(summary.failed, 0);
        (chain, accounts)
    }

    fn coordinator(chain: &ChainHandle, accounts: &Accounts, config: BotConfig) -> Coordinator {
        Coordinator::new(
            chain.clone(),
            accounts.clone(),
            config,
            Box::new(FixedPrice(4_000)),
        )
    }

    #[tokio::test]
    async fn test_cold_start_reports_initial_price() {
        let (chain, accounts) = staked(4).await;
        let mut bot = coordinator(&chain, &accounts, config(false));

        let (state, summary) = bot.run_cycle(CycleState::default()).await;
        assert_eq!(summary.bucket, 2);
        assert_eq!(summary.base_price, Some(4_000));
        assert_eq!(summary.reported, 4);
        assert_eq!(summary.finalized, None);
        assert_eq!(summary.claimed, 4);
        assert_eq!(state.base_price, Some(4_000));

        for node in &accounts.nodes {
            let (price, _) = chain.read(|c| c.get_slashed_status(node, 2)).await;
            assert_eq!(price, 4_000);
        }
    }

    #[tokio::test]
    async fn test_second_cycle_in_same_bucket_does_not_rereport() {
        let (chain, accounts) = staked(3).await;
        let mut bot = coordinator(&chain, &accounts, config(false));
        let (state, _) = bot.run_cycle(CycleState::default()).await;
        let (_, summary) = bot.run_cycle(state).await;
        assert_eq!(summary.reported, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.claimed, 0);
    }

    #[tokio::test]
    async fn test_finalizes_previous_bucket_with_quorum() {
        let (chain, accounts) = staked(3).await;
        let mut bot = coordinator(&chain, &accounts, config(false));
        let (state, _) = bot.run_cycle(CycleState::default()).await;

        chain.write(|c| c.mine_to_next_bucket()).await;
        let (_, summary) = bot.run_cycle(state).await;
        assert_eq!(summary.bucket, 3);
        assert_eq!(summary.finalized, Some(2));
        assert_eq!(chain.read(|c| c.get_past_price(2)).await, Ok(4_000));
    }

    #[tokio::test]
    async fn test_no_finalize_without_quorum() {
        let (chain, accounts) = staked(6).await;
        let mut cfg = config(false);
        // only the first three nodes report: 3 < ceil(12 / 3) = 4
        for node in &accounts.nodes[3..] {
            cfg.nodes.insert(
                node.to_string(),
                NodeBehavior {
                    probability_of_skipping_report: 1.0,
                    price_variance: 0.0,
                },
            );
        }
        let mut bot = coordinator(&chain, &accounts, cfg);
        let (state, first) = bot.run_cycle(CycleState::default()).await;
        assert_eq!(first.reported, 3);
        assert_eq!(first.skipped, 3);

        chain.write(|c| c.mine_to_next_bucket()).await;
        let (_, summary) = bot.run_cycle(state).await;
        assert_eq!(summary.finalized, None);
        assert!(chain.read(|c| c.get_past_price(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_auto_slash_punishes_outlier() {
        let (chain, accounts) = staked(4).await;
        let liar = accounts.nodes[2];
        coordinator(&chain, &accounts, config(true))
            .run_cycle(CycleState::default())
            .await;

        // the liar reports first in bucket 3, far from everyone else
        chain.write(|c| c.mine_to_next_bucket()).await;
        chain
            .submit_and_wait(
                Transaction::new(liar, Call::ReportPrice { price: 8_000 }),
                Duration::from_secs(1),
            )
            .await
            .expect("liar report");

        let mut bot = coordinator(&chain, &accounts, config(true));
        let (state, summary) = bot.run_cycle(CycleState::default()).await;
        assert_eq!(summary.bucket, 3);
        assert_eq!(summary.reported, 3);

        chain.write(|c| c.mine_to_next_bucket()).await;
        let (_, summary) = bot.run_cycle(state).await;
        assert_eq!(summary.finalized, Some(3));
        assert_eq!(summary.slashed, vec![liar]);
        let (_, slashed) = chain.read(|c| c.get_slashed_status(&liar, 3)).await;
        assert!(slashed);
        let info = chain.read(|c| c.get_node_info(&liar)).await;
        assert_eq!(info.staked_amount, ora(400));
    }

    #[tokio::test]
    async fn test_restart_anchors_on_most_recent_median() {
        let (chain, accounts) = staked(3).await;
        let timeout = Duration::from_secs(1);
        for node in &accounts.nodes {
            chain
                .submit_and_wait(Transaction::new(*node, Call::ReportPrice { price: 5_000 }), timeout)
                .await
                .expect("report");
        }
        chain.write(|c| c.mine_to_next_bucket()).await;
        chain
            .submit_and_wait(
                Transaction::new(accounts.operator, Call::RecordBucketMedian { bucket: 2 }),
                timeout,
            )
            .await
            .expect("finalize");
        // bucket 3 passes without reports
        chain.write(|c| c.mine_to_next_bucket()).await;

        let mut bot = coordinator(&chain, &accounts, config(false));
        let (state, summary) = bot.run_cycle(CycleState::default()).await;
        assert_eq!(summary.bucket, 4);
        assert_eq!(summary.base_price, Some(5_000));
        assert_eq!(state.base_price, Some(5_000));
    }

    #[tokio::test]
    async fn test_unregistered_nodes_are_left_alone() {
        let params = OracleParams {
            bucket_window: WINDOW,
            ..OracleParams::default()
        };
        let chain = ChainHandle::new(LocalChain::new(params).expect("chain").with_automine(true));
        let accounts = Accounts::dev(2);
        let mut bot = coordinator(&chain, &accounts, config(true));
        let (_, summary) = bot.run_cycle(CycleState::default()).await;
        assert_eq!(summary.reported, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.claimed, 0);
    }
}
