//! Idempotent node setup.
//!
//! Snapshots every managed node, plans the missing funding and staking, then
//! executes it in two bursts: all funding transfers from the operator with
//! consecutive nonces, then each node's register or top-up with its own
//! nonce. Running it again against a fully staked set is a no-op.

use std::time::Duration;

use ora_chain::{Call, ChainHandle, Transaction};
use ora_types::{Address, Amount, NodeInfo};
use tracing::{info, warn};

use crate::accounts::Accounts;
use crate::ack;

/// What the ledger says about one node before setup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub node: Address,
    pub info: NodeInfo,
    pub effective_stake: Amount,
    pub balance: Amount,
}

/// Staking call a node must make.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StakeAction {
    Register(Amount),
    AddStake(Amount),
}

impl StakeAction {
    /// Tokens the call moves into escrow.
    pub fn amount(&self) -> Amount {
        match self {
            Self::Register(a) | Self::AddStake(a) => *a,
        }
    }

    fn call(&self) -> Call {
        match *self {
            Self::Register(stake) => Call::RegisterNode { stake },
            Self::AddStake(amount) => Call::AddStake { amount },
        }
    }
}

/// Setup steps for one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodePlan {
    pub node: Address,
    /// ORA the operator must send first.
    pub transfer: Option<Amount>,
    pub action: Option<StakeAction>,
}

/// Outcome of a setup run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetupSummary {
    pub transfers: usize,
    pub registered: usize,
    pub topped_up: usize,
    pub failed: usize,
}

/// Plan funding and staking.
///
/// An active node whose effective stake fell below `minimum_stake` is topped
/// up by the shortfall. An inactive node registers with
/// `max(minimum_stake, default_stake)`. Either way the operator covers
/// whatever the node's own balance does not.
pub fn plan(
    snapshots: &[NodeSnapshot],
    minimum_stake: Amount,
    default_stake: Amount,
) -> Vec<NodePlan> {
    snapshots
        .iter()
        .filter_map(|s| {
            let action = if s.info.active {
                if s.effective_stake >= minimum_stake {
                    return None;
                }
                StakeAction::AddStake(minimum_stake - s.effective_stake)
            } else {
                StakeAction::Register(minimum_stake.max(default_stake))
            };
            let needed = action.amount();
            let transfer = (s.balance < needed).then(|| needed - s.balance);
            Some(NodePlan {
                node: s.node,
                transfer,
                action: Some(action),
            })
        })
        .collect()
}

/// Read the current state of every managed node.
pub async fn snapshot(chain: &ChainHandle, nodes: &[Address]) -> Vec<NodeSnapshot> {
    chain
        .read(|c| {
            nodes
                .iter()
                .map(|node| NodeSnapshot {
                    node: *node,
                    info: c.get_node_info(node),
                    effective_stake: c.get_effective_stake(node),
                    balance: c.balance_of(node),
                })
                .collect()
        })
        .await
}

/// Bring every managed node to at least the minimum effective stake.
///
/// Best effort: a transaction that cannot be queued, reverts, or is not
/// acknowledged in time is logged and counted in [`SetupSummary::failed`].
pub async fn ensure_nodes(
    chain: &ChainHandle,
    accounts: &Accounts,
    default_stake: Amount,
    timeout: Duration,
) -> SetupSummary {
    let minimum = chain.read(|c| c.oracle().params().minimum_stake).await;
    let snapshots = snapshot(chain, &accounts.nodes).await;
    let plans = plan(&snapshots, minimum, default_stake);
    let mut summary = SetupSummary::default();
    if plans.is_empty() {
        info!(nodes = accounts.nodes.len(), "bot: all nodes staked");
        return summary;
    }

    // funding burst from the operator
    let mut nonce = chain.read(|c| c.pending_nonce(&accounts.operator)).await;
    let mut pending = Vec::new();
    for p in &plans {
        let Some(amount) = p.transfer else { continue };
        let tx = Transaction::with_nonce(
            accounts.operator,
            nonce,
            Call::Transfer { to: p.node, amount },
        );
        match chain.submit(tx).await {
            Ok(hash) => {
                pending.push((p.node, hash));
                nonce += 1;
            }
            Err(e) => {
                warn!(node = %p.node, error = %e, "bot: funding transfer not queued");
                summary.failed += 1;
                // the ledger moved under us; resync before the next transfer
                nonce = chain.read(|c| c.pending_nonce(&accounts.operator)).await;
            }
        }
    }
    summary.transfers = pending.len();
    for (node, result) in ack::join_receipts(chain, pending, timeout).await {
        match result {
            Ok(receipt) if receipt.success() => {}
            Ok(receipt) => {
                warn!(%node, error = ?receipt.error, "bot: funding transfer reverted");
                summary.failed += 1;
            }
            Err(e) => {
                warn!(%node, error = %e, "bot: funding transfer not acknowledged");
                summary.failed += 1;
            }
        }
    }

    // staking burst, one transaction per node
    let mut pending = Vec::new();
    for p in &plans {
        let Some(action) = p.action else { continue };
        let nonce = chain.read(|c| c.pending_nonce(&p.node)).await;
        let tx = Transaction::with_nonce(p.node, nonce, action.call());
        match chain.submit(tx).await {
            Ok(hash) => pending.push((p.node, hash)),
            Err(e) => {
                warn!(node = %p.node, call = action.call().name(), error = %e, "bot: staking call not queued");
                summary.failed += 1;
                continue;
            }
        }
        match action {
            StakeAction::Register(_) => summary.registered += 1,
            StakeAction::AddStake(_) => summary.topped_up += 1,
        }
    }
    for (node, result) in ack::join_receipts(chain, pending, timeout).await {
        match result {
            Ok(receipt) if receipt.success() => {}
            Ok(receipt) => {
                warn!(%node, call = receipt.call.name(), error = ?receipt.error, "bot: staking call reverted");
                summary.failed += 1;
            }
            Err(e) => {
                warn!(%node, error = %e, "bot: staking call not acknowledged");
                summary.failed += 1;
            }
        }
    }

    info!(
        transfers = summary.transfers,
        registered = summary.registered,
        topped_up = summary.topped_up,
        failed = summary.failed,
        "bot: node setup complete"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use ora_chain::LocalChain;
    use ora_oracle::OracleParams;
    use ora_types::ora;

    fn snap(node: &str, info: NodeInfo, effective: Amount, balance: Amount) -> NodeSnapshot {
        NodeSnapshot {
            node: Address::derive(node),
            info,
            effective_stake: effective,
            balance,
        }
    }

    fn active(stake: Amount) -> NodeInfo {
        NodeInfo {
            staked_amount: stake,
            first_bucket: 2,
            active: true,
            ..NodeInfo::default()
        }
    }

    #[test]
    fn test_plan_registers_inactive_nodes() {
        let plans = plan(
            &[snap("a", NodeInfo::default(), 0, 0)],
            ora(100),
            ora(500),
        );
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].action, Some(StakeAction::Register(ora(500))));
        assert_eq!(plans[0].transfer, Some(ora(500)));
    }

    #[test]
    fn test_plan_register_uses_minimum_when_default_lower() {
        let plans = plan(&[snap("a", NodeInfo::default(), 0, ora(1_000))], ora(100), ora(50));
        assert_eq!(plans[0].action, Some(StakeAction::Register(ora(100))));
        assert_eq!(plans[0].transfer, None);
    }

    #[test]
    fn test_plan_tops_up_shortfall() {
        let plans = plan(&[snap("a", active(ora(100)), ora(97), ora(1))], ora(100), ora(500));
        assert_eq!(plans[0].action, Some(StakeAction::AddStake(ora(3))));
        assert_eq!(plans[0].transfer, Some(ora(2)));
    }

    #[test]
    fn test_plan_skips_healthy_nodes() {
        let plans = plan(&[snap("a", active(ora(500)), ora(480), 0)], ora(100), ora(500));
        assert!(plans.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_nodes_is_idempotent() {
        let chain = ChainHandle::new(
            LocalChain::new(OracleParams::default())
                .expect("chain")
                .with_automine(true),
        );
        let accounts = Accounts::dev(3);
        chain
            .write(|c| c.faucet(&accounts.operator, ora(10_000)))
            .await
            .expect("faucet");

        let timeout = Duration::from_secs(1);
        let first = ensure_nodes(&chain, &accounts, ora(500), timeout).await;
        assert_eq!(first.transfers, 3);
        assert_eq!(first.registered, 3);
        assert_eq!(first.failed, 0);

        let addresses = chain.read(|c| c.get_node_addresses()).await;
        assert_eq!(addresses, accounts.nodes);
        for node in &accounts.nodes {
            let info = chain.read(|c| c.get_node_info(node)).await;
            assert_eq!(info.staked_amount, ora(500));
        }

        let second = ensure_nodes(&chain, &accounts, ora(500), timeout).await;
        assert_eq!(second, SetupSummary::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_nodes_survives_stuck_operator_nonce() {
        let chain = ChainHandle::new(
            LocalChain::new(OracleParams::default())
                .expect("chain")
                .with_automine(true),
        )
        .with_poll_interval(Duration::from_millis(10));
        let accounts = Accounts::dev(2);
        chain
            .write(|c| c.faucet(&accounts.operator, ora(10_000)))
            .await
            .expect("faucet");

        // a transfer queued ahead of the operator's nonce leaves a gap that never fills
        let stray = Transaction::with_nonce(
            accounts.operator,
            5,
            Call::Transfer {
                to: Address::derive("elsewhere"),
                amount: ora(1),
            },
        );
        chain.submit(stray).await.expect("queue stray transfer");

        let summary = ensure_nodes(&chain, &accounts, ora(500), Duration::from_secs(1)).await;
        assert_eq!(summary.transfers, 2);
        assert_eq!(summary.registered, 2);
        // two unacknowledged transfers, then two registrations without funds
        assert_eq!(summary.failed, 4);

        for node in &accounts.nodes {
            let info = chain.read(|c| c.get_node_info(node)).await;
            assert!(!info.active);
        }
    }
}
