//! Identities the coordinator signs for.

use ora_types::Address;

/// The funding/finalizing identity plus the managed node identities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Accounts {
    /// Funds nodes, finalizes buckets and collects slashing rewards.
    pub operator: Address,
    /// Managed oracle nodes.
    pub nodes: Vec<Address>,
}

impl Accounts {
    /// Deterministic development identities: `operator` and `node-1..=count`.
    pub fn dev(count: usize) -> Self {
        Self {
            operator: Address::derive("operator"),
            nodes: (1..=count)
                .map(|i| Address::derive(&format!("node-{i}")))
                .collect(),
        }
    }
}
