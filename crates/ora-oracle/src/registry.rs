//! Node registry.
//!
//! Tracks every staked participant and keeps an index-addressable list of
//! active addresses. Removal is swap-and-pop: the last address moves into
//! the vacated slot, so any index a caller cached may now point at a
//! different node. Index-taking operations therefore re-check the address at
//! the slot before acting.

use std::collections::HashMap;

use ora_types::{Address, Amount, BucketNumber, NodeInfo};

use crate::{OracleError, Result};

/// Node records plus the ordered list of active addresses.
#[derive(Clone, Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<Address, NodeInfo>,
    addresses: Vec<Address>,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `node`, if it is registered.
    pub fn get(&self, node: &Address) -> Option<&NodeInfo> {
        self.nodes.get(node)
    }

    pub(crate) fn get_mut(&mut self, node: &Address) -> Option<&mut NodeInfo> {
        self.nodes.get_mut(node)
    }

    /// Record for `node`, or the zeroed record if it is not registered.
    pub fn info(&self, node: &Address) -> NodeInfo {
        self.nodes.get(node).cloned().unwrap_or_default()
    }

    /// Active record for `node`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NodeNotRegistered`] if the node is unknown or inactive
    pub fn active(&self, node: &Address) -> Result<&NodeInfo> {
        match self.nodes.get(node) {
            Some(info) if info.active => Ok(info),
            _ => Err(OracleError::NodeNotRegistered),
        }
    }

    /// Active addresses in list order.
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Number of active nodes.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Whether no node is active.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Current list position of `node`.
    pub fn position(&self, node: &Address) -> Option<usize> {
        self.addresses.iter().position(|a| a == node)
    }

    /// Fail unless `index` currently resolves to `expected`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::IndexOutOfBounds`] if `index` is past the end
    /// - [`OracleError::NodeNotAtGivenIndex`] if another node occupies the slot
    pub fn verify_index(&self, index: u64, expected: &Address) -> Result<()> {
        let len = self.addresses.len() as u64;
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| self.addresses.get(i))
            .ok_or(OracleError::IndexOutOfBounds { index, len })?;
        if slot != expected {
            return Err(OracleError::NodeNotAtGivenIndex(index));
        }
        Ok(())
    }

    /// Register `node` with `stake` at `bucket`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NodeAlreadyRegistered`] if the node has a record
    pub fn insert(&mut self, node: Address, stake: Amount, bucket: BucketNumber) -> Result<()> {
        if self.nodes.get(&node).is_some_and(|n| n.first_bucket != 0) {
            return Err(OracleError::NodeAlreadyRegistered);
        }
        self.nodes.insert(
            node,
            NodeInfo {
                staked_amount: stake,
                last_reported_bucket: 0,
                report_count: 0,
                claimed_report_count: 0,
                first_bucket: bucket,
                active: true,
            },
        );
        self.addresses.push(node);
        Ok(())
    }

    /// Remove `node`, which the caller claims sits at `index`.
    ///
    /// The index is verified first. On success the last address takes the
    /// vacated slot and the node's record is dropped, so the address reads
    /// back as unregistered and may register again.
    ///
    /// # Errors
    ///
    /// Same as [`verify_index`](Self::verify_index).
    pub fn remove(&mut self, node: &Address, index: u64) -> Result<NodeInfo> {
        self.verify_index(index, node)?;
        // verify_index proved the index fits in usize and is in range.
        let slot = index as usize;
        self.addresses.swap_remove(slot);
        let record = self.nodes.remove(node).unwrap_or_default();
        tracing::debug!(%node, index, remaining = self.addresses.len(), "registry: node removed");
        Ok(record)
    }
}
