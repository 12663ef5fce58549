//! Report ledger.
//!
//! One [`Bucket`] per reporting round. Reports are kept in submission order
//! because slashing proofs name a report by its position in the bucket. Each
//! node reports at most once per bucket, and a bucket's median, once
//! recorded, never changes.

use std::collections::{BTreeMap, HashMap, HashSet};

use ora_types::{Address, BucketNumber, Price};

use crate::{OracleError, Result};

/// A single accepted report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Report {
    pub node: Address,
    pub price: Price,
}

/// Reports and finalization state for one bucket.
#[derive(Clone, Debug, Default)]
pub struct Bucket {
    reports: Vec<Report>,
    by_node: HashMap<Address, usize>,
    recorded_median: Price,
    slashed: HashSet<Address>,
}

impl Bucket {
    /// Reports in submission order.
    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    /// Prices in submission order.
    pub fn prices(&self) -> Vec<Price> {
        self.reports.iter().map(|r| r.price).collect()
    }

    /// Number of reports.
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Whether the bucket has no reports.
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Position and price of `node`'s report.
    pub fn report_of(&self, node: &Address) -> Option<(usize, Price)> {
        self.by_node
            .get(node)
            .map(|&i| (i, self.reports[i].price))
    }

    /// Recorded median, if finalized.
    pub fn median(&self) -> Option<Price> {
        (self.recorded_median != 0).then_some(self.recorded_median)
    }

    /// Whether `node` was slashed for this bucket.
    pub fn is_slashed(&self, node: &Address) -> bool {
        self.slashed.contains(node)
    }

    /// Report at `index`, checked against the claimed reporter.
    ///
    /// # Errors
    ///
    /// - [`OracleError::IndexOutOfBounds`] if `index` is past the last report
    /// - [`OracleError::NodeNotAtGivenIndex`] if another node filed that report
    pub fn verified_report(&self, index: u64, node: &Address) -> Result<Price> {
        let report = usize::try_from(index)
            .ok()
            .and_then(|i| self.reports.get(i))
            .ok_or(OracleError::IndexOutOfBounds {
                index,
                len: self.reports.len() as u64,
            })?;
        if report.node != *node {
            return Err(OracleError::NodeNotAtGivenIndex(index));
        }
        Ok(report.price)
    }
}

/// All buckets, keyed by bucket number.
#[derive(Clone, Debug, Default)]
pub struct ReportLedger {
    buckets: BTreeMap<BucketNumber, Bucket>,
}

impl ReportLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket state, if anything happened in it.
    pub fn bucket(&self, bucket: BucketNumber) -> Option<&Bucket> {
        self.buckets.get(&bucket)
    }

    /// Whether `node` has a report in `bucket`.
    pub fn has_reported(&self, node: &Address, bucket: BucketNumber) -> bool {
        self.bucket(bucket)
            .is_some_and(|b| b.by_node.contains_key(node))
    }

    /// Append a report and return its position in the bucket.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidPrice`] if `price` is zero
    /// - [`OracleError::AlreadyReportedInCurrentBucket`] if `node` already reported
    /// - [`OracleError::MedianAlreadyRecorded`] if the bucket is finalized
    pub fn append(&mut self, bucket: BucketNumber, node: Address, price: Price) -> Result<u64> {
        if price == 0 {
            return Err(OracleError::InvalidPrice);
        }
        let entry = self.buckets.entry(bucket).or_default();
        if entry.by_node.contains_key(&node) {
            return Err(OracleError::AlreadyReportedInCurrentBucket(bucket));
        }
        if entry.recorded_median != 0 {
            return Err(OracleError::MedianAlreadyRecorded(bucket));
        }
        let index = entry.reports.len();
        entry.reports.push(Report { node, price });
        entry.by_node.insert(node, index);
        Ok(index as u64)
    }

    /// Store the finalized median for `bucket`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::MedianAlreadyRecorded`] if a median is already stored
    /// - [`OracleError::InvalidPrice`] if `median` is zero
    pub fn record_median(&mut self, bucket: BucketNumber, median: Price) -> Result<()> {
        if median == 0 {
            return Err(OracleError::InvalidPrice);
        }
        let entry = self.buckets.entry(bucket).or_default();
        if entry.recorded_median != 0 {
            return Err(OracleError::MedianAlreadyRecorded(bucket));
        }
        entry.recorded_median = median;
        Ok(())
    }

    /// Flag `node` as slashed for `bucket`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NodeAlreadySlashed`] if the flag was already set
    pub fn mark_slashed(&mut self, bucket: BucketNumber, node: Address) -> Result<()> {
        let entry = self.buckets.entry(bucket).or_default();
        if !entry.slashed.insert(node) {
            return Err(OracleError::NodeAlreadySlashed(bucket));
        }
        Ok(())
    }

    /// `(price, slashed)` for `node` in `bucket`; price 0 if it did not report.
    pub fn slashed_status(&self, node: &Address, bucket: BucketNumber) -> (Price, bool) {
        match self.bucket(bucket) {
            Some(b) => (
                b.report_of(node).map(|(_, p)| p).unwrap_or(0),
                b.is_slashed(node),
            ),
            None => (0, false),
        }
    }
}
