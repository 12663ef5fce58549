//! Deviation checks.
//!
//! A report is an outlier when
//!
//! ```text
//! |price - median| * 10000 > median * max_deviation_bps
//! ```
//!
//! The comparison is strict: a report exactly at the threshold stands.
//! Since `diff` is an integer, the test is evaluated as
//! `diff > floor(median * max_deviation_bps / 10000)`, which never overflows.

use ora_types::{Address, Price, BPS_DENOMINATOR};

use crate::reports::Bucket;

/// Whether `price` deviates from `median` by more than `max_deviation_bps`.
pub fn is_deviated(price: Price, median: Price, max_deviation_bps: u128) -> bool {
    let diff = price.abs_diff(median);
    diff > allowed_deviation(median, max_deviation_bps)
}

/// `floor(median * bps / 10000)` without the intermediate product.
fn allowed_deviation(median: Price, bps: u128) -> Price {
    let whole = (median / BPS_DENOMINATOR).saturating_mul(bps);
    let part = (median % BPS_DENOMINATOR).saturating_mul(bps) / BPS_DENOMINATOR;
    whole.saturating_add(part)
}

/// Reporters in `bucket` whose price deviates from `median`, in report order.
pub fn outliers(bucket: &Bucket, median: Price, max_deviation_bps: u128) -> Vec<Address> {
    bucket
        .reports()
        .iter()
        .filter(|r| is_deviated(r.price, median, max_deviation_bps))
        .map(|r| r.node)
        .collect()
}
