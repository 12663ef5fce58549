//! Report index reconstruction.
//!
//! Slashing needs a report's position inside its bucket. The position is
//! derived from the event log ordered by [`LogPosition`](ora_types::LogPosition),
//! never from arrival order.

use ora_types::{Address, BucketNumber, LoggedEvent, OracleEvent};

/// Zero-based index of `node`'s report within `bucket`, if it reported.
pub fn report_index(events: &[LoggedEvent], bucket: BucketNumber, node: &Address) -> Option<u64> {
    let mut reports: Vec<&LoggedEvent> = events
        .iter()
        .filter(|e| matches!(e.event, OracleEvent::PriceReported { bucket: b, .. } if b == bucket))
        .collect();
    reports.sort_by_key(|e| e.position);
    reports
        .iter()
        .position(|e| matches!(&e.event, OracleEvent::PriceReported { node: n, .. } if n == node))
        .map(|i| i as u64)
}
