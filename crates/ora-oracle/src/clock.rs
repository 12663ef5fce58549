//! Bucket clock.
//!
//! Maps block height to a bucket index:
//!
//! ```text
//! bucket(height) = floor(height / window) + 1
//! ```
//!
//! Pure and monotonic non-decreasing in height. Bucket 0 never occurs, which
//! lets 0 mean "never" in node records.

use ora_types::{BlockHeight, BucketNumber};

/// Stateless height-to-bucket mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketClock {
    window: u64,
}

impl BucketClock {
    /// Create a clock with the given window. A zero window is treated as 1.
    pub fn new(window: u64) -> Self {
        Self {
            window: window.max(1),
        }
    }

    /// Block heights per bucket.
    pub fn window(&self) -> u64 {
        self.window
    }

    /// Bucket containing `height`.
    pub fn bucket_at(&self, height: BlockHeight) -> BucketNumber {
        height / self.window + 1
    }

    /// First height belonging to `bucket`.
    pub fn bucket_start(&self, bucket: BucketNumber) -> BlockHeight {
        bucket.saturating_sub(1).saturating_mul(self.window)
    }

    /// Heights remaining until the next bucket begins.
    pub fn blocks_until_next_bucket(&self, height: BlockHeight) -> u64 {
        self.window - (height % self.window)
    }

    /// Whether `bucket` is strictly in the past at `height`.
    pub fn is_past(&self, bucket: BucketNumber, height: BlockHeight) -> bool {
        bucket < self.bucket_at(height)
    }
}
