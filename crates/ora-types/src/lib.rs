//! # ora-types
//!
//! Shared domain types used across the ORA oracle workspace: participant
//! addresses, transaction hashes, ledger positions, node records and the
//! events emitted by the staking oracle.

pub mod address;
pub mod events;
pub mod node;

pub use address::{Address, AddressParseError};
pub use events::{LogPosition, LoggedEvent, OracleEvent};
pub use node::NodeInfo;

/// Token amount in base units (1 ORA = 10^18 base units).
pub type Amount = u128;

/// Reported price in the feed's smallest unit.
pub type Price = u128;

/// External monotonic counter the bucket clock is derived from.
pub type BlockHeight = u64;

/// Bucket index (reporting round). Bucket 0 is never a real round.
pub type BucketNumber = u64;

/// 32-byte transaction identifier.
pub type TxHash = [u8; 32];

/// Base units per ORA token.
pub const ORA: Amount = 1_000_000_000_000_000_000;

/// Basis points in one whole (100%).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Convert a whole-token amount into base units.
pub const fn ora(whole: u128) -> Amount {
    whole * ORA
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ora_units() {
        assert_eq!(ora(1), ORA);
        assert_eq!(ora(100), 100 * 1_000_000_000_000_000_000);
        assert_eq!(ora(0), 0);
    }
}
