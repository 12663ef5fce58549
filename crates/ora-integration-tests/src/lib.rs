//! Integration test crate for the ORA staking oracle.
//!
//! This crate has no library code. It only contains integration tests that
//! drive the oracle end to end through the development ledger and the
//! coordinator.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p ora-integration-tests
//! ```
