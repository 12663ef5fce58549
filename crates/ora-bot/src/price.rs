//! Base price sources.
//!
//! The coordinator anchors reports on the previous bucket's median. A
//! [`PriceSource`] is consulted only when the oracle has no finalized
//! median yet.

use ora_types::Price;

use crate::{BotError, Result};

/// Supplies a cold-start price.
pub trait PriceSource: Send + Sync {
    /// Current reference price.
    ///
    /// # Errors
    ///
    /// - [`BotError::NoBasePrice`] if the source has nothing to offer
    fn fetch(&self) -> Result<Price>;
}

/// A constant price, typically from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedPrice(pub Price);

impl PriceSource for FixedPrice {
    fn fetch(&self) -> Result<Price> {
        if self.0 == 0 {
            return Err(BotError::NoBasePrice);
        }
        Ok(self.0)
    }
}
