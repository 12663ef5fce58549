//! Token bank seam.
//!
//! The oracle never owns balances. It moves stake in and out of escrow,
//! seizes slashed stake and mints report rewards through a [`TokenBank`],
//! which the ledger supplies. Every method either applies fully or returns an
//! error without side effects.

use std::collections::HashMap;

use ora_types::{Address, Amount};
use serde::{Deserialize, Serialize};

use crate::{OracleError, Result};

/// Token operations the oracle depends on.
pub trait TokenBank {
    /// Spendable balance of `who`.
    fn balance_of(&self, who: &Address) -> Amount;

    /// Move `amount` from `from` into the oracle's escrow.
    fn deposit(&mut self, from: &Address, amount: Amount) -> Result<()>;

    /// Move `amount` out of escrow to `to`.
    fn withdraw(&mut self, to: &Address, amount: Amount) -> Result<()>;

    /// Mint fresh tokens to `to`.
    fn mint(&mut self, to: &Address, amount: Amount) -> Result<()>;

    /// Seize `amount` from escrow: `share` of it goes to `to`, the rest is
    /// burned.
    fn forfeit(&mut self, amount: Amount, to: &Address, share: Amount) -> Result<()>;
}

/// In-memory ORA balances with a single escrow account.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Balances {
    accounts: HashMap<Address, Amount>,
    escrow: Amount,
    total_supply: Amount,
}

impl Balances {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens currently held in escrow.
    pub fn escrow(&self) -> Amount {
        self.escrow
    }

    /// Tokens in circulation, escrow included.
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Move tokens between two accounts.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InsufficientBalance`] if `from` holds less than `amount`
    /// - [`OracleError::Overflow`] if the recipient balance would overflow
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        if from == to {
            return self.require(from, amount);
        }
        self.require(from, amount)?;
        let to_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(OracleError::Overflow)?;
        *self.accounts.entry(*from).or_default() -= amount;
        self.accounts.insert(*to, to_balance);
        Ok(())
    }

    fn require(&self, who: &Address, amount: Amount) -> Result<()> {
        let available = self.balance_of(who);
        if available < amount {
            return Err(OracleError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        Ok(())
    }
}

impl TokenBank for Balances {
    fn balance_of(&self, who: &Address) -> Amount {
        self.accounts.get(who).copied().unwrap_or(0)
    }

    fn deposit(&mut self, from: &Address, amount: Amount) -> Result<()> {
        self.require(from, amount)?;
        let escrow = self.escrow.checked_add(amount).ok_or(OracleError::Overflow)?;
        *self.accounts.entry(*from).or_default() -= amount;
        self.escrow = escrow;
        Ok(())
    }

    fn withdraw(&mut self, to: &Address, amount: Amount) -> Result<()> {
        if self.escrow < amount {
            return Err(OracleError::InsufficientBalance {
                needed: amount,
                available: self.escrow,
            });
        }
        let to_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(OracleError::Overflow)?;
        self.escrow -= amount;
        self.accounts.insert(*to, to_balance);
        Ok(())
    }

    fn mint(&mut self, to: &Address, amount: Amount) -> Result<()> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(OracleError::Overflow)?;
        let to_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(OracleError::Overflow)?;
        self.total_supply = supply;
        self.accounts.insert(*to, to_balance);
        Ok(())
    }

    fn forfeit(&mut self, amount: Amount, to: &Address, share: Amount) -> Result<()> {
        if share > amount {
            return Err(OracleError::Overflow);
        }
        if self.escrow < amount {
            return Err(OracleError::InsufficientBalance {
                needed: amount,
                available: self.escrow,
            });
        }
        let to_balance = self
            .balance_of(to)
            .checked_add(share)
            .ok_or(OracleError::Overflow)?;
        let burned = amount - share;
        self.escrow -= amount;
        self.total_supply -= burned;
        self.accounts.insert(*to, to_balance);
        Ok(())
    }
}
