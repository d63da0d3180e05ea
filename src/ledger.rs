//! Elastic balance ledger.
//!
//! Balances are stored in raw units. Holder-facing amounts are
//! `raw * index / SCALE`, so lowering the index shrinks every balance and
//! the total supply at once without touching individual accounts.
//!
//! Rounding always favours the ledger: credits convert with floor, debits
//! with ceil. Allowances are kept in holder-facing units.

use std::collections::HashMap;

use tracing::debug;

use crate::arithmetic::{to_effective, to_raw_ceil, to_raw_floor};
use crate::error::ErrorKind;
use crate::types::{Address, SCALE};

/// Ledger-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Holder balance below the requested amount.
    #[error("insufficient balance for {holder}: need {needed}, have {available}")]
    InsufficientBalance {
        /// Holder.
        holder: Address,
        /// Requested holder-facing amount.
        needed: u128,
        /// Holder-facing balance.
        available: u128,
    },
    /// Spender allowance below the requested amount.
    #[error("insufficient allowance for {spender} on {owner}: need {needed}, have {available}")]
    InsufficientAllowance {
        /// Token owner.
        owner: Address,
        /// Spender.
        spender: Address,
        /// Requested amount.
        needed: u128,
        /// Remaining allowance.
        available: u128,
    },
    /// A raw or supply total would overflow.
    #[error("ledger arithmetic overflow")]
    ArithmeticOverflow,
    /// Index update that is zero or an increase.
    #[error("invalid index {proposed}: must be non-zero and at most {current}")]
    InvalidIndex {
        /// Current index.
        current: u128,
        /// Rejected value.
        proposed: u128,
    },
    /// Empty holder or recipient.
    #[error("ledger address is empty")]
    EmptyAddress,
}

impl LedgerError {
    /// Caller-visible failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::InsufficientAllowance { .. } => ErrorKind::InsufficientAllowance,
            Self::ArithmeticOverflow => ErrorKind::ArithmeticOverflow,
            Self::InvalidIndex { .. } | Self::EmptyAddress => ErrorKind::InvalidInput,
        }
    }
}

/// Balance ledger the supply modules drive.
///
/// All amounts are holder-facing unless the method name says `raw`.
pub trait BalanceLedger {
    /// Credit `amount` to `to`. Returns the raw units credited.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ArithmeticOverflow`] or [`LedgerError::EmptyAddress`].
    fn mint(&mut self, to: &Address, amount: u128) -> Result<u128, LedgerError>;

    /// Destroy `amount` of `from`'s tokens using `spender`'s allowance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientAllowance`] or [`LedgerError::InsufficientBalance`].
    fn burn_from(
        &mut self,
        spender: &Address,
        from: &Address,
        amount: u128,
    ) -> Result<(), LedgerError>;

    /// Move `amount` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientBalance`] or [`LedgerError::EmptyAddress`].
    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), LedgerError>;

    /// Move `amount` from `from` to `to` using `spender`'s allowance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientAllowance`] or any [`BalanceLedger::transfer`] error.
    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), LedgerError>;

    /// Holder-facing balance.
    fn balance_of(&self, holder: &Address) -> u128;

    /// Holder-facing total supply.
    fn total_supply(&self) -> u128;

    /// Sum of raw balances.
    fn raw_total_supply(&self) -> u128;

    /// Current index, `SCALE == 1.0`.
    fn index(&self) -> u128;

    /// Store a new index.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidIndex`] for zero or an increase.
    fn set_index(&mut self, index: u128) -> Result<(), LedgerError>;
}

/// In-process elastic ledger.
#[derive(Debug, Clone)]
pub struct ElasticLedger {
    raw_balances: HashMap<Address, u128>,
    allowances: HashMap<(Address, Address), u128>,
    raw_supply: u128,
    index: u128,
}

impl Default for ElasticLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ElasticLedger {
    /// Empty ledger at index 1.0.
    pub fn new() -> Self {
        Self {
            raw_balances: HashMap::new(),
            allowances: HashMap::new(),
            raw_supply: 0,
            index: SCALE,
        }
    }

    /// Set `spender`'s allowance on `owner`'s tokens.
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: u128) {
        debug!(owner = %owner, spender = %spender, amount, "allowance set");
        self.allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    /// Remaining allowance of `spender` on `owner`'s tokens.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Raw balance of `holder`.
    pub fn raw_balance_of(&self, holder: &Address) -> u128 {
        self.raw_balances.get(holder).copied().unwrap_or(0)
    }

    fn effective(&self, raw: u128) -> u128 {
        // The index never exceeds SCALE, so the effective value never exceeds raw.
        to_effective(raw, self.index).unwrap_or(raw)
    }

    fn checked_allowance(
        &self,
        owner: &Address,
        spender: &Address,
        amount: u128,
    ) -> Result<u128, LedgerError> {
        let available = self.allowance(owner, spender);
        available
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientAllowance {
                owner: owner.clone(),
                spender: spender.clone(),
                needed: amount,
                available,
            })
    }

    fn checked_debit(&self, holder: &Address, amount: u128) -> Result<(u128, u128), LedgerError> {
        let raw = to_raw_ceil(amount, self.index).ok_or(LedgerError::ArithmeticOverflow)?;
        let balance = self.raw_balance_of(holder);
        let remaining = balance
            .checked_sub(raw)
            .ok_or_else(|| LedgerError::InsufficientBalance {
                holder: holder.clone(),
                needed: amount,
                available: self.effective(balance),
            })?;
        Ok((raw, remaining))
    }
}

impl BalanceLedger for ElasticLedger {
    fn mint(&mut self, to: &Address, amount: u128) -> Result<u128, LedgerError> {
        if to.is_empty() {
            return Err(LedgerError::EmptyAddress);
        }
        let raw = to_raw_floor(amount, self.index).ok_or(LedgerError::ArithmeticOverflow)?;
        let balance = self
            .raw_balance_of(to)
            .checked_add(raw)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let supply = self
            .raw_supply
            .checked_add(raw)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        self.raw_balances.insert(to.clone(), balance);
        self.raw_supply = supply;
        debug!(to = %to, amount, raw, "ledger mint");
        Ok(raw)
    }

    fn burn_from(
        &mut self,
        spender: &Address,
        from: &Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let allowance = self.checked_allowance(from, spender, amount)?;
        let (raw, remaining) = self.checked_debit(from, amount)?;
        let supply = self
            .raw_supply
            .checked_sub(raw)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        self.allowances
            .insert((from.clone(), spender.clone()), allowance);
        self.raw_balances.insert(from.clone(), remaining);
        self.raw_supply = supply;
        debug!(spender = %spender, from = %from, amount, raw, "ledger burn");
        Ok(())
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), LedgerError> {
        if to.is_empty() {
            return Err(LedgerError::EmptyAddress);
        }
        let (raw, remaining) = self.checked_debit(from, amount)?;
        if from == to {
            return Ok(());
        }
        let credited = self
            .raw_balance_of(to)
            .checked_add(raw)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        self.raw_balances.insert(from.clone(), remaining);
        self.raw_balances.insert(to.clone(), credited);
        debug!(from = %from, to = %to, amount, raw, "ledger transfer");
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let allowance = self.checked_allowance(from, spender, amount)?;
        self.transfer(from, to, amount)?;
        self.allowances
            .insert((from.clone(), spender.clone()), allowance);
        Ok(())
    }

    fn balance_of(&self, holder: &Address) -> u128 {
        self.effective(self.raw_balance_of(holder))
    }

    fn total_supply(&self) -> u128 {
        self.effective(self.raw_supply)
    }

    fn raw_total_supply(&self) -> u128 {
        self.raw_supply
    }

    fn index(&self) -> u128 {
        self.index
    }

    fn set_index(&mut self, index: u128) -> Result<(), LedgerError> {
        if index == 0 || index > self.index {
            return Err(LedgerError::InvalidIndex {
                current: self.index,
                proposed: index,
            });
        }
        self.index = index;
        Ok(())
    }
}
