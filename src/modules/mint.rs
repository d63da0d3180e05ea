//! `MINTR`: rolling daily mint cap with per-caller lifetime limits.
//!
//! The window is a calendar day (`floor(unix / 86400)`), reset lazily on the
//! first mint of a later day. A clock that reads an earlier day than the
//! last recorded mint does not reset anything, so skewed callers cannot
//! reopen a spent window.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::ProtocolEvent;
use crate::error::ErrorKind;
use crate::kernel::{Kernel, KernelError};
use crate::ledger::{BalanceLedger, LedgerError};
use crate::module::{Module, ModuleGuard};
use crate::types::{Address, CallContext, Keycode, SECONDS_PER_DAY};

/// Role name of the mint limiter.
pub const KEYCODE: Keycode = Keycode::literal(b"MINTR");

/// Guarded operation names.
pub mod ops {
    /// Mint new supply.
    pub const MINT: &str = "mint";
    /// Burn supply through the module's allowance.
    pub const BURN: &str = "burn";
}

/// Mint limiter failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MintError {
    /// Kernel rejected the call.
    #[error(transparent)]
    Kernel(#[from] KernelError),
    /// Ledger rejected the mint or burn.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Window total would exceed the daily cap.
    #[error("daily mint cap exceeded: {minted_today} minted + {requested} requested > cap {cap}")]
    DailyCapExceeded {
        /// Configured cap.
        cap: u128,
        /// Already minted in the current window.
        minted_today: u128,
        /// Requested amount.
        requested: u128,
    },
    /// Caller total would exceed its own limit.
    #[error("policy limit exceeded for {minter}: {minted} minted + {requested} requested > limit {limit}")]
    PolicyLimitExceeded {
        /// Calling policy or module.
        minter: Address,
        /// Its configured lifetime limit.
        limit: u128,
        /// Already minted by it.
        minted: u128,
        /// Requested amount.
        requested: u128,
    },
    /// Minter is not registered.
    #[error("unknown minter {minter}")]
    UnknownMinter {
        /// Address that was looked up.
        minter: Address,
    },
    /// Empty minter address.
    #[error("minter address is empty")]
    EmptyMinter,
    /// Counter overflow.
    #[error("mint counter overflow")]
    ArithmeticOverflow,
}

impl MintError {
    /// Caller-visible failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Kernel(e) => e.kind(),
            Self::Ledger(e) => e.kind(),
            Self::DailyCapExceeded { .. } => ErrorKind::DailyCapExceeded,
            Self::PolicyLimitExceeded { .. } => ErrorKind::PolicyLimitExceeded,
            Self::UnknownMinter { .. } => ErrorKind::NotFound,
            Self::EmptyMinter => ErrorKind::InvalidInput,
            Self::ArithmeticOverflow => ErrorKind::ArithmeticOverflow,
        }
    }
}

/// Per-caller mint accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MinterInfo {
    /// Lifetime limit.
    pub policy_limit: u128,
    /// Lifetime total minted.
    pub minted_so_far: u128,
}

impl MinterInfo {
    /// Amount still mintable under the limit.
    pub fn remaining(&self) -> u128 {
        self.policy_limit.saturating_sub(self.minted_so_far)
    }
}

/// The `MINTR` module.
#[derive(Debug, Clone)]
pub struct MintAccounting {
    guard: ModuleGuard,
    daily_mint_cap: u128,
    minted_today: u128,
    last_mint_day: i64,
    minters: BTreeMap<Address, MinterInfo>,
}

impl MintAccounting {
    /// Limiter at `address` with the given daily cap.
    pub fn new(address: Address, daily_mint_cap: u128) -> Self {
        Self {
            guard: ModuleGuard::new(KEYCODE, address),
            daily_mint_cap,
            minted_today: 0,
            last_mint_day: 0,
            minters: BTreeMap::new(),
        }
    }

    /// Mint `amount` to `to` on behalf of `ctx.caller`.
    ///
    /// # Errors
    ///
    /// - [`MintError::Kernel`] if the caller lacks `mint`.
    /// - [`MintError::DailyCapExceeded`] if the window total would exceed the cap.
    /// - [`MintError::PolicyLimitExceeded`] if the caller total would exceed its limit.
    /// - [`MintError::Ledger`] if the ledger rejects the credit.
    pub fn mint(
        &mut self,
        kernel: &Kernel,
        ledger: &mut dyn BalanceLedger,
        ctx: &CallContext,
        to: &Address,
        amount: u128,
    ) -> Result<(), MintError> {
        self.guard.require(kernel, &ctx.caller, ops::MINT)?;

        let day = ctx.day_index();
        let minted_today = self.window_total(day);
        let window_total = minted_today
            .checked_add(amount)
            .ok_or(MintError::ArithmeticOverflow)?;
        if window_total > self.daily_mint_cap {
            warn!(
                caller = %ctx.caller,
                cap = self.daily_mint_cap,
                minted_today,
                requested = amount,
                "daily mint cap exceeded"
            );
            return Err(MintError::DailyCapExceeded {
                cap: self.daily_mint_cap,
                minted_today,
                requested: amount,
            });
        }

        let info = self.minters.get(&ctx.caller).cloned().unwrap_or_default();
        let caller_total = info
            .minted_so_far
            .checked_add(amount)
            .ok_or(MintError::ArithmeticOverflow)?;
        if caller_total > info.policy_limit {
            warn!(
                caller = %ctx.caller,
                limit = info.policy_limit,
                minted = info.minted_so_far,
                requested = amount,
                "policy mint limit exceeded"
            );
            return Err(MintError::PolicyLimitExceeded {
                minter: ctx.caller.clone(),
                limit: info.policy_limit,
                minted: info.minted_so_far,
                requested: amount,
            });
        }

        ledger.mint(to, amount)?;

        if day > self.last_mint_day {
            self.last_mint_day = day;
        }
        self.minted_today = window_total;
        if let Some(entry) = self.minters.get_mut(&ctx.caller) {
            entry.minted_so_far = caller_total;
        }

        info!(caller = %ctx.caller, to = %to, amount, minted_today = window_total, "minted");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::Minted {
                caller: ctx.caller.clone(),
                to: to.clone(),
                amount,
                minted_today: window_total,
            },
        );
        Ok(())
    }

    /// Burn `amount` of `from`'s tokens through this module's allowance.
    ///
    /// Does not refund any mint counter.
    ///
    /// # Errors
    ///
    /// Returns [`MintError::Kernel`] if the caller lacks `burn`, or the
    /// ledger's allowance/balance error unchanged.
    pub fn burn(
        &mut self,
        kernel: &Kernel,
        ledger: &mut dyn BalanceLedger,
        ctx: &CallContext,
        from: &Address,
        amount: u128,
    ) -> Result<(), MintError> {
        self.guard.require(kernel, &ctx.caller, ops::BURN)?;
        ledger.burn_from(self.guard.address(), from, amount)?;

        info!(caller = %ctx.caller, from = %from, amount, "burned");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::Burned {
                caller: ctx.caller.clone(),
                from: from.clone(),
                amount,
            },
        );
        Ok(())
    }

    /// Register `minter` with a lifetime limit, or update the limit of an
    /// existing one. Executor only.
    ///
    /// # Errors
    ///
    /// Returns [`MintError::Kernel`] for a non-executor caller or
    /// [`MintError::EmptyMinter`].
    pub fn add_minter(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        minter: &Address,
        limit: u128,
    ) -> Result<(), MintError> {
        self.guard.require_executor(kernel, &ctx.caller)?;
        if minter.is_empty() {
            return Err(MintError::EmptyMinter);
        }
        self.minters.entry(minter.clone()).or_default().policy_limit = limit;
        self.record_limit(kernel, ctx, minter, limit);
        Ok(())
    }

    /// Change the limit of a registered minter. Executor only.
    ///
    /// # Errors
    ///
    /// Returns [`MintError::Kernel`] for a non-executor caller or
    /// [`MintError::UnknownMinter`].
    pub fn set_policy_limit(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        minter: &Address,
        limit: u128,
    ) -> Result<(), MintError> {
        self.guard.require_executor(kernel, &ctx.caller)?;
        let entry = self
            .minters
            .get_mut(minter)
            .ok_or_else(|| MintError::UnknownMinter {
                minter: minter.clone(),
            })?;
        entry.policy_limit = limit;
        self.record_limit(kernel, ctx, minter, limit);
        Ok(())
    }

    /// Forget `minter` and its counters. Executor only.
    ///
    /// # Errors
    ///
    /// Returns [`MintError::Kernel`] for a non-executor caller or
    /// [`MintError::UnknownMinter`].
    pub fn remove_minter(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        minter: &Address,
    ) -> Result<(), MintError> {
        self.guard.require_executor(kernel, &ctx.caller)?;
        if self.minters.remove(minter).is_none() {
            return Err(MintError::UnknownMinter {
                minter: minter.clone(),
            });
        }
        info!(minter = %minter, "minter removed");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::MinterRemoved {
                minter: minter.clone(),
            },
        );
        Ok(())
    }

    /// Replace the daily cap. Executor only. Takes effect for the current window.
    ///
    /// # Errors
    ///
    /// Returns [`MintError::Kernel`] for a non-executor caller.
    pub fn set_daily_mint_cap(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        cap: u128,
    ) -> Result<(), MintError> {
        self.guard.require_executor(kernel, &ctx.caller)?;
        self.daily_mint_cap = cap;
        info!(cap, "daily mint cap changed");
        kernel
            .audit()
            .emit(ctx.now, ProtocolEvent::DailyMintCapChanged { cap });
        Ok(())
    }

    // -- queries ------------------------------------------------------------

    /// Configured daily cap.
    pub fn daily_mint_cap(&self) -> u128 {
        self.daily_mint_cap
    }

    /// Stored window counter (not reset until the next mint of a later day).
    pub fn minted_today(&self) -> u128 {
        self.minted_today
    }

    /// Day index of the stored window.
    pub fn last_mint_day(&self) -> i64 {
        self.last_mint_day
    }

    /// Whether `minter` is registered.
    pub fn is_minter(&self, minter: &Address) -> bool {
        self.minters.contains_key(minter)
    }

    /// Accounting for `minter`.
    pub fn minter_info(&self, minter: &Address) -> Option<&MinterInfo> {
        self.minters.get(minter)
    }

    /// Amount that could still be minted under the cap at `now`.
    pub fn remaining_today(&self, now: DateTime<Utc>) -> u128 {
        let day = now.timestamp().div_euclid(SECONDS_PER_DAY);
        self.daily_mint_cap.saturating_sub(self.window_total(day))
    }

    fn window_total(&self, day: i64) -> u128 {
        if day > self.last_mint_day {
            0
        } else {
            self.minted_today
        }
    }

    fn record_limit(&self, kernel: &Kernel, ctx: &CallContext, minter: &Address, limit: u128) {
        info!(minter = %minter, limit, "policy limit set");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::PolicyLimitSet {
                minter: minter.clone(),
                limit,
            },
        );
    }
}

impl Module for MintAccounting {
    fn keycode(&self) -> Keycode {
        KEYCODE
    }

    fn address(&self) -> &Address {
        self.guard.address()
    }

    fn init(&mut self, ctx: &CallContext) {
        self.last_mint_day = ctx.day_index();
        self.minted_today = 0;
    }
}
