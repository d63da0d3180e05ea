//! `INDEX`: multiplicative elastic-supply index.
//!
//! Each successful debase multiplies the ledger index by
//! `(10000 - rate) / 10000` with floor division, so decay compounds and
//! truncation drift accumulates exactly. The index value lives in the
//! ledger; this module is its only writer.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::arithmetic::{reduce_by_bps, to_effective};
use crate::audit::ProtocolEvent;
use crate::error::ErrorKind;
use crate::kernel::{Kernel, KernelError};
use crate::ledger::{BalanceLedger, LedgerError};
use crate::module::{Module, ModuleGuard};
use crate::types::{Address, CallContext, Keycode, BASIS_POINTS};

/// Role name of the supply index.
pub const KEYCODE: Keycode = Keycode::literal(b"INDEX");

/// Guarded operation names.
pub mod ops {
    /// Apply one debase step.
    pub const DEBASE: &str = "debase";
    /// Change the per-step rate.
    pub const CHANGE_DEBASE_RATE: &str = "changeDebaseRate";
}

/// Default ceiling for the debase rate (50%).
pub const DEFAULT_MAX_DEBASE_RATE_BP: u32 = 5_000;

/// Supply index failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// Kernel rejected the call.
    #[error(transparent)]
    Kernel(#[from] KernelError),
    /// Ledger rejected the index write.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Debase before the interval elapsed.
    #[error("debase too soon: next allowed at {next_allowed}")]
    RateTooSoon {
        /// Earliest time the next debase may run.
        next_allowed: DateTime<Utc>,
    },
    /// Rate at or above 100% or above the configured ceiling.
    #[error("debase rate {requested_bp}bp exceeds maximum {max_bp}bp")]
    RateTooHigh {
        /// Requested rate.
        requested_bp: u32,
        /// Effective ceiling.
        max_bp: u32,
    },
    /// One more step would drive the index to zero.
    #[error("index exhausted: debasing {index} at {rate_bp}bp reaches zero")]
    IndexExhausted {
        /// Current index.
        index: u128,
        /// Rate that was applied.
        rate_bp: u32,
    },
    /// Interval that does not fit a time delta.
    #[error("invalid debase interval {secs}s")]
    InvalidInterval {
        /// Rejected interval.
        secs: u64,
    },
    /// Fixed-point overflow.
    #[error("index arithmetic overflow")]
    ArithmeticOverflow,
}

impl IndexError {
    /// Caller-visible failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Kernel(e) => e.kind(),
            Self::Ledger(e) => e.kind(),
            Self::RateTooSoon { .. } => ErrorKind::RateTooSoon,
            Self::RateTooHigh { .. } => ErrorKind::RateTooHigh,
            Self::IndexExhausted { .. } => ErrorKind::IndexExhausted,
            Self::InvalidInterval { .. } => ErrorKind::InvalidInput,
            Self::ArithmeticOverflow => ErrorKind::ArithmeticOverflow,
        }
    }
}

/// Result of a debase call that passed the cooldown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DebaseOutcome {
    /// The index moved.
    Applied {
        /// Index before.
        previous_index: u128,
        /// Index after.
        index: u128,
    },
    /// Effective supply below the floor; nothing changed.
    Skipped {
        /// Effective supply at the time of the call.
        effective_supply: u128,
        /// Configured floor.
        min_threshold: u128,
    },
}

/// Initial debase schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    /// Per-step rate in basis points.
    pub debase_rate_bp: u32,
    /// Minimum seconds between steps.
    pub debase_interval_secs: u64,
    /// Effective supply below which debase is a no-op.
    pub min_debase_threshold: u128,
    /// Ceiling for `change_debase_rate`.
    pub max_debase_rate_bp: u32,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            debase_rate_bp: 300,
            debase_interval_secs: 86_400,
            min_debase_threshold: 0,
            max_debase_rate_bp: DEFAULT_MAX_DEBASE_RATE_BP,
        }
    }
}

/// The `INDEX` module.
#[derive(Debug, Clone)]
pub struct ElasticSupplyIndex {
    guard: ModuleGuard,
    debase_rate_bp: u32,
    debase_interval: TimeDelta,
    last_debase_time: DateTime<Utc>,
    min_debase_threshold: u128,
    max_debase_rate_bp: u32,
}

impl ElasticSupplyIndex {
    /// Index module at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::RateTooHigh`] if the initial rate is out of
    /// bounds or [`IndexError::InvalidInterval`] if the interval overflows.
    pub fn new(address: Address, settings: IndexSettings) -> Result<Self, IndexError> {
        validate_rate(settings.debase_rate_bp, settings.max_debase_rate_bp)?;
        Ok(Self {
            guard: ModuleGuard::new(KEYCODE, address),
            debase_rate_bp: settings.debase_rate_bp,
            debase_interval: interval(settings.debase_interval_secs)?,
            last_debase_time: DateTime::<Utc>::UNIX_EPOCH,
            min_debase_threshold: settings.min_debase_threshold,
            max_debase_rate_bp: settings.max_debase_rate_bp,
        })
    }

    /// Apply one debase step if the interval has elapsed.
    ///
    /// # Errors
    ///
    /// - [`IndexError::Kernel`] if the caller lacks `debase`.
    /// - [`IndexError::RateTooSoon`] before `next_debase_at`, including a
    ///   clock that reads earlier than the last debase.
    /// - [`IndexError::IndexExhausted`] if the step would reach zero.
    pub fn debase(
        &mut self,
        kernel: &Kernel,
        ledger: &mut dyn BalanceLedger,
        ctx: &CallContext,
    ) -> Result<DebaseOutcome, IndexError> {
        self.guard.require(kernel, &ctx.caller, ops::DEBASE)?;

        let next_allowed = self.next_debase_at()?;
        if ctx.now < next_allowed {
            warn!(now = %ctx.now, next_allowed = %next_allowed, "debase too soon");
            return Err(IndexError::RateTooSoon { next_allowed });
        }

        let previous_index = ledger.index();
        let effective_supply = to_effective(ledger.raw_total_supply(), previous_index)
            .ok_or(IndexError::ArithmeticOverflow)?;
        if effective_supply < self.min_debase_threshold {
            info!(
                effective_supply,
                min_threshold = self.min_debase_threshold,
                "debase skipped below threshold"
            );
            return Ok(DebaseOutcome::Skipped {
                effective_supply,
                min_threshold: self.min_debase_threshold,
            });
        }

        let index = reduce_by_bps(previous_index, self.debase_rate_bp)
            .ok_or(IndexError::ArithmeticOverflow)?;
        if index == 0 {
            return Err(IndexError::IndexExhausted {
                index: previous_index,
                rate_bp: self.debase_rate_bp,
            });
        }
        ledger.set_index(index)?;
        self.last_debase_time = ctx.now;

        info!(previous_index, index, rate_bp = self.debase_rate_bp, "debased");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::Debased {
                previous_index,
                index,
                rate_bp: self.debase_rate_bp,
            },
        );
        Ok(DebaseOutcome::Applied {
            previous_index,
            index,
        })
    }

    /// Set the rate the next debase uses.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Kernel`] if the caller lacks `changeDebaseRate`,
    /// or [`IndexError::RateTooHigh`] for `rate >= 10000` or above the ceiling.
    pub fn change_debase_rate(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        rate_bp: u32,
    ) -> Result<(), IndexError> {
        self.guard
            .require(kernel, &ctx.caller, ops::CHANGE_DEBASE_RATE)?;
        validate_rate(rate_bp, self.max_debase_rate_bp)?;

        let previous_bp = std::mem::replace(&mut self.debase_rate_bp, rate_bp);
        info!(previous_bp, rate_bp, "debase rate changed");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::DebaseRateChanged {
                previous_bp,
                rate_bp,
            },
        );
        Ok(())
    }

    /// Change the cooldown. Executor only.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Kernel`] for a non-executor caller or
    /// [`IndexError::InvalidInterval`].
    pub fn set_debase_interval(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        secs: u64,
    ) -> Result<(), IndexError> {
        self.guard.require_executor(kernel, &ctx.caller)?;
        self.debase_interval = interval(secs)?;
        self.record_schedule(kernel, ctx);
        Ok(())
    }

    /// Change the effective-supply floor. Executor only.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Kernel`] for a non-executor caller.
    pub fn set_min_debase_threshold(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        threshold: u128,
    ) -> Result<(), IndexError> {
        self.guard.require_executor(kernel, &ctx.caller)?;
        self.min_debase_threshold = threshold;
        self.record_schedule(kernel, ctx);
        Ok(())
    }

    // -- queries ------------------------------------------------------------

    /// Current per-step rate.
    pub fn debase_rate(&self) -> u32 {
        self.debase_rate_bp
    }

    /// Ceiling for the rate.
    pub fn max_debase_rate(&self) -> u32 {
        self.max_debase_rate_bp
    }

    /// Cooldown between steps.
    pub fn debase_interval(&self) -> TimeDelta {
        self.debase_interval
    }

    /// Time of the last successful step (install time before the first).
    pub fn last_debase_time(&self) -> DateTime<Utc> {
        self.last_debase_time
    }

    /// Effective-supply floor.
    pub fn min_debase_threshold(&self) -> u128 {
        self.min_debase_threshold
    }

    /// Earliest time the next step may run.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ArithmeticOverflow`] if the sum is out of range.
    pub fn next_debase_at(&self) -> Result<DateTime<Utc>, IndexError> {
        self.last_debase_time
            .checked_add_signed(self.debase_interval)
            .ok_or(IndexError::ArithmeticOverflow)
    }

    fn record_schedule(&self, kernel: &Kernel, ctx: &CallContext) {
        let interval_secs = u64::try_from(self.debase_interval.num_seconds()).unwrap_or(0);
        info!(
            interval_secs,
            min_threshold = self.min_debase_threshold,
            "debase schedule changed"
        );
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::DebaseScheduleChanged {
                interval_secs,
                min_threshold: self.min_debase_threshold,
            },
        );
    }
}

impl Module for ElasticSupplyIndex {
    fn keycode(&self) -> Keycode {
        KEYCODE
    }

    fn address(&self) -> &Address {
        self.guard.address()
    }

    fn init(&mut self, ctx: &CallContext) {
        self.last_debase_time = ctx.now;
    }
}

fn validate_rate(rate_bp: u32, max_bp: u32) -> Result<(), IndexError> {
    if rate_bp >= BASIS_POINTS || rate_bp > max_bp {
        return Err(IndexError::RateTooHigh {
            requested_bp: rate_bp,
            max_bp: max_bp.min(BASIS_POINTS.saturating_sub(1)),
        });
    }
    Ok(())
}

fn interval(secs: u64) -> Result<TimeDelta, IndexError> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or(IndexError::InvalidInterval { secs })
}
