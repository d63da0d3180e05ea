//! Error taxonomy shared across components.
//!
//! Each component has its own `thiserror` enum; all of them map onto
//! [`ErrorKind`] so callers can decide between retrying later, asking for a
//! grant, or giving up without matching on every concrete variant.

use serde::Serialize;

/// Caller-visible failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller is not authorized for the (module, operation) pair.
    PermissionDenied,
    /// A kernel-admin action came from someone other than the executor.
    NotExecutor,
    /// Install targeted a keycode that is already registered.
    ModuleAlreadyInstalled,
    /// The keycode or module address is not registered.
    ModuleNotFound,
    /// Debase attempted before the interval elapsed.
    RateTooSoon,
    /// Mint would exceed the rolling daily cap.
    DailyCapExceeded,
    /// Mint would exceed the caller's own limit.
    PolicyLimitExceeded,
    /// Bond discount above the configured ceiling.
    DiscountTooHigh,
    /// Debase rate above the configured ceiling.
    RateTooHigh,
    /// Ledger allowance too small.
    InsufficientAllowance,
    /// Ledger balance too small.
    InsufficientBalance,
    /// Policy-level authorization failed (not a kernel permission).
    NotAuthorized,
    /// The policy is not active in the kernel.
    PolicyInactive,
    /// Treasury approval too small for the request.
    ApprovalExceeded,
    /// Repayment larger than outstanding debt.
    DebtExceeded,
    /// Bond has not vested yet.
    NotMature,
    /// Referenced record does not exist.
    NotFound,
    /// Malformed input (empty address, duplicate target, ...).
    InvalidInput,
    /// Fixed-point arithmetic would overflow.
    ArithmeticOverflow,
    /// One more debase would drive the index to zero.
    IndexExhausted,
    /// The kernel has been migrated to a successor.
    KernelRetired,
}

/// What a caller should do after a failure of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerAction {
    /// Same call may succeed later without anyone else acting.
    RetryLater,
    /// Ask the executor (or policy owner) for a grant or a higher limit.
    RequestGrant,
    /// The call itself is wrong; change it.
    FixCallSite,
    /// Adjust balances or allowances, then retry.
    AdjustFunds,
    /// Structural; do not retry.
    Abandon,
}

impl ErrorKind {
    /// Recommended caller reaction.
    pub fn caller_action(self) -> CallerAction {
        match self {
            Self::RateTooSoon | Self::DailyCapExceeded | Self::NotMature => CallerAction::RetryLater,
            Self::PermissionDenied
            | Self::PolicyLimitExceeded
            | Self::NotAuthorized
            | Self::PolicyInactive
            | Self::ApprovalExceeded => CallerAction::RequestGrant,
            Self::ModuleAlreadyInstalled
            | Self::ModuleNotFound
            | Self::DiscountTooHigh
            | Self::RateTooHigh
            | Self::DebtExceeded
            | Self::NotFound
            | Self::InvalidInput => CallerAction::FixCallSite,
            Self::InsufficientAllowance | Self::InsufficientBalance => CallerAction::AdjustFunds,
            Self::NotExecutor
            | Self::ArithmeticOverflow
            | Self::IndexExhausted
            | Self::KernelRetired => CallerAction::Abandon,
        }
    }

    /// Whether waiting alone can make the same call succeed.
    pub fn is_retryable(self) -> bool {
        self.caller_action() == CallerAction::RetryLater
    }
}
