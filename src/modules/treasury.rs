//! `TRSRY`: reserve custody with approval-gated withdrawals and debt.
//!
//! Reserves are the ledger balance of the treasury's own address. Policies
//! need both a kernel permission and an executor-set approval to move them.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::audit::ProtocolEvent;
use crate::error::ErrorKind;
use crate::kernel::{Kernel, KernelError};
use crate::ledger::{BalanceLedger, LedgerError};
use crate::module::{Module, ModuleGuard};
use crate::types::{Address, CallContext, Keycode};

/// Role name of the treasury.
pub const KEYCODE: Keycode = Keycode::literal(b"TRSRY");

/// Guarded operation names.
pub mod ops {
    /// Send reserves to a recipient.
    pub const WITHDRAW_RESERVES: &str = "withdrawReserves";
    /// Borrow reserves.
    pub const INCUR_DEBT: &str = "incurDebt";
    /// Pay back borrowed reserves.
    pub const REPAY_DEBT: &str = "repayDebt";
}

/// Treasury failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreasuryError {
    /// Kernel rejected the call.
    #[error(transparent)]
    Kernel(#[from] KernelError),
    /// Ledger rejected the transfer.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Withdraw approval too small.
    #[error("withdrawal not approved for {policy}: approved {approved}, requested {requested}")]
    WithdrawalNotApproved {
        /// Calling policy.
        policy: Address,
        /// Remaining approval.
        approved: u128,
        /// Requested amount.
        requested: u128,
    },
    /// Debt approval too small.
    #[error("debt not approved for {policy}: approved {approved}, requested {requested}")]
    DebtNotApproved {
        /// Calling policy.
        policy: Address,
        /// Remaining approval.
        approved: u128,
        /// Requested amount.
        requested: u128,
    },
    /// Repayment above outstanding debt.
    #[error("repayment of {requested} exceeds outstanding debt {outstanding} of {debtor}")]
    RepayExceedsDebt {
        /// Debtor.
        debtor: Address,
        /// Outstanding debt.
        outstanding: u128,
        /// Requested repayment.
        requested: u128,
    },
    /// Empty policy or debtor address.
    #[error("treasury address argument is empty")]
    EmptyAddress,
    /// Debt total overflow.
    #[error("treasury arithmetic overflow")]
    ArithmeticOverflow,
}

impl TreasuryError {
    /// Caller-visible failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Kernel(e) => e.kind(),
            Self::Ledger(e) => e.kind(),
            Self::WithdrawalNotApproved { .. } | Self::DebtNotApproved { .. } => {
                ErrorKind::ApprovalExceeded
            }
            Self::RepayExceedsDebt { .. } => ErrorKind::DebtExceeded,
            Self::EmptyAddress => ErrorKind::InvalidInput,
            Self::ArithmeticOverflow => ErrorKind::ArithmeticOverflow,
        }
    }
}

/// Which approval an adjustment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    /// Outright withdrawals.
    Withdraw,
    /// Borrowing.
    Debt,
}

impl Approval {
    fn as_str(self) -> &'static str {
        match self {
            Self::Withdraw => "withdraw",
            Self::Debt => "debt",
        }
    }
}

/// The `TRSRY` module.
#[derive(Debug, Clone)]
pub struct Treasury {
    guard: ModuleGuard,
    withdraw_approvals: BTreeMap<Address, u128>,
    debt_approvals: BTreeMap<Address, u128>,
    debt: BTreeMap<Address, u128>,
    total_debt: u128,
}

impl Treasury {
    /// Treasury holding reserves at `address`.
    pub fn new(address: Address) -> Self {
        Self {
            guard: ModuleGuard::new(KEYCODE, address),
            withdraw_approvals: BTreeMap::new(),
            debt_approvals: BTreeMap::new(),
            debt: BTreeMap::new(),
            total_debt: 0,
        }
    }

    /// Raise an approval of `policy` by `amount`. Executor only.
    ///
    /// # Errors
    ///
    /// Returns [`TreasuryError::Kernel`] for a non-executor caller,
    /// [`TreasuryError::EmptyAddress`] or [`TreasuryError::ArithmeticOverflow`].
    pub fn increase_approval(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        approval: Approval,
        policy: &Address,
        amount: u128,
    ) -> Result<(), TreasuryError> {
        self.guard.require_executor(kernel, &ctx.caller)?;
        if policy.is_empty() {
            return Err(TreasuryError::EmptyAddress);
        }
        let current = self.approval(approval, policy);
        let next = current
            .checked_add(amount)
            .ok_or(TreasuryError::ArithmeticOverflow)?;
        self.store_approval(kernel, ctx, approval, policy, next);
        Ok(())
    }

    /// Lower an approval of `policy` by `amount`, flooring at zero. Executor only.
    ///
    /// # Errors
    ///
    /// Returns [`TreasuryError::Kernel`] for a non-executor caller.
    pub fn decrease_approval(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        approval: Approval,
        policy: &Address,
        amount: u128,
    ) -> Result<(), TreasuryError> {
        self.guard.require_executor(kernel, &ctx.caller)?;
        let next = self.approval(approval, policy).saturating_sub(amount);
        self.store_approval(kernel, ctx, approval, policy, next);
        Ok(())
    }

    /// Send `amount` of reserves to `to`, consuming the caller's withdraw approval.
    ///
    /// # Errors
    ///
    /// Returns [`TreasuryError::Kernel`] without `withdrawReserves`,
    /// [`TreasuryError::WithdrawalNotApproved`], or a ledger error.
    pub fn withdraw_reserves(
        &mut self,
        kernel: &Kernel,
        ledger: &mut dyn BalanceLedger,
        ctx: &CallContext,
        to: &Address,
        amount: u128,
    ) -> Result<(), TreasuryError> {
        self.guard
            .require(kernel, &ctx.caller, ops::WITHDRAW_RESERVES)?;
        let approved = self.approval(Approval::Withdraw, &ctx.caller);
        let remaining =
            approved
                .checked_sub(amount)
                .ok_or_else(|| TreasuryError::WithdrawalNotApproved {
                    policy: ctx.caller.clone(),
                    approved,
                    requested: amount,
                })?;

        ledger.transfer(self.guard.address(), to, amount)?;
        self.withdraw_approvals.insert(ctx.caller.clone(), remaining);

        info!(caller = %ctx.caller, to = %to, amount, "reserves withdrawn");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::ReservesWithdrawn {
                caller: ctx.caller.clone(),
                to: to.clone(),
                amount,
            },
        );
        Ok(())
    }

    /// Borrow `amount` of reserves to the caller, consuming its debt approval.
    ///
    /// # Errors
    ///
    /// Returns [`TreasuryError::Kernel`] without `incurDebt`,
    /// [`TreasuryError::DebtNotApproved`], or a ledger error.
    pub fn incur_debt(
        &mut self,
        kernel: &Kernel,
        ledger: &mut dyn BalanceLedger,
        ctx: &CallContext,
        amount: u128,
    ) -> Result<(), TreasuryError> {
        self.guard.require(kernel, &ctx.caller, ops::INCUR_DEBT)?;
        let approved = self.approval(Approval::Debt, &ctx.caller);
        let remaining =
            approved
                .checked_sub(amount)
                .ok_or_else(|| TreasuryError::DebtNotApproved {
                    policy: ctx.caller.clone(),
                    approved,
                    requested: amount,
                })?;
        let outstanding = self
            .debt_of(&ctx.caller)
            .checked_add(amount)
            .ok_or(TreasuryError::ArithmeticOverflow)?;
        let total = self
            .total_debt
            .checked_add(amount)
            .ok_or(TreasuryError::ArithmeticOverflow)?;

        ledger.transfer(self.guard.address(), &ctx.caller, amount)?;
        self.debt_approvals.insert(ctx.caller.clone(), remaining);
        self.debt.insert(ctx.caller.clone(), outstanding);
        self.total_debt = total;

        info!(debtor = %ctx.caller, amount, outstanding, "debt incurred");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::DebtIncurred {
                debtor: ctx.caller.clone(),
                amount,
                outstanding,
            },
        );
        Ok(())
    }

    /// Pull `amount` back from `debtor` (via its allowance to the treasury)
    /// and reduce its debt.
    ///
    /// # Errors
    ///
    /// Returns [`TreasuryError::Kernel`] without `repayDebt`,
    /// [`TreasuryError::RepayExceedsDebt`], or a ledger error.
    pub fn repay_debt(
        &mut self,
        kernel: &Kernel,
        ledger: &mut dyn BalanceLedger,
        ctx: &CallContext,
        debtor: &Address,
        amount: u128,
    ) -> Result<(), TreasuryError> {
        self.guard.require(kernel, &ctx.caller, ops::REPAY_DEBT)?;
        let current = self.debt_of(debtor);
        let outstanding =
            current
                .checked_sub(amount)
                .ok_or_else(|| TreasuryError::RepayExceedsDebt {
                    debtor: debtor.clone(),
                    outstanding: current,
                    requested: amount,
                })?;
        let total = self
            .total_debt
            .checked_sub(amount)
            .ok_or(TreasuryError::ArithmeticOverflow)?;

        let treasury = self.guard.address().clone();
        ledger.transfer_from(&treasury, debtor, &treasury, amount)?;
        if outstanding == 0 {
            self.debt.remove(debtor);
        } else {
            self.debt.insert(debtor.clone(), outstanding);
        }
        self.total_debt = total;

        info!(debtor = %debtor, amount, outstanding, "debt repaid");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::DebtRepaid {
                debtor: debtor.clone(),
                amount,
                outstanding,
            },
        );
        Ok(())
    }

    // -- queries ------------------------------------------------------------

    /// Reserves held at the treasury address.
    pub fn reserves(&self, ledger: &dyn BalanceLedger) -> u128 {
        ledger.balance_of(self.guard.address())
    }

    /// Remaining approval of `policy`.
    pub fn approval(&self, approval: Approval, policy: &Address) -> u128 {
        let table = match approval {
            Approval::Withdraw => &self.withdraw_approvals,
            Approval::Debt => &self.debt_approvals,
        };
        table.get(policy).copied().unwrap_or(0)
    }

    /// Outstanding debt of `debtor`.
    pub fn debt_of(&self, debtor: &Address) -> u128 {
        self.debt.get(debtor).copied().unwrap_or(0)
    }

    /// Sum of all outstanding debt.
    pub fn total_debt(&self) -> u128 {
        self.total_debt
    }

    fn store_approval(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        approval: Approval,
        policy: &Address,
        amount: u128,
    ) {
        let table = match approval {
            Approval::Withdraw => &mut self.withdraw_approvals,
            Approval::Debt => &mut self.debt_approvals,
        };
        if amount == 0 {
            table.remove(policy);
        } else {
            table.insert(policy.clone(), amount);
        }
        if approval == Approval::Debt && amount == 0 && self.debt_of(policy) > 0 {
            warn!(policy = %policy, "debt approval cleared with debt outstanding");
        }
        info!(policy = %policy, approval = approval.as_str(), amount, "treasury approval changed");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::TreasuryApprovalChanged {
                policy: policy.clone(),
                approval: approval.as_str().to_owned(),
                amount,
            },
        );
    }
}

impl Module for Treasury {
    fn keycode(&self) -> Keycode {
        KEYCODE
    }

    fn address(&self) -> &Address {
        self.guard.address()
    }
}
