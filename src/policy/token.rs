//! Token policy: the user-facing entry point for minting, burning and
//! debasing.
//!
//! Callers are checked against the policy's own minter set; the modules then
//! see the policy address as the caller and check the kernel table.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::audit::ProtocolEvent;
use crate::error::ErrorKind;
use crate::kernel::{Kernel, KernelError};
use crate::ledger::BalanceLedger;
use crate::module::{resolve_dependency, PermissionRequest, Policy};
use crate::modules::index::{self, DebaseOutcome, ElasticSupplyIndex, IndexError};
use crate::modules::mint::{self, MintAccounting, MintError};
use crate::types::{Address, CallContext};

/// Token policy failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenPolicyError {
    /// Kernel rejected the call.
    #[error(transparent)]
    Kernel(#[from] KernelError),
    /// Mint limiter rejected the forwarded call.
    #[error(transparent)]
    Mint(#[from] MintError),
    /// Supply index rejected the forwarded call.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Caller is not an authorized minter.
    #[error("{caller} is not an authorized minter")]
    NotAuthorized {
        /// Rejected caller.
        caller: Address,
    },
    /// Policy is not active in the kernel.
    #[error("token policy {policy} is not active")]
    PolicyInactive {
        /// Policy address.
        policy: Address,
    },
    /// Empty minter address.
    #[error("minter address is empty")]
    EmptyMinter,
}

impl TokenPolicyError {
    /// Caller-visible failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Kernel(e) => e.kind(),
            Self::Mint(e) => e.kind(),
            Self::Index(e) => e.kind(),
            Self::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            Self::PolicyInactive { .. } => ErrorKind::PolicyInactive,
            Self::EmptyMinter => ErrorKind::InvalidInput,
        }
    }
}

/// Addresses resolved during activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDependencies {
    /// Current `MINTR` implementation.
    pub mintr: Address,
    /// Current `INDEX` implementation.
    pub index: Address,
}

/// The token policy.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    address: Address,
    active: bool,
    authorized_minters: BTreeSet<Address>,
    dependencies: Option<TokenDependencies>,
}

impl TokenPolicy {
    /// Inactive policy at `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            active: false,
            authorized_minters: BTreeSet::new(),
            dependencies: None,
        }
    }

    /// Allow `minter` to mint and burn through this policy. Executor only.
    ///
    /// # Errors
    ///
    /// Returns [`TokenPolicyError::Kernel`] for a non-executor caller or
    /// [`TokenPolicyError::EmptyMinter`].
    pub fn authorize_minter(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        minter: &Address,
    ) -> Result<(), TokenPolicyError> {
        kernel.ensure_executor(&ctx.caller)?;
        if minter.is_empty() {
            return Err(TokenPolicyError::EmptyMinter);
        }
        self.authorized_minters.insert(minter.clone());
        self.record_authorization(kernel, ctx, minter, true);
        Ok(())
    }

    /// Revoke `minter`. Executor only.
    ///
    /// # Errors
    ///
    /// Returns [`TokenPolicyError::Kernel`] for a non-executor caller.
    pub fn deauthorize_minter(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        minter: &Address,
    ) -> Result<(), TokenPolicyError> {
        kernel.ensure_executor(&ctx.caller)?;
        self.authorized_minters.remove(minter);
        self.record_authorization(kernel, ctx, minter, false);
        Ok(())
    }

    /// Mint through `MINTR` for an authorized caller.
    ///
    /// # Errors
    ///
    /// Returns [`TokenPolicyError::PolicyInactive`],
    /// [`TokenPolicyError::NotAuthorized`], or the module's error.
    pub fn mint(
        &self,
        kernel: &Kernel,
        mintr: &mut MintAccounting,
        ledger: &mut dyn BalanceLedger,
        ctx: &CallContext,
        to: &Address,
        amount: u128,
    ) -> Result<(), TokenPolicyError> {
        self.ensure_active(kernel)?;
        self.ensure_authorized(&ctx.caller)?;
        mintr.mint(kernel, ledger, &ctx.forwarded_by(&self.address), to, amount)?;
        Ok(())
    }

    /// Burn through `MINTR` for an authorized caller.
    ///
    /// # Errors
    ///
    /// Returns [`TokenPolicyError::PolicyInactive`],
    /// [`TokenPolicyError::NotAuthorized`], or the module's error.
    pub fn burn(
        &self,
        kernel: &Kernel,
        mintr: &mut MintAccounting,
        ledger: &mut dyn BalanceLedger,
        ctx: &CallContext,
        from: &Address,
        amount: u128,
    ) -> Result<(), TokenPolicyError> {
        self.ensure_active(kernel)?;
        self.ensure_authorized(&ctx.caller)?;
        mintr.burn(kernel, ledger, &ctx.forwarded_by(&self.address), from, amount)?;
        Ok(())
    }

    /// Trigger a debase step. Open to any caller.
    ///
    /// # Errors
    ///
    /// Returns [`TokenPolicyError::PolicyInactive`] or the module's error.
    pub fn debase(
        &self,
        kernel: &Kernel,
        index: &mut ElasticSupplyIndex,
        ledger: &mut dyn BalanceLedger,
        ctx: &CallContext,
    ) -> Result<DebaseOutcome, TokenPolicyError> {
        self.ensure_active(kernel)?;
        let outcome = index.debase(kernel, ledger, &ctx.forwarded_by(&self.address))?;
        Ok(outcome)
    }

    /// Change the debase rate. Executor only.
    ///
    /// # Errors
    ///
    /// Returns [`TokenPolicyError::Kernel`] for a non-executor caller,
    /// [`TokenPolicyError::PolicyInactive`], or the module's error.
    pub fn change_debase_rate(
        &self,
        kernel: &Kernel,
        index: &mut ElasticSupplyIndex,
        ctx: &CallContext,
        rate_bp: u32,
    ) -> Result<(), TokenPolicyError> {
        kernel.ensure_executor(&ctx.caller)?;
        self.ensure_active(kernel)?;
        index.change_debase_rate(kernel, &ctx.forwarded_by(&self.address), rate_bp)?;
        Ok(())
    }

    /// Whether `minter` may mint and burn through this policy.
    pub fn is_authorized_minter(&self, minter: &Address) -> bool {
        self.authorized_minters.contains(minter)
    }

    /// Whether the kernel has activated this policy.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Module addresses resolved at the last activation.
    pub fn dependencies(&self) -> Option<&TokenDependencies> {
        self.dependencies.as_ref()
    }

    fn ensure_active(&self, kernel: &Kernel) -> Result<(), TokenPolicyError> {
        if self.active && kernel.is_policy_active(&self.address) {
            Ok(())
        } else {
            Err(TokenPolicyError::PolicyInactive {
                policy: self.address.clone(),
            })
        }
    }

    fn ensure_authorized(&self, caller: &Address) -> Result<(), TokenPolicyError> {
        if self.authorized_minters.contains(caller) {
            return Ok(());
        }
        warn!(caller = %caller, "unauthorized minter");
        Err(TokenPolicyError::NotAuthorized {
            caller: caller.clone(),
        })
    }

    fn record_authorization(
        &self,
        kernel: &Kernel,
        ctx: &CallContext,
        minter: &Address,
        authorized: bool,
    ) {
        info!(minter = %minter, authorized, "minter authorization changed");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::MinterAuthorization {
                minter: minter.clone(),
                authorized,
            },
        );
    }
}

impl Policy for TokenPolicy {
    fn address(&self) -> &Address {
        &self.address
    }

    fn configure_dependencies(
        &mut self,
        kernel: &Kernel,
    ) -> Result<Vec<PermissionRequest>, KernelError> {
        let dependencies = TokenDependencies {
            mintr: resolve_dependency(kernel, mint::KEYCODE)?,
            index: resolve_dependency(kernel, index::KEYCODE)?,
        };
        self.dependencies = Some(dependencies);
        Ok(vec![
            PermissionRequest::new(mint::KEYCODE, mint::ops::MINT),
            PermissionRequest::new(mint::KEYCODE, mint::ops::BURN),
            PermissionRequest::new(index::KEYCODE, index::ops::DEBASE),
            PermissionRequest::new(index::KEYCODE, index::ops::CHANGE_DEBASE_RATE),
        ])
    }

    fn on_activation(&mut self, active: bool) {
        self.active = active;
    }
}
