//! Module and policy capability traits, plus the permission guard every
//! module embeds.

use serde::Serialize;
use tracing::debug;

use crate::kernel::{Kernel, KernelError};
use crate::types::{Address, CallContext, Keycode, Operation};

/// An installable unit of protocol state.
pub trait Module {
    /// Immutable role name.
    fn keycode(&self) -> Keycode;

    /// Address of this implementation.
    fn address(&self) -> &Address;

    /// One-time hook, run by the kernel on install and on upgrade.
    fn init(&mut self, ctx: &CallContext) {
        let _ = ctx;
    }
}

/// A caller-facing component that is granted module permissions.
pub trait Policy {
    /// Address the policy calls modules from.
    fn address(&self) -> &Address;

    /// Resolve required modules and return the standard permission set.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::ModuleNotFound`] if a dependency is not installed.
    fn configure_dependencies(
        &mut self,
        kernel: &Kernel,
    ) -> Result<Vec<PermissionRequest>, KernelError>;

    /// Activation state changed.
    fn on_activation(&mut self, active: bool) {
        let _ = active;
    }
}

/// One permission a policy needs to function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionRequest {
    /// Module role.
    pub keycode: Keycode,
    /// Guarded operation on that module.
    pub operation: Operation,
}

impl PermissionRequest {
    /// Request `operation` on `keycode`.
    pub fn new(keycode: Keycode, operation: &str) -> Self {
        Self {
            keycode,
            operation: Operation::new(operation),
        }
    }
}

/// Resolve `keycode` to its current address or fail with `ModuleNotFound`.
///
/// # Errors
///
/// Returns [`KernelError::ModuleNotFound`] if nothing is installed under `keycode`.
pub fn resolve_dependency(kernel: &Kernel, keycode: Keycode) -> Result<Address, KernelError> {
    kernel
        .module_for_keycode(keycode)
        .cloned()
        .ok_or_else(|| KernelError::ModuleNotFound {
            target: keycode.to_string(),
        })
}

/// Permission check embedded in every module.
///
/// Holds the module's own identity; the kernel decides whether that identity
/// is still the current implementation of its keycode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGuard {
    keycode: Keycode,
    address: Address,
}

impl ModuleGuard {
    /// Guard for the module `keycode` living at `address`.
    pub fn new(keycode: Keycode, address: Address) -> Self {
        Self { keycode, address }
    }

    /// Role name.
    pub fn keycode(&self) -> Keycode {
        self.keycode
    }

    /// Module address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Abort unless `caller` holds `operation` on this module.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::PermissionDenied`].
    pub fn require(
        &self,
        kernel: &Kernel,
        caller: &Address,
        operation: &str,
    ) -> Result<(), KernelError> {
        let operation = Operation::new(operation);
        if kernel.require_permission(&self.address, caller, &operation) {
            return Ok(());
        }
        debug!(
            keycode = %self.keycode,
            module = %self.address,
            caller = %caller,
            operation = %operation,
            "permission denied"
        );
        Err(KernelError::PermissionDenied {
            module: self.address.clone(),
            caller: caller.clone(),
            operation,
        })
    }

    /// Abort unless `caller` is the kernel executor.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NotExecutor`].
    pub fn require_executor(&self, kernel: &Kernel, caller: &Address) -> Result<(), KernelError> {
        kernel.ensure_executor(caller)
    }
}
