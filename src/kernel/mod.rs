//! Kernel: module registry, permission table and the executor.
//!
//! The kernel is the only writer of registry and permission state. Modules
//! consult it through [`Kernel::require_permission`] before every guarded
//! operation; the executor changes it through [`Kernel::execute_action`],
//! [`Kernel::set_module_permission`] and [`Kernel::grant_requested`].
//!
//! Every admin call validates completely before it writes, so a rejected
//! call leaves no partial state behind.

pub mod permissions;
pub mod registry;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audit::{AuditLogger, ProtocolEvent};
use crate::error::ErrorKind;
use crate::module::{Module, PermissionRequest, Policy};
use crate::types::{Address, CallContext, Keycode, Operation};

use self::permissions::{PermissionKey, PermissionTable};
use self::registry::{ModuleRegistry, RegistryEntry};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Kernel-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// Admin call from someone other than the executor.
    #[error("{caller} is not the executor")]
    NotExecutor {
        /// Rejected caller.
        caller: Address,
    },
    /// Install of a keycode that is already registered.
    #[error("module {keycode} is already installed")]
    ModuleAlreadyInstalled {
        /// Registered keycode.
        keycode: Keycode,
    },
    /// Reference to an unregistered keycode or address.
    #[error("module not found: {target}")]
    ModuleNotFound {
        /// Keycode or address that did not resolve.
        target: String,
    },
    /// Caller lacks the (module, operation) permission.
    #[error("{caller} may not call {operation} on module {module}")]
    PermissionDenied {
        /// Module address the call targeted.
        module: Address,
        /// Rejected caller.
        caller: Address,
        /// Guarded operation.
        operation: Operation,
    },
    /// Activation of a policy that is already active.
    #[error("policy {policy} is already active")]
    PolicyAlreadyActive {
        /// Policy address.
        policy: Address,
    },
    /// Deactivation or grant for a policy that is not active.
    #[error("policy {policy} is not active")]
    PolicyNotActive {
        /// Policy address.
        policy: Address,
    },
    /// Malformed action target.
    #[error("invalid action target: {reason}")]
    InvalidTarget {
        /// What was wrong.
        reason: String,
    },
    /// The kernel handed over to a successor.
    #[error("kernel retired in favour of {successor}")]
    Retired {
        /// Successor kernel.
        successor: Address,
    },
}

impl KernelError {
    /// Caller-visible failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotExecutor { .. } => ErrorKind::NotExecutor,
            Self::ModuleAlreadyInstalled { .. } => ErrorKind::ModuleAlreadyInstalled,
            Self::ModuleNotFound { .. } => ErrorKind::ModuleNotFound,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::PolicyAlreadyActive { .. } | Self::InvalidTarget { .. } => {
                ErrorKind::InvalidInput
            }
            Self::PolicyNotActive { .. } => ErrorKind::PolicyInactive,
            Self::Retired { .. } => ErrorKind::KernelRetired,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Privileged lifecycle change, submitted through [`Kernel::execute_action`].
pub enum Action<'a> {
    /// Register a new module at generation 0.
    InstallModule(&'a mut dyn Module),
    /// Replace the implementation behind an existing keycode.
    UpgradeModule(&'a mut dyn Module),
    /// Add a policy to the active set.
    ActivatePolicy(&'a mut dyn Policy),
    /// Remove a policy from the active set and revoke its permissions.
    DeactivatePolicy(&'a mut dyn Policy),
    /// Hand executor rights to another address.
    ChangeExecutor(Address),
    /// Retire this kernel in favour of a successor.
    MigrateKernel(Address),
}

impl Action<'_> {
    /// Discriminant used in logs.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::InstallModule(_) => ActionKind::InstallModule,
            Self::UpgradeModule(_) => ActionKind::UpgradeModule,
            Self::ActivatePolicy(_) => ActionKind::ActivatePolicy,
            Self::DeactivatePolicy(_) => ActionKind::DeactivatePolicy,
            Self::ChangeExecutor(_) => ActionKind::ChangeExecutor,
            Self::MigrateKernel(_) => ActionKind::MigrateKernel,
        }
    }
}

/// Payload-free [`Action`] discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// [`Action::InstallModule`].
    InstallModule,
    /// [`Action::UpgradeModule`].
    UpgradeModule,
    /// [`Action::ActivatePolicy`].
    ActivatePolicy,
    /// [`Action::DeactivatePolicy`].
    DeactivatePolicy,
    /// [`Action::ChangeExecutor`].
    ChangeExecutor,
    /// [`Action::MigrateKernel`].
    MigrateKernel,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InstallModule => "install_module",
            Self::UpgradeModule => "upgrade_module",
            Self::ActivatePolicy => "activate_policy",
            Self::DeactivatePolicy => "deactivate_policy",
            Self::ChangeExecutor => "change_executor",
            Self::MigrateKernel => "migrate_kernel",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

/// Capability kernel.
#[derive(Debug)]
pub struct Kernel {
    executor: Address,
    registry: ModuleRegistry,
    permissions: PermissionTable,
    active_policies: BTreeSet<Address>,
    pending_requests: BTreeMap<Address, Vec<PermissionRequest>>,
    successor: Option<Address>,
    audit: Arc<AuditLogger>,
}

impl Kernel {
    /// Fresh kernel with `executor` as the only privileged identity.
    pub fn new(executor: Address, audit: Arc<AuditLogger>) -> Self {
        Self {
            executor,
            registry: ModuleRegistry::new(),
            permissions: PermissionTable::new(),
            active_policies: BTreeSet::new(),
            pending_requests: BTreeMap::new(),
            successor: None,
            audit,
        }
    }

    /// Apply one lifecycle action.
    ///
    /// # Errors
    ///
    /// - [`KernelError::Retired`] after a migration.
    /// - [`KernelError::NotExecutor`] unless `ctx.caller` is the executor.
    /// - Lifecycle errors per action; none of them leave partial state.
    pub fn execute_action(
        &mut self,
        ctx: &CallContext,
        action: Action<'_>,
    ) -> Result<(), KernelError> {
        let kind = action.kind();
        let result = self.dispatch(ctx, action);
        if let Err(e) = &result {
            warn!(action = %kind, caller = %ctx.caller, error = %e, "kernel action rejected");
        }
        result
    }

    fn dispatch(&mut self, ctx: &CallContext, action: Action<'_>) -> Result<(), KernelError> {
        self.ensure_live()?;
        self.ensure_executor(&ctx.caller)?;
        match action {
            Action::InstallModule(module) => self.install(ctx, module),
            Action::UpgradeModule(module) => self.upgrade(ctx, module),
            Action::ActivatePolicy(policy) => self.activate(ctx, policy),
            Action::DeactivatePolicy(policy) => self.deactivate(ctx, policy),
            Action::ChangeExecutor(next) => self.change_executor(ctx, next),
            Action::MigrateKernel(successor) => self.migrate(ctx, successor),
        }
    }

    /// Grant or revoke one permission on a module's current generation.
    ///
    /// `module` is the module's current address.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NotExecutor`], [`KernelError::Retired`],
    /// [`KernelError::InvalidTarget`] for an empty caller, or
    /// [`KernelError::ModuleNotFound`] if `module` is not a current implementation.
    pub fn set_module_permission(
        &mut self,
        ctx: &CallContext,
        module: &Address,
        caller: &Address,
        operation: &Operation,
        granted: bool,
    ) -> Result<(), KernelError> {
        self.ensure_live()?;
        self.ensure_executor(&ctx.caller)?;
        if caller.is_empty() {
            return Err(KernelError::invalid("permission caller is empty"));
        }
        let keycode = self
            .registry
            .keycode_of(module)
            .ok_or_else(|| KernelError::ModuleNotFound {
                target: module.to_string(),
            })?;
        let generation = self.current_generation(keycode)?;
        self.write_permission(ctx, keycode, generation, caller, operation, granted);
        Ok(())
    }

    /// Grant every permission an active policy asked for on activation.
    ///
    /// Grants are written against current generations, so a policy that
    /// activated before an upgrade is re-authorized for the new instance.
    /// Returns the number of entries written.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NotExecutor`], [`KernelError::Retired`],
    /// [`KernelError::PolicyNotActive`], or [`KernelError::ModuleNotFound`] if
    /// a requested keycode is no longer installed (nothing is written then).
    pub fn grant_requested(
        &mut self,
        ctx: &CallContext,
        policy: &Address,
    ) -> Result<usize, KernelError> {
        self.ensure_live()?;
        self.ensure_executor(&ctx.caller)?;
        if !self.active_policies.contains(policy) {
            return Err(KernelError::PolicyNotActive {
                policy: policy.clone(),
            });
        }
        let requests = self
            .pending_requests
            .get(policy)
            .cloned()
            .unwrap_or_default();

        let mut resolved = Vec::with_capacity(requests.len());
        for request in &requests {
            let generation = self.current_generation(request.keycode)?;
            resolved.push((request.keycode, generation, &request.operation));
        }
        for (keycode, generation, operation) in &resolved {
            self.write_permission(ctx, *keycode, *generation, policy, operation, true);
        }
        info!(policy = %policy, granted = resolved.len(), "granted requested permissions");
        Ok(resolved.len())
    }

    /// Whether `caller` may run `operation` on the module at `module`.
    ///
    /// Pure read. `false` unless `module` is the *current* implementation of
    /// a registered keycode and the entry for that keycode's current
    /// generation is granted. Always `false` once the kernel has migrated.
    pub fn require_permission(
        &self,
        module: &Address,
        caller: &Address,
        operation: &Operation,
    ) -> bool {
        if self.successor.is_some() {
            return false;
        }
        let Some(keycode) = self.registry.keycode_of(module) else {
            debug!(module = %module, "permission check against non-current module");
            return false;
        };
        self.module_permission(keycode, caller, operation)
    }

    /// Granted flag for `keycode`'s current generation.
    pub fn module_permission(
        &self,
        keycode: Keycode,
        caller: &Address,
        operation: &Operation,
    ) -> bool {
        let Some(entry) = self.registry.get(&keycode) else {
            return false;
        };
        self.permissions.is_granted(&PermissionKey {
            keycode,
            generation: entry.generation,
            caller: caller.clone(),
            operation: operation.clone(),
        })
    }

    /// Fail unless `caller` is the current executor.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NotExecutor`].
    pub fn ensure_executor(&self, caller: &Address) -> Result<(), KernelError> {
        if caller == &self.executor {
            Ok(())
        } else {
            Err(KernelError::NotExecutor {
                caller: caller.clone(),
            })
        }
    }

    // -- queries ------------------------------------------------------------

    /// Current executor.
    pub fn executor(&self) -> &Address {
        &self.executor
    }

    /// Current implementation address for `keycode`.
    pub fn module_for_keycode(&self, keycode: Keycode) -> Option<&Address> {
        self.registry.get(&keycode).map(|entry| &entry.address)
    }

    /// Current generation for `keycode`.
    pub fn generation(&self, keycode: Keycode) -> Option<u64> {
        self.registry.get(&keycode).map(|entry| entry.generation)
    }

    /// Keycode whose current implementation is `address`.
    pub fn keycode_of(&self, address: &Address) -> Option<Keycode> {
        self.registry.keycode_of(address)
    }

    /// Whether `policy` is in the active set.
    pub fn is_policy_active(&self, policy: &Address) -> bool {
        self.active_policies.contains(policy)
    }

    /// Permissions `policy` asked for on activation.
    pub fn pending_requests(&self, policy: &Address) -> &[PermissionRequest] {
        self.pending_requests
            .get(policy)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Successor kernel, once migrated.
    pub fn successor(&self) -> Option<&Address> {
        self.successor.as_ref()
    }

    /// Installed modules in keycode order.
    pub fn modules(&self) -> impl Iterator<Item = (&Keycode, &RegistryEntry)> {
        self.registry.iter()
    }

    /// Number of installed keycodes.
    pub fn module_count(&self) -> usize {
        self.registry.len()
    }

    /// Permission entries currently granted to `caller`.
    pub fn permissions_held_by<'a>(
        &'a self,
        caller: &'a Address,
    ) -> impl Iterator<Item = &'a PermissionKey> + 'a {
        self.permissions.held_by(caller)
    }

    /// Number of granted permission entries.
    pub fn permission_count(&self) -> usize {
        self.permissions.len()
    }

    /// Shared audit sink.
    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    // -- actions ------------------------------------------------------------

    fn install(&mut self, ctx: &CallContext, module: &mut dyn Module) -> Result<(), KernelError> {
        let keycode = module.keycode();
        let address = module.address().clone();
        if address.is_empty() {
            return Err(KernelError::invalid("module address is empty"));
        }
        if self.registry.get(&keycode).is_some() {
            return Err(KernelError::ModuleAlreadyInstalled { keycode });
        }
        if let Some(other) = self.registry.keycode_of(&address) {
            return Err(KernelError::invalid(format!(
                "address {address} is already installed as {other}"
            )));
        }
        if self.registry.is_retired(&address) {
            return Err(KernelError::invalid(format!(
                "address {address} was superseded and cannot be reused"
            )));
        }

        module.init(ctx);
        self.registry.install(keycode, address.clone());

        info!(keycode = %keycode, address = %address, "module installed");
        self.audit
            .emit(ctx.now, ProtocolEvent::ModuleInstalled { keycode, address });
        Ok(())
    }

    fn upgrade(&mut self, ctx: &CallContext, module: &mut dyn Module) -> Result<(), KernelError> {
        let keycode = module.keycode();
        let address = module.address().clone();
        if address.is_empty() {
            return Err(KernelError::invalid("module address is empty"));
        }
        let current = self
            .registry
            .get(&keycode)
            .ok_or_else(|| KernelError::ModuleNotFound {
                target: keycode.to_string(),
            })?;
        if current.address == address {
            return Err(KernelError::invalid(format!(
                "{keycode} is already implemented by {address}"
            )));
        }
        if let Some(other) = self.registry.keycode_of(&address) {
            return Err(KernelError::invalid(format!(
                "address {address} is already installed as {other}"
            )));
        }
        if self.registry.is_retired(&address) {
            return Err(KernelError::invalid(format!(
                "address {address} was superseded and cannot be reused"
            )));
        }
        if current.generation == u64::MAX {
            return Err(KernelError::invalid(format!(
                "{keycode} generation counter exhausted"
            )));
        }

        module.init(ctx);
        let previous = self
            .registry
            .upgrade(keycode, address.clone())
            .ok_or_else(|| KernelError::ModuleNotFound {
                target: keycode.to_string(),
            })?;
        let revoked = self
            .permissions
            .purge_generation(keycode, previous.generation);
        let generation = self.current_generation(keycode)?;

        info!(
            keycode = %keycode,
            previous = %previous.address,
            address = %address,
            generation,
            revoked,
            "module upgraded"
        );
        self.audit.emit(
            ctx.now,
            ProtocolEvent::ModuleUpgraded {
                keycode,
                previous: previous.address,
                address,
                generation,
                revoked_permissions: revoked,
            },
        );
        Ok(())
    }

    fn activate(&mut self, ctx: &CallContext, policy: &mut dyn Policy) -> Result<(), KernelError> {
        let address = policy.address().clone();
        if address.is_empty() {
            return Err(KernelError::invalid("policy address is empty"));
        }
        if self.active_policies.contains(&address) {
            return Err(KernelError::PolicyAlreadyActive { policy: address });
        }

        let requests = policy.configure_dependencies(self)?;
        policy.on_activation(true);

        let requested = requests.len();
        self.active_policies.insert(address.clone());
        self.pending_requests.insert(address.clone(), requests);

        info!(policy = %address, requested, "policy activated");
        self.audit.emit(
            ctx.now,
            ProtocolEvent::PolicyActivated {
                policy: address,
                requested_permissions: requested,
            },
        );
        Ok(())
    }

    fn deactivate(
        &mut self,
        ctx: &CallContext,
        policy: &mut dyn Policy,
    ) -> Result<(), KernelError> {
        let address = policy.address().clone();
        if !self.active_policies.contains(&address) {
            return Err(KernelError::PolicyNotActive { policy: address });
        }

        policy.on_activation(false);
        self.active_policies.remove(&address);
        self.pending_requests.remove(&address);
        let revoked = self.permissions.revoke_caller(&address);

        info!(policy = %address, revoked, "policy deactivated");
        self.audit.emit(
            ctx.now,
            ProtocolEvent::PolicyDeactivated {
                policy: address,
                revoked_permissions: revoked,
            },
        );
        Ok(())
    }

    fn change_executor(&mut self, ctx: &CallContext, next: Address) -> Result<(), KernelError> {
        if next.is_empty() {
            return Err(KernelError::invalid("executor address is empty"));
        }
        let previous = std::mem::replace(&mut self.executor, next.clone());

        info!(previous = %previous, executor = %next, "executor changed");
        self.audit.emit(
            ctx.now,
            ProtocolEvent::ExecutorChanged {
                previous,
                executor: next,
            },
        );
        Ok(())
    }

    fn migrate(&mut self, ctx: &CallContext, successor: Address) -> Result<(), KernelError> {
        if successor.is_empty() {
            return Err(KernelError::invalid("successor kernel address is empty"));
        }
        self.successor = Some(successor.clone());

        warn!(successor = %successor, "kernel migrated; admin surface is now closed");
        self.audit
            .emit(ctx.now, ProtocolEvent::KernelMigrated { successor });
        Ok(())
    }

    // -- helpers ------------------------------------------------------------

    fn ensure_live(&self) -> Result<(), KernelError> {
        match &self.successor {
            Some(successor) => Err(KernelError::Retired {
                successor: successor.clone(),
            }),
            None => Ok(()),
        }
    }

    fn current_generation(&self, keycode: Keycode) -> Result<u64, KernelError> {
        self.generation(keycode)
            .ok_or_else(|| KernelError::ModuleNotFound {
                target: keycode.to_string(),
            })
    }

    fn write_permission(
        &mut self,
        ctx: &CallContext,
        keycode: Keycode,
        generation: u64,
        caller: &Address,
        operation: &Operation,
        granted: bool,
    ) {
        self.permissions.set(
            PermissionKey {
                keycode,
                generation,
                caller: caller.clone(),
                operation: operation.clone(),
            },
            granted,
        );
        info!(
            keycode = %keycode,
            generation,
            caller = %caller,
            operation = %operation,
            granted,
            "permission updated"
        );
        self.audit.emit(
            ctx.now,
            ProtocolEvent::PermissionUpdated {
                keycode,
                generation,
                caller: caller.clone(),
                operation: operation.clone(),
                granted,
            },
        );
    }
}
