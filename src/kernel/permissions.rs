//! Deny-by-default permission table.
//!
//! Only granted entries are stored; absence means denied. Keys carry the
//! module generation, so an upgrade makes every older entry unreachable.

use std::collections::BTreeSet;

use crate::types::{Address, Keycode, Operation};

/// One (module generation, caller, operation) triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermissionKey {
    /// Module role.
    pub keycode: Keycode,
    /// Module generation the grant applies to.
    pub generation: u64,
    /// Authorized caller.
    pub caller: Address,
    /// Guarded operation.
    pub operation: Operation,
}

/// Set of granted permission keys.
#[derive(Debug, Default)]
pub struct PermissionTable {
    granted: BTreeSet<PermissionKey>,
}

impl PermissionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant or revoke one entry. Returns `true` if the table changed.
    pub fn set(&mut self, key: PermissionKey, granted: bool) -> bool {
        if granted {
            self.granted.insert(key)
        } else {
            self.granted.remove(&key)
        }
    }

    /// Whether `key` is currently granted.
    pub fn is_granted(&self, key: &PermissionKey) -> bool {
        self.granted.contains(key)
    }

    /// Drop every entry of `keycode` at `generation`. Returns how many were removed.
    pub fn purge_generation(&mut self, keycode: Keycode, generation: u64) -> usize {
        let before = self.granted.len();
        self.granted
            .retain(|key| !(key.keycode == keycode && key.generation == generation));
        before.saturating_sub(self.granted.len())
    }

    /// Drop every entry held by `caller`. Returns how many were removed.
    pub fn revoke_caller(&mut self, caller: &Address) -> usize {
        let before = self.granted.len();
        self.granted.retain(|key| &key.caller != caller);
        before.saturating_sub(self.granted.len())
    }

    /// Entries held by `caller`, in key order.
    pub fn held_by<'a>(&'a self, caller: &'a Address) -> impl Iterator<Item = &'a PermissionKey> {
        self.granted.iter().filter(move |key| &key.caller == caller)
    }

    /// Number of granted entries.
    pub(crate) fn len(&self) -> usize {
        self.granted.len()
    }
}
