//! Keycode → implementation registry.
//!
//! Entries are created on install and replaced on upgrade; they are never
//! removed. A reverse index from address to keycode only covers *current*
//! implementations, so a superseded module instance resolves to nothing.
//! Superseded addresses are remembered and may never be registered again.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::types::{Address, Keycode};

/// Current implementation of one logical module role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    /// Implementation address.
    pub address: Address,
    /// Upgrade counter, 0 at install.
    pub generation: u64,
}

/// Registry of installed modules.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    by_keycode: BTreeMap<Keycode, RegistryEntry>,
    by_address: HashMap<Address, Keycode>,
    retired: BTreeSet<Address>,
}

impl ModuleRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for a keycode, if installed.
    pub fn get(&self, keycode: &Keycode) -> Option<&RegistryEntry> {
        self.by_keycode.get(keycode)
    }

    /// Keycode whose *current* implementation lives at `address`.
    pub fn keycode_of(&self, address: &Address) -> Option<Keycode> {
        self.by_address.get(address).copied()
    }

    /// Whether `address` once implemented a keycode and was upgraded away.
    pub fn is_retired(&self, address: &Address) -> bool {
        self.retired.contains(address)
    }

    /// Record a fresh install at generation 0.
    ///
    /// Callers must have checked that neither the keycode nor the address is
    /// taken and that the address is not retired.
    pub(crate) fn install(&mut self, keycode: Keycode, address: Address) {
        self.by_address.insert(address.clone(), keycode);
        self.by_keycode.insert(
            keycode,
            RegistryEntry {
                address,
                generation: 0,
            },
        );
    }

    /// Swap in a new implementation and bump the generation.
    ///
    /// Returns the replaced entry, or `None` if the keycode is not installed
    /// or the generation counter is exhausted.
    pub(crate) fn upgrade(&mut self, keycode: Keycode, address: Address) -> Option<RegistryEntry> {
        let entry = self.by_keycode.get_mut(&keycode)?;
        let generation = entry.generation.checked_add(1)?;
        let previous = std::mem::replace(
            entry,
            RegistryEntry {
                address: address.clone(),
                generation,
            },
        );
        self.by_address.remove(&previous.address);
        self.by_address.insert(address, keycode);
        self.retired.insert(previous.address.clone());
        Some(previous)
    }

    /// Iterate installed modules in keycode order.
    pub fn iter(&self) -> impl Iterator<Item = (&Keycode, &RegistryEntry)> {
        self.by_keycode.iter()
    }

    /// Number of installed keycodes.
    pub(crate) fn len(&self) -> usize {
        self.by_keycode.len()
    }
}
