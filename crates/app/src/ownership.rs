//! Module ownership: which live interaction holds each module id.
//!
//! Shared by the [`Runtime`](crate::runtime::Runtime) and every
//! [`InteractionRuntime`](crate::interaction_runtime::InteractionRuntime) it
//! loads, so every path that spawns a module claims its id under one lock.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use interlink_domain::error::ValidationError;
use interlink_domain::id::{InteractionId, ModuleId};

#[derive(Debug, Clone, Default)]
pub struct ModuleOwners {
    inner: Arc<Mutex<HashMap<ModuleId, InteractionId>>>,
}

impl ModuleOwners {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `owner` as the holder of `module`. Claiming an id the same
    /// owner already holds succeeds.
    ///
    /// # Errors
    ///
    /// [`ValidationError::ModuleAlreadyOwned`] when another interaction holds
    /// the id.
    pub fn claim(&self, module: ModuleId, owner: InteractionId) -> Result<(), ValidationError> {
        match self.lock().entry(module) {
            Entry::Occupied(entry) if *entry.get() != owner => {
                Err(ValidationError::ModuleAlreadyOwned(module.to_string()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(owner);
                Ok(())
            }
        }
    }

    /// Like [`ModuleOwners::claim`] without recording anything.
    ///
    /// # Errors
    ///
    /// [`ValidationError::ModuleAlreadyOwned`] when another interaction holds
    /// the id.
    pub fn check(&self, module: ModuleId, owner: InteractionId) -> Result<(), ValidationError> {
        match self.owner_of(module) {
            Some(current) if current != owner => {
                Err(ValidationError::ModuleAlreadyOwned(module.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Drop the claim on `module` if `owner` holds it.
    pub fn release(&self, module: ModuleId, owner: InteractionId) {
        let mut owners = self.lock();
        if owners.get(&module) == Some(&owner) {
            owners.remove(&module);
        }
    }

    #[must_use]
    pub fn owner_of(&self, module: ModuleId) -> Option<InteractionId> {
        self.lock().get(&module).copied()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ModuleId, InteractionId>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
