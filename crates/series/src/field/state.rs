//! Named delta-state registry shared by the fields of one codec.

use crate::error::{Result, SeriesError};
use std::collections::HashMap;

/// Registry of named running-state slots.
///
/// Every scaled-delta field owns one slot. Slots are allocated while a field
/// tree is frozen; two fields claiming the same state name is a
/// configuration error. The running values themselves live in the codec
/// session (see [`crate::field::DynamicSerializer`]) and are indexed by slot.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    slots: HashMap<String, usize>,
    names: Vec<String>,
}

impl StateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the slot for `name`.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Configuration` when the name is empty or
    /// already taken.
    pub fn register(&mut self, name: &str) -> Result<usize> {
        if name.is_empty() {
            return Err(SeriesError::Configuration(
                "state variable name must not be empty".to_string(),
            ));
        }
        if self.slots.contains_key(name) {
            return Err(SeriesError::Configuration(format!(
                "state variable '{name}' is claimed by more than one field"
            )));
        }
        let slot = self.names.len();
        self.slots.insert(name.to_string(), slot);
        self.names.push(name.to_string());
        Ok(slot)
    }

    /// Returns the slot of `name`, if registered.
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    /// Returns the name of `slot`.
    pub fn name(&self, slot: usize) -> Option<&str> {
        self.names.get(slot).map(String::as_str)
    }

    /// Returns the number of registered slots.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true when no slot is registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
