//! Machine type registry
//!
//! The registry maps type tags to the factories that rebuild machines from
//! their persisted records. Only explicitly registered tags can be
//! materialized; anything else is rejected with `UnknownType` when a chunk
//! loads.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut registry = MachineRegistry::new();
//!
//! registry.register("furnace", |location, id, state| {
//!     Ok(Box::new(Furnace::restore(location, id, state)?) as Box<dyn Machine>)
//! })?;
//!
//! assert!(registry.is_registered("furnace"));
//! ```

use machinestore_core::{Error, FactoryLookup, MachineFactory, Result};
use std::collections::HashMap;

/// Registry of machine factories keyed by type tag
pub struct MachineRegistry {
    factories: HashMap<String, Box<dyn MachineFactory>>,
}

impl MachineRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        MachineRegistry {
            factories: HashMap::new(),
        }
    }

    /// Register a factory for `type_tag`
    ///
    /// Fails if the tag is empty or already registered. Replacing a factory
    /// requires an explicit [`unregister`](Self::unregister) first.
    pub fn register<F>(&mut self, type_tag: impl Into<String>, factory: F) -> Result<()>
    where
        F: MachineFactory + 'static,
    {
        let type_tag = type_tag.into();
        if type_tag.is_empty() {
            return Err(Error::precondition("machine type tag must not be empty"));
        }
        if self.factories.contains_key(&type_tag) {
            return Err(Error::precondition(format!(
                "machine type {:?} is already registered",
                type_tag
            )));
        }
        self.factories.insert(type_tag, Box::new(factory));
        Ok(())
    }

    /// Remove the factory for `type_tag`
    pub fn unregister(&mut self, type_tag: &str) -> Option<Box<dyn MachineFactory>> {
        self.factories.remove(type_tag)
    }

    /// Check if a type tag is registered
    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.factories.contains_key(type_tag)
    }

    /// Get all registered type tags, sorted
    pub fn type_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Get the number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Clear all registered factories
    pub fn clear(&mut self) {
        self.factories.clear();
    }
}

impl Default for MachineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryLookup for MachineRegistry {
    fn resolve(&self, type_tag: &str) -> Option<&dyn MachineFactory> {
        self.factories.get(type_tag).map(|f| f.as_ref())
    }
}

impl std::fmt::Debug for MachineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineRegistry")
            .field("factory_count", &self.factories.len())
            .field("type_tags", &self.type_tags())
            .finish()
    }
}
