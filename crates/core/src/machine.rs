//! Machine abstraction and factory seam
//!
//! A machine is a stateful object bound to one block. Storage never looks
//! inside a machine: it reads the id, type tag, location and an opaque state
//! document, and rebuilds machines through a [`MachineFactory`] looked up by
//! type tag.

use crate::error::Result;
use crate::types::{BlockLocation, MachineId};
use std::any::Any;
use std::fmt;

/// Opaque, self-describing machine state.
///
/// Each machine type decides its own layout; storage only round-trips it.
pub type MachineState = serde_json::Value;

/// A stateful, identifiable, location-bound object.
pub trait Machine: fmt::Debug {
    /// Stable identifier, assigned at creation
    fn id(&self) -> MachineId;

    /// Tag naming the factory that rebuilds this machine
    fn type_tag(&self) -> &str;

    /// Block the machine believes it occupies
    fn location(&self) -> &BlockLocation;

    /// Snapshot of the machine's state for persistence
    fn state(&self) -> MachineState;

    /// Access to the concrete type
    fn as_any(&self) -> &dyn Any;

    /// Mutable access to the concrete type, for in-place updates
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Rebuilds a machine from its persisted parts.
///
/// Any `Fn(BlockLocation, MachineId, MachineState) -> Result<Box<dyn Machine>>`
/// is a factory, so registration usually takes a closure or a constructor fn.
pub trait MachineFactory {
    /// Create a machine at `location` with the given id and state
    fn create(
        &self,
        location: BlockLocation,
        id: MachineId,
        state: MachineState,
    ) -> Result<Box<dyn Machine>>;
}

impl<F> MachineFactory for F
where
    F: Fn(BlockLocation, MachineId, MachineState) -> Result<Box<dyn Machine>>,
{
    fn create(
        &self,
        location: BlockLocation,
        id: MachineId,
        state: MachineState,
    ) -> Result<Box<dyn Machine>> {
        self(location, id, state)
    }
}

/// Resolves a type tag to the factory registered for it.
pub trait FactoryLookup {
    /// Returns None when nothing is registered for `type_tag`
    fn resolve(&self, type_tag: &str) -> Option<&dyn MachineFactory>;
}
