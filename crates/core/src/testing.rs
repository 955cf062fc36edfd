//! Test support: a plain machine type and a matching factory.
//!
//! Used by unit tests across the workspace and by hosts that want a quick
//! machine implementation in their own tests.

use crate::error::Result;
use crate::machine::{Machine, MachineState};
use crate::types::{BlockLocation, MachineId};
use std::any::Any;

/// A machine that carries its state document verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct TestMachine {
    /// Identifier
    pub id: MachineId,
    /// Type tag
    pub type_tag: String,
    /// Location
    pub location: BlockLocation,
    /// State document
    pub state: MachineState,
}

impl TestMachine {
    /// Create a machine with a fresh id
    pub fn new(type_tag: impl Into<String>, location: BlockLocation, state: MachineState) -> Self {
        Self::with_id(MachineId::new(), type_tag, location, state)
    }

    /// Create a machine with a given id
    pub fn with_id(
        id: MachineId,
        type_tag: impl Into<String>,
        location: BlockLocation,
        state: MachineState,
    ) -> Self {
        Self {
            id,
            type_tag: type_tag.into(),
            location,
            state,
        }
    }

    /// Box this machine
    pub fn boxed(self) -> Box<dyn Machine> {
        Box::new(self)
    }
}

impl Machine for TestMachine {
    fn id(&self) -> MachineId {
        self.id
    }

    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn location(&self) -> &BlockLocation {
        &self.location
    }

    fn state(&self) -> MachineState {
        self.state.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Factory producing [`TestMachine`]s tagged `type_tag`
pub fn factory_for(
    type_tag: &'static str,
) -> impl Fn(BlockLocation, MachineId, MachineState) -> Result<Box<dyn Machine>> {
    move |location, id, state| Ok(TestMachine::with_id(id, type_tag, location, state).boxed())
}
