//! Builder for assembling the state table.

use super::types::{EventKind, StateKey, StateTable, Transition};
use crate::types::{CallStatus, Role};

pub struct StateTableBuilder {
    table: StateTable,
}

impl StateTableBuilder {
    pub fn new() -> Self {
        Self {
            table: StateTable::new(),
        }
    }

    pub fn add_transition(
        &mut self,
        role: Role,
        status: CallStatus,
        event: EventKind,
        transition: Transition,
    ) -> &mut Self {
        self.table
            .insert(StateKey { role, status, event }, transition);
        self
    }

    /// Add the same transition for both caller and callee.
    pub fn add_for_both(
        &mut self,
        status: CallStatus,
        event: EventKind,
        transition: Transition,
    ) -> &mut Self {
        for role in [Role::Caller, Role::Callee] {
            self.table.insert(
                StateKey { role, status, event },
                transition.clone(),
            );
        }
        self
    }

    pub fn build(self) -> StateTable {
        self.table
    }
}
