//! Table-driven call lifecycle: transitions as data, looked up by
//! (role, status, event) and executed by the state machine.

pub mod builder;
pub mod tables;
pub mod types;

pub use builder::StateTableBuilder;
pub use types::*;

use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    /// The master state table - single source of truth for all transitions.
    pub static ref MASTER_TABLE: Arc<StateTable> = Arc::new(build_master_table());
}

fn build_master_table() -> StateTable {
    let mut builder = StateTableBuilder::new();
    tables::add_ringing_transitions(&mut builder);
    tables::add_accepted_transitions(&mut builder);

    let table = builder.build();
    if let Err(errors) = table.validate() {
        panic!("invalid master state table: {:?}", errors);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallStatus, Role};

    #[test]
    fn master_table_validates() {
        assert!(MASTER_TABLE.validate().is_ok());
        assert!(MASTER_TABLE.transition_count() > 0);
    }

    #[test]
    fn accept_is_callee_only() {
        assert!(MASTER_TABLE.has_transition(&StateKey {
            role: Role::Callee,
            status: CallStatus::Ringing,
            event: EventKind::Accept,
        }));
        assert!(!MASTER_TABLE.has_transition(&StateKey {
            role: Role::Caller,
            status: CallStatus::Ringing,
            event: EventKind::Accept,
        }));
    }

    #[test]
    fn cancel_is_caller_only() {
        assert!(MASTER_TABLE.has_transition(&StateKey {
            role: Role::Caller,
            status: CallStatus::Ringing,
            event: EventKind::Cancel,
        }));
        assert!(!MASTER_TABLE.has_transition(&StateKey {
            role: Role::Callee,
            status: CallStatus::Ringing,
            event: EventKind::Cancel,
        }));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for status in [
            CallStatus::Declined,
            CallStatus::Cancelled,
            CallStatus::Expired,
            CallStatus::Ended,
        ] {
            for role in [Role::Caller, Role::Callee] {
                for event in [
                    EventKind::Accept,
                    EventKind::Decline,
                    EventKind::Cancel,
                    EventKind::Expire,
                    EventKind::Hangup,
                    EventKind::Upgrade,
                    EventKind::RemoteAccepted,
                    EventKind::RemoteDeclined,
                    EventKind::RemoteHangup,
                ] {
                    assert!(!MASTER_TABLE.has_transition(&StateKey {
                        role,
                        status,
                        event
                    }));
                }
            }
        }
    }
}
