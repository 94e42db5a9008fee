//! MESI coherence state machine.
//!
//! Five event handlers, each yielding the next state and whether a
//! writeback must be issued before the transition completes. Each instance
//! tracks per-transition counts for reporting (`Modified -> Shared` etc.).

use std::collections::HashMap;
use std::fmt;

use crate::error::SimulationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoherenceState {
    Invalid,
    Shared,
    Exclusive,
    Modified,
}

impl fmt::Display for CoherenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoherenceState::Invalid => "Invalid",
            CoherenceState::Shared => "Shared",
            CoherenceState::Exclusive => "Exclusive",
            CoherenceState::Modified => "Modified",
        };
        write!(f, "{s}")
    }
}

/// Coherence events a block can observe. "Local" events originate from the
/// core owning this cache level; "remote" events originate from another
/// core's access to the same block, observed through the interconnect
/// interface (out of scope for this crate beyond this enum).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoherenceEvent {
    LocalReadShared,
    LocalReadExclusive,
    LocalWrite,
    RemoteRead,
    RemoteWriteOrInvalidate,
    Eviction,
}

/// Outcome of applying an event: the next state and whether the level must
/// push the block's data to the next level before transitioning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next_state: CoherenceState,
    pub writeback_required: bool,
}

/// Per-instance MESI machine: applies events to a given current state and
/// accumulates transition counts for reporting.
#[derive(Debug, Default)]
pub struct MesiMachine {
    transition_counts: HashMap<(CoherenceState, CoherenceState), u64>,
}

impl MesiMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `event` to a block currently in `state`. Returns the
    /// transition, or a [`SimulationError`] if the event is not defined for
    /// that state (an impossible combination, per the design notes table).
    pub fn apply(
        &mut self,
        state: CoherenceState,
        event: CoherenceEvent,
    ) -> Result<Transition, SimulationError> {
        use CoherenceEvent::*;
        use CoherenceState::*;

        let transition = match (state, event) {
            (Invalid, LocalReadShared) => Transition {
                next_state: Shared,
                writeback_required: false,
            },
            (Invalid, LocalReadExclusive) => Transition {
                next_state: Exclusive,
                writeback_required: false,
            },
            (Invalid, LocalWrite) => Transition {
                next_state: Modified,
                writeback_required: false,
            },
            (Invalid, Eviction) => Transition {
                next_state: Invalid,
                writeback_required: false,
            },

            (Shared, LocalWrite) => Transition {
                next_state: Modified,
                writeback_required: false,
            },
            (Shared, RemoteWriteOrInvalidate) => Transition {
                next_state: Invalid,
                writeback_required: false,
            },
            (Shared, Eviction) => Transition {
                next_state: Invalid,
                writeback_required: false,
            },

            (Exclusive, LocalWrite) => Transition {
                next_state: Modified,
                writeback_required: false,
            },
            (Exclusive, RemoteRead) => Transition {
                next_state: Shared,
                writeback_required: false,
            },
            (Exclusive, RemoteWriteOrInvalidate) => Transition {
                next_state: Invalid,
                writeback_required: false,
            },
            (Exclusive, Eviction) => Transition {
                next_state: Invalid,
                writeback_required: false,
            },

            (Modified, RemoteRead) => Transition {
                next_state: Shared,
                writeback_required: true,
            },
            (Modified, RemoteWriteOrInvalidate) => Transition {
                next_state: Invalid,
                writeback_required: true,
            },
            (Modified, Eviction) => Transition {
                next_state: Invalid,
                writeback_required: true,
            },

            (from, event) => {
                return Err(SimulationError::ImpossibleCoherenceTransition {
                    event: format!("{event:?}"),
                    from: format!("{from:?}"),
                })
            }
        };

        *self
            .transition_counts
            .entry((state, transition.next_state))
            .or_insert(0) += 1;

        Ok(transition)
    }

    pub fn transition_count(&self, from: CoherenceState, to: CoherenceState) -> u64 {
        self.transition_counts.get(&(from, to)).copied().unwrap_or(0)
    }

    pub fn total_transitions(&self) -> u64 {
        self.transition_counts.values().sum()
    }

    pub fn transition_counts(&self) -> impl Iterator<Item = (CoherenceState, CoherenceState, u64)> + '_ {
        self.transition_counts
            .iter()
            .map(|(&(from, to), &count)| (from, to, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_downgrades_on_remote_read() {
        let mut mesi = MesiMachine::new();
        let t = mesi
            .apply(CoherenceState::Modified, CoherenceEvent::RemoteRead)
            .unwrap();
        assert_eq!(t.next_state, CoherenceState::Shared);
        assert!(t.writeback_required);
        assert_eq!(
            mesi.transition_count(CoherenceState::Modified, CoherenceState::Shared),
            1
        );
    }

    #[test]
    fn shared_invalidated_on_remote_write_no_writeback() {
        let mut mesi = MesiMachine::new();
        let t = mesi
            .apply(CoherenceState::Shared, CoherenceEvent::RemoteWriteOrInvalidate)
            .unwrap();
        assert_eq!(t.next_state, CoherenceState::Invalid);
        assert!(!t.writeback_required);
    }

    #[test]
    fn modified_eviction_requires_writeback() {
        let mut mesi = MesiMachine::new();
        let t = mesi.apply(CoherenceState::Modified, CoherenceEvent::Eviction).unwrap();
        assert_eq!(t.next_state, CoherenceState::Invalid);
        assert!(t.writeback_required);
    }

    #[test]
    fn invalid_eviction_is_noop() {
        let mut mesi = MesiMachine::new();
        let t = mesi.apply(CoherenceState::Invalid, CoherenceEvent::Eviction).unwrap();
        assert_eq!(t.next_state, CoherenceState::Invalid);
        assert!(!t.writeback_required);
    }

    #[test]
    fn impossible_transition_errors() {
        let mut mesi = MesiMachine::new();
        let err = mesi.apply(CoherenceState::Invalid, CoherenceEvent::RemoteRead);
        assert!(err.is_err());
    }

    #[test]
    fn local_write_always_goes_modified() {
        let mut mesi = MesiMachine::new();
        for start in [
            CoherenceState::Invalid,
            CoherenceState::Shared,
            CoherenceState::Exclusive,
        ] {
            let t = mesi.apply(start, CoherenceEvent::LocalWrite).unwrap();
            assert_eq!(t.next_state, CoherenceState::Modified);
        }
    }
}
