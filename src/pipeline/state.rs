//! Per-unit state machine.
//!
//! `Pending → Retrieving → Composing → Generating → Materializing → Done`,
//! with `Failed` and `Cancelled` reachable from any non-terminal state.
//! Transitions are strictly forward and terminal states absorb.

use std::fmt;

use serde::Serialize;

use crate::types::{FailureKind, PaperdocError, Result, UnitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    Retrieving,
    Composing,
    Generating,
    Materializing,
    Done,
    Failed(FailureKind),
    Cancelled,
}

impl UnitState {
    /// Position along the forward path
    fn stage(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Retrieving => 1,
            Self::Composing => 2,
            Self::Generating => 3,
            Self::Materializing => 4,
            Self::Done | Self::Failed(_) | Self::Cancelled => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_) | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: UnitState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed(_) | Self::Cancelled => true,
            Self::Done => *self == Self::Materializing,
            _ => next.stage() == self.stage() + 1,
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Retrieving => f.write_str("retrieving"),
            Self::Composing => f.write_str("composing"),
            Self::Generating => f.write_str("generating"),
            Self::Materializing => f.write_str("materializing"),
            Self::Done => f.write_str("done"),
            Self::Failed(kind) => write!(f, "failed:{}", kind),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Tracks one unit through the pipeline
#[derive(Debug)]
pub struct UnitMachine {
    unit: UnitId,
    state: UnitState,
}

impl UnitMachine {
    pub fn new(unit: UnitId) -> Self {
        Self {
            unit,
            state: UnitState::Pending,
        }
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    pub fn advance(&mut self, next: UnitState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(PaperdocError::InvalidTransition {
                unit: self.unit.to_string(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::unit::fixtures;

    fn machine() -> UnitMachine {
        UnitMachine::new(fixtures::unit("a.cpp", "f", "{}").id)
    }

    #[test]
    fn test_happy_path() {
        let mut m = machine();
        for next in [
            UnitState::Retrieving,
            UnitState::Composing,
            UnitState::Generating,
            UnitState::Materializing,
            UnitState::Done,
        ] {
            m.advance(next).unwrap();
        }
        assert!(m.state().is_terminal());
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        let mut m = machine();
        assert!(m.advance(UnitState::Composing).is_err());
        m.advance(UnitState::Retrieving).unwrap();
        m.advance(UnitState::Composing).unwrap();
        assert!(m.advance(UnitState::Retrieving).is_err());
        assert!(m.advance(UnitState::Done).is_err());
    }

    #[test]
    fn test_failed_is_absorbing() {
        let mut m = machine();
        m.advance(UnitState::Retrieving).unwrap();
        m.advance(UnitState::Failed(FailureKind::UnitTooLarge)).unwrap();
        assert!(m.advance(UnitState::Composing).is_err());
        assert!(m.advance(UnitState::Cancelled).is_err());
        assert_eq!(m.state().to_string(), "failed:UnitTooLarge");
    }

    #[test]
    fn test_cancel_from_pending() {
        let mut m = machine();
        m.advance(UnitState::Cancelled).unwrap();
        assert_eq!(m.state(), UnitState::Cancelled);
    }
}
