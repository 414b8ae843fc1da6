//! Store lifecycle
//!
//! `Uninitialized -> Ready -> Closed`. `init` and `close` are the only
//! transitions; every other store operation checks for `Ready`.

use std::fmt;

use parking_lot::Mutex;

use crate::error::{PersistenceError, PersistenceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Ready,
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninitialized => f.write_str("uninitialized"),
            LifecycleState::Ready => f.write_str("ready"),
            LifecycleState::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Uninitialized),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Fail with `InvalidState` unless the current state is `expected`
    pub fn ensure(&self, expected: LifecycleState) -> PersistenceResult<()> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(PersistenceError::InvalidState { expected, actual })
        }
    }

    pub fn ensure_ready(&self) -> PersistenceResult<()> {
        self.ensure(LifecycleState::Ready)
    }

    /// Move from `from` to `to` atomically
    pub fn transition(&self, from: LifecycleState, to: LifecycleState) -> PersistenceResult<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(PersistenceError::InvalidState {
                expected: from,
                actual: *state,
            });
        }
        *state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.ensure_ready().is_err());
        lifecycle
            .transition(LifecycleState::Uninitialized, LifecycleState::Ready)
            .unwrap();
        assert!(lifecycle.ensure_ready().is_ok());
        lifecycle
            .transition(LifecycleState::Ready, LifecycleState::Closed)
            .unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Closed);
    }

    #[test]
    fn test_illegal_transition_reports_states() {
        let lifecycle = Lifecycle::new();
        let err = lifecycle
            .transition(LifecycleState::Ready, LifecycleState::Closed)
            .unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::InvalidState {
                expected: LifecycleState::Ready,
                actual: LifecycleState::Uninitialized
            }
        ));
        assert_eq!(err.to_string(), "Store is uninitialized, expected ready");
    }
}
