//! The channel lifecycle state machine.
//!
//! Eight states, transitions driven only by `Channel` methods (external
//! components query state but never write it). `halt` is distinguished
//! from `stop` by aborting in-flight destination sends rather than
//! draining them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;

/// A state in the channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum ChannelState {
    Stopped,
    Deploying,
    Starting,
    Started,
    Pausing,
    Paused,
    Stopping,
    Undeploying,
}

impl ChannelState {
    const fn code(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Deploying => 1,
            Self::Starting => 2,
            Self::Started => 3,
            Self::Pausing => 4,
            Self::Paused => 5,
            Self::Stopping => 6,
            Self::Undeploying => 7,
        }
    }

    const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Stopped,
            1 => Self::Deploying,
            2 => Self::Starting,
            3 => Self::Started,
            4 => Self::Pausing,
            5 => Self::Paused,
            6 => Self::Stopping,
            _ => Self::Undeploying,
        }
    }

    /// Whether `deploy()` may be called from this state.
    #[must_use]
    pub fn can_deploy(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether `start()` may be called from this state.
    #[must_use]
    pub fn can_start(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether `pause()` may be called from this state.
    #[must_use]
    pub fn can_pause(self) -> bool {
        matches!(self, Self::Started)
    }

    /// Whether `resume()` may be called from this state.
    #[must_use]
    pub fn can_resume(self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Whether `stop()` or `halt()` may be called from this state.
    #[must_use]
    pub fn can_stop_or_halt(self) -> bool {
        !matches!(self, Self::Undeploying)
    }

    /// Whether `undeploy()` may be called from this state.
    #[must_use]
    pub fn can_undeploy(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether this state accepts new inbound messages.
    #[must_use]
    pub fn accepts_messages(self) -> bool {
        matches!(self, Self::Started)
    }
}

/// Raised when a lifecycle method is called from a state that doesn't
/// permit it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid channel state transition: cannot {operation} from {from:?}")]
pub struct StateTransitionError {
    pub from: ChannelState,
    pub operation: &'static str,
}

/// Lock-free holder for a channel's current state. Readers observe the
/// state with a single atomic load; the channel's own lifecycle methods
/// are the only writers.
#[derive(Debug)]
pub struct ChannelStateCell(AtomicU8);

impl ChannelStateCell {
    #[must_use]
    pub fn new(initial: ChannelState) -> Self {
        Self(AtomicU8::new(initial.code()))
    }

    #[must_use]
    pub fn get(&self) -> ChannelState {
        ChannelState::from_code(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ChannelState) {
        self.0.store(state.code(), Ordering::Release);
    }

    /// Transitions from `expected` to `to`, returning an error naming
    /// `operation` if the current state doesn't match `expected`.
    pub fn transition(
        &self,
        expected: impl Fn(ChannelState) -> bool,
        to: ChannelState,
        operation: &'static str,
    ) -> Result<(), StateTransitionError> {
        let current = self.get();
        if !expected(current) {
            return Err(StateTransitionError {
                from: current,
                operation,
            });
        }
        self.set(to);
        Ok(())
    }
}

impl Default for ChannelStateCell {
    fn default() -> Self {
        Self::new(ChannelState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cell_starts_stopped() {
        let cell = ChannelStateCell::default();
        assert_eq!(cell.get(), ChannelState::Stopped);
    }

    #[test]
    fn transition_rejects_invalid_source_state() {
        let cell = ChannelStateCell::new(ChannelState::Paused);
        let result = cell.transition(ChannelState::can_deploy, ChannelState::Deploying, "deploy");
        assert!(result.is_err());
        assert_eq!(cell.get(), ChannelState::Paused);
    }

    #[test]
    fn transition_applies_when_source_state_matches() {
        let cell = ChannelStateCell::new(ChannelState::Stopped);
        cell.transition(ChannelState::can_start, ChannelState::Starting, "start")
            .expect("start from stopped should succeed");
        assert_eq!(cell.get(), ChannelState::Starting);
    }

    #[test]
    fn every_code_round_trips() {
        for state in [
            ChannelState::Stopped,
            ChannelState::Deploying,
            ChannelState::Starting,
            ChannelState::Started,
            ChannelState::Pausing,
            ChannelState::Paused,
            ChannelState::Stopping,
            ChannelState::Undeploying,
        ] {
            assert_eq!(ChannelState::from_code(state.code()), state);
        }
    }
}
