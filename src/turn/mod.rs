//! Floor ownership
//!
//! [`FloorState`] says who may use audio right now. Only the
//! [`TurnCoordinator`] changes it; everyone else reads it through
//! [`SharedFloor`].

pub mod coordinator;

pub use coordinator::{CaptureSignal, FloorEvents, ListenOutcome, SpeechEvent, TurnCoordinator};

use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FloorState {
    /// Nobody holds the floor
    #[default]
    Idle,
    /// Candidate's turn; capture is open (or typed input in text mode)
    Listening,
    /// Agent audio is playing
    Speaking,
    /// Agent audio is buffered until the user enables output
    PendingUnlock,
}

impl FloorState {
    pub fn is_idle(&self) -> bool {
        matches!(self, FloorState::Idle)
    }

    pub fn is_listening(&self) -> bool {
        matches!(self, FloorState::Listening)
    }

    /// The agent holds the floor, audible or not
    pub fn agent_holds(&self) -> bool {
        matches!(self, FloorState::Speaking | FloorState::PendingUnlock)
    }
}

impl std::fmt::Display for FloorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FloorState::Idle => write!(f, "Idle"),
            FloorState::Listening => write!(f, "Listening"),
            FloorState::Speaking => write!(f, "Speaking"),
            FloorState::PendingUnlock => write!(f, "PendingUnlock"),
        }
    }
}

/// Synchronously readable floor state
#[derive(Clone, Default)]
pub struct SharedFloor {
    inner: Arc<RwLock<FloorState>>,
}

impl SharedFloor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> FloorState {
        *self.inner.read()
    }

    pub fn is_listening(&self) -> bool {
        self.get().is_listening()
    }

    /// The single "agent is speaking" flag
    pub fn is_agent_speaking(&self) -> bool {
        self.get().agent_holds()
    }

    pub(crate) fn set(&self, state: FloorState) {
        *self.inner.write() = state;
    }
}
