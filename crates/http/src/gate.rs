//! The pause/resume point of the pipeline.
//!
//! While an asynchronous policy check runs, the connection pauses the gate. When the check
//! completes, the verdict is applied through [`ResponseGate::resume`], which runs the
//! continuation exactly once. Any resume that does not match a pause is refused and the
//! continuation is dropped unexecuted, so a request can never be processed twice.

use std::cell::Cell;

use tracing::warn;

use crate::protocol::GateMisuse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    #[default]
    Idle,
    Paused,
    Resuming,
}

#[derive(Debug, Default)]
pub struct ResponseGate {
    state: Cell<GateState>,
}

impl ResponseGate {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn state(&self) -> GateState {
        self.state.get()
    }

    /// Moves the gate from idle to paused.
    pub fn pause(&self) -> Result<(), GateMisuse> {
        match self.state.get() {
            GateState::Idle => {
                self.state.set(GateState::Paused);
                Ok(())
            }
            state => {
                warn!(?state, "pause refused, gate is not idle");
                Err(GateMisuse::Pause(state))
            }
        }
    }

    /// Runs `continuation` if the gate is paused, then returns to idle.
    pub fn resume<T, F>(&self, continuation: F) -> Result<T, GateMisuse>
    where
        F: FnOnce() -> T,
    {
        match self.state.get() {
            GateState::Paused => {
                self.state.set(GateState::Resuming);
                let result = continuation();
                self.state.set(GateState::Idle);
                Ok(result)
            }
            state => {
                warn!(?state, "resume refused, gate is not paused");
                Err(GateMisuse::Resume(state))
            }
        }
    }
}
