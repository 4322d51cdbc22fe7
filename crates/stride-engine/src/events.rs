//! Notifications published to external listeners.

use crate::exec::PausedState;
use crate::frames::FrameSnapshot;
use crate::value::Value;

/// Engine notifications, delivered over registered channel senders.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A pause was released.
    Resumed,
    /// Execution paused; carries the full pause payload.
    Paused(PausedState),
    /// An uncaught error surfaced, with the reconstructed scope chain.
    Error {
        error: Value,
        frames: Vec<FrameSnapshot>,
    },
    /// The sandbox bridge was activated or deactivated.
    SandboxStateChanged(bool),
}
