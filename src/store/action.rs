//! Actions that drive chat state transitions

use crate::protocol::{ActiveConversation, ClearResponse, StreamEvent};

/// Inputs to [`transition`](super::transition)
#[derive(Debug, Clone)]
pub enum Action {
    // User actions
    Submit {
        text: String,
    },
    Clear {
        confirmed: bool,
    },

    // Send exchange
    Stream {
        exchange: u64,
        event: StreamEvent,
    },
    /// Body ended without an `end` frame
    StreamClosed {
        exchange: u64,
    },
    /// Open failure, transport error or hard decode error
    StreamFailed {
        exchange: u64,
        message: String,
    },

    // Clear exchange
    ClearResolved {
        response: ClearResponse,
    },
    ClearFailed {
        message: String,
    },
    WipeElapsed,

    Resume {
        active: ActiveConversation,
    },
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::Submit { .. } => "submit",
            Action::Clear { .. } => "clear",
            Action::Stream { .. } => "stream",
            Action::StreamClosed { .. } => "stream_closed",
            Action::StreamFailed { .. } => "stream_failed",
            Action::ClearResolved { .. } => "clear_resolved",
            Action::ClearFailed { .. } => "clear_failed",
            Action::WipeElapsed => "wipe_elapsed",
            Action::Resume { .. } => "resume",
        }
    }
}
