//! Chat state store
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod action;
mod effect;
pub mod state;
pub(crate) mod transition;


pub use action::Action;
pub use effect::{Effect, Notice, NoticeKind, ViewUpdate};
pub use state::{
    ChatContext, ChatState, ClearPhase, ConversationMeta, ConversationTracker, Message, MessageId,
    MessageLog, NewMessage, Role, SendSession,
};
pub use transition::{transition, TransitionError, TransitionResult};
