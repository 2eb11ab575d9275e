//! Effects produced by state transitions

use super::state::{ConversationMeta, Message, MessageId};
use crate::protocol::SendRequest;
use std::fmt;
use std::time::Duration;

/// Effects to be executed after a transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Open the send stream for an exchange
    OpenStream { exchange: u64, request: SendRequest },

    /// Ask the service to clear the conversation
    RequestClear,

    /// Fire `WipeElapsed` once after `delay`
    ScheduleWipe { delay: Duration },

    /// Tell the presentation layer what changed
    Notify(ViewUpdate),
}

impl Effect {
    pub fn appended(message: &Message) -> Self {
        Effect::Notify(ViewUpdate::Appended(message.clone()))
    }

    pub fn notice(kind: NoticeKind, message: impl Into<String>) -> Self {
        Effect::Notify(ViewUpdate::Notice(Notice {
            kind,
            message: message.into(),
        }))
    }

    pub fn busy(sending: bool, clearing: bool) -> Self {
        Effect::Notify(ViewUpdate::Busy { sending, clearing })
    }
}

/// Incremental change for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    Appended(Message),
    /// Text appended to an in-progress reply
    Extended { id: MessageId, text: String },
    Removed { id: MessageId },
    /// Log wiped by a completed clear
    Cleared,
    Meta(ConversationMeta),
    Busy { sending: bool, clearing: bool },
    Notice(Notice),
}

/// User-visible failure notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    SendFailed,
    ClearFailed,
    /// Processing failure reported inside the stream
    ServerError,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            NoticeKind::SendFailed => "Message not sent",
            NoticeKind::ClearFailed => "Could not clear the conversation",
            NoticeKind::ServerError => "The companion ran into a problem",
        };
        write!(f, "{prefix}: {}", self.message)
    }
}
