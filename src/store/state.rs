//! Chat state types

use crate::protocol::{ActiveConversation, MetadataPayload, Phase};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Messages
// ============================================================================

/// Opaque message handle. Never reused for the lifetime of a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry of the message log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Phase reported when an assistant reply was opened
    pub phase: Option<Phase>,
    /// Farewell shown before a clear wipes the log
    pub is_resolution: bool,
    /// Crisis alert, rendered apart from replies
    pub is_crisis: bool,
}

/// What to append to the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewMessage {
    User { text: String },
    /// Empty assistant reply that chunks will grow
    Reply { phase: Phase },
    Crisis { text: String },
    Farewell { text: String },
}

/// Ordered message sequence with at most one in-progress assistant reply.
///
/// Appending a user message, a farewell or another reply seals the
/// in-progress reply. A crisis alert does not, so a reply keeps growing
/// across an interleaved alert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    entries: Vec<Message>,
    in_progress: Option<MessageId>,
    next_id: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: NewMessage, created_at: DateTime<Utc>) -> MessageId {
        self.next_id += 1;
        let id = MessageId(self.next_id);

        let (role, content, phase, is_resolution, is_crisis) = match message {
            NewMessage::User { text } => (Role::User, text, None, false, false),
            NewMessage::Reply { phase } => (Role::Assistant, String::new(), Some(phase), false, false),
            NewMessage::Crisis { text } => (Role::System, text, None, false, true),
            NewMessage::Farewell { text } => (Role::Assistant, text, None, true, false),
        };

        if !is_crisis {
            self.in_progress = None;
        }
        if phase.is_some() {
            self.in_progress = Some(id);
        }

        self.entries.push(Message {
            id,
            role,
            content,
            created_at,
            phase,
            is_resolution,
            is_crisis,
        });
        id
    }

    /// Grow the last entry if it is the in-progress assistant reply
    pub fn extend_last(&mut self, text: &str) -> bool {
        let Some(in_progress) = self.in_progress else {
            return false;
        };
        match self.entries.last_mut() {
            Some(last) if last.id == in_progress && last.role == Role::Assistant => {
                last.content.push_str(text);
                true
            }
            _ => false,
        }
    }

    /// Grow the reply behind `id`, provided it is still in progress
    pub fn extend(&mut self, id: MessageId, text: &str) -> bool {
        if self.in_progress != Some(id) {
            return false;
        }
        match self.entries.iter_mut().rev().find(|m| m.id == id) {
            Some(reply) => {
                reply.content.push_str(text);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: MessageId) -> Option<Message> {
        let index = self.entries.iter().position(|m| m.id == id)?;
        if self.in_progress == Some(id) {
            self.in_progress = None;
        }
        Some(self.entries.remove(index))
    }

    /// Drop `first` and every later entry that `keep` rejects.
    ///
    /// Returns the removed ids, latest first.
    pub fn roll_back(&mut self, first: MessageId, keep: impl Fn(&Message) -> bool) -> Vec<MessageId> {
        let mut removed = Vec::new();
        self.entries.retain(|m| {
            if m.id < first || keep(m) {
                true
            } else {
                removed.push(m.id);
                false
            }
        });
        if self.in_progress.is_some_and(|id| removed.contains(&id)) {
            self.in_progress = None;
        }
        removed.reverse();
        removed
    }

    pub fn seal(&mut self) {
        self.in_progress = None;
    }

    /// Empty the log. Ids keep counting up.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.in_progress = None;
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.entries.iter().find(|m| m.id == id)
    }

    pub fn in_progress(&self) -> Option<MessageId> {
        self.in_progress
    }
}

// ============================================================================
// Conversation metadata
// ============================================================================

/// Server-reported conversation identity and stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversationMeta {
    pub conversation_id: Option<i64>,
    pub phase: Phase,
    pub round_count: u32,
    pub is_privacy: bool,
    pub is_complex: bool,
}

/// Sole owner of [`ConversationMeta`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationTracker {
    meta: ConversationMeta,
}

impl ConversationTracker {
    pub fn current(&self) -> &ConversationMeta {
        &self.meta
    }

    /// Replace every field from a metadata payload.
    ///
    /// Returns `true` when the payload's round count went backwards within
    /// the same conversation; the previous count is kept in that case.
    pub fn apply(&mut self, payload: MetadataPayload) -> bool {
        let regressed = payload.conversation_id.is_some()
            && payload.conversation_id == self.meta.conversation_id
            && payload.round_count < self.meta.round_count;

        let round_count = if regressed {
            tracing::warn!(
                conversation_id = ?payload.conversation_id,
                previous = self.meta.round_count,
                reported = payload.round_count,
                "Round count went backwards, keeping previous value"
            );
            self.meta.round_count
        } else {
            payload.round_count
        };

        self.meta = ConversationMeta {
            conversation_id: payload.conversation_id,
            phase: payload.phase,
            round_count,
            is_privacy: payload.is_privacy,
            is_complex: payload.is_complex,
        };
        regressed
    }

    /// Seed from the server's active conversation. Returns whether anything changed.
    pub fn resume(&mut self, active: &ActiveConversation) -> bool {
        let Some(conversation_id) = active.conversation_id else {
            return false;
        };
        self.meta = ConversationMeta {
            conversation_id: Some(conversation_id),
            phase: active.phase.unwrap_or_default(),
            round_count: active.round_count,
            is_privacy: false,
            is_complex: false,
        };
        true
    }

    pub fn reset(&mut self) {
        self.meta = ConversationMeta::default();
    }

    /// Put back a snapshot taken before a failed exchange
    pub fn restore(&mut self, meta: ConversationMeta) {
        self.meta = meta;
    }
}

// ============================================================================
// Busy markers
// ============================================================================

/// An exchange in flight. Its presence is the `sending` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendSession {
    /// Sequence number of the exchange; actions for older exchanges are stale
    pub exchange: u64,
    /// Optimistic user message. A failed exchange rolls the log back to it.
    pub tentative: MessageId,
    /// Reply opened by this exchange's metadata frame
    pub reply: Option<MessageId>,
    /// Metadata before the exchange started
    pub meta_before: ConversationMeta,
}

/// Clear in flight. Its presence is the `clearing` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearPhase {
    /// Waiting for the server
    Requesting,
    /// Farewell shown, wipe scheduled
    Farewell { message: MessageId },
}

// ============================================================================
// Chat state
// ============================================================================

/// Everything the chat surface shows. Only `transition` produces new values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    pub(super) log: MessageLog,
    pub(super) tracker: ConversationTracker,
    pub(super) sending: Option<SendSession>,
    pub(super) clearing: Option<ClearPhase>,
    pub(super) last_exchange: u64,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn messages(&self) -> &[Message] {
        self.log.entries()
    }

    pub fn meta(&self) -> &ConversationMeta {
        self.tracker.current()
    }

    pub fn session(&self) -> Option<SendSession> {
        self.sending
    }

    pub fn clear_phase(&self) -> Option<ClearPhase> {
        self.clearing
    }

    pub fn is_sending(&self) -> bool {
        self.sending.is_some()
    }

    pub fn is_clearing(&self) -> bool {
        self.clearing.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.is_sending() || self.is_clearing()
    }
}

/// Immutable settings the transitions read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatContext {
    /// How long a farewell stays up before the log is wiped
    pub clear_delay: Duration,
    pub max_message_chars: usize,
}

impl ChatContext {
    pub const DEFAULT_CLEAR_DELAY: Duration = Duration::from_millis(3000);
    pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 2000;

    pub fn new(clear_delay: Duration, max_message_chars: usize) -> Self {
        Self {
            clear_delay,
            max_message_chars,
        }
    }
}

impl Default for ChatContext {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CLEAR_DELAY, Self::DEFAULT_MAX_MESSAGE_CHARS)
    }
}
