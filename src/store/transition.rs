//! Pure state transition function
//!
//! Every change to [`ChatState`] goes through [`transition`]. It performs no
//! I/O: network work and timers come back out as [`Effect`]s for the runtime.

use super::state::{ChatContext, ChatState, ClearPhase, NewMessage, SendSession};
use super::{Action, Effect, NoticeKind, ViewUpdate};
use crate::protocol::{ActiveConversation, ClearResponse, SendRequest, StreamEvent};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ChatState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ChatState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Message is empty")]
    EmptyInput,
    #[error("Message is {len} characters, the limit is {max}")]
    MessageTooLong { len: usize, max: usize },
    #[error("A message is still being answered")]
    Busy,
    #[error("Conversation is being cleared")]
    ClearInProgress,
    #[error("Clear was not confirmed")]
    NotConfirmed,
    #[error("Conversation already started, nothing to resume")]
    ConversationStarted,
    #[error("Event for finished exchange {0}")]
    StaleExchange(u64),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl TransitionError {
    /// Rejections that leave the control inert rather than report a failure
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            TransitionError::EmptyInput
                | TransitionError::MessageTooLong { .. }
                | TransitionError::Busy
                | TransitionError::ClearInProgress
                | TransitionError::NotConfirmed
                | TransitionError::ConversationStarted
        )
    }
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs. On error the
/// caller keeps its current state.
pub fn transition(
    state: &ChatState,
    context: &ChatContext,
    action: Action,
    at: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    match action {
        // ============================================================
        // Send exchange
        // ============================================================
        Action::Submit { text } => submit(state, context, &text, at),

        Action::Stream { exchange, event } => {
            let session = live_session(state, exchange)?;
            Ok(apply_stream_event(state, session, event, at))
        }

        Action::StreamClosed { exchange } => {
            live_session(state, exchange)?;
            tracing::debug!(exchange, "Stream closed without end frame");
            Ok(finish_send(state.clone()))
        }

        Action::StreamFailed { exchange, message } => {
            let session = live_session(state, exchange)?;
            Ok(fail_send(state.clone(), session, message))
        }

        // ============================================================
        // Clear sequence
        // ============================================================
        Action::Clear { confirmed } => {
            if !confirmed {
                return Err(TransitionError::NotConfirmed);
            }
            if state.clearing.is_some() {
                return Err(TransitionError::ClearInProgress);
            }
            if state.sending.is_some() {
                return Err(TransitionError::Busy);
            }
            let mut new_state = state.clone();
            new_state.clearing = Some(ClearPhase::Requesting);
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::busy(false, true))
                .with_effect(Effect::RequestClear))
        }

        Action::ClearResolved { response } => {
            expect_clear_request(state)?;
            Ok(resolve_clear(state, context, &response, at))
        }

        Action::ClearFailed { message } => {
            expect_clear_request(state)?;
            let mut new_state = state.clone();
            new_state.clearing = None;
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::notice(NoticeKind::ClearFailed, message))
                .with_effect(Effect::busy(false, false)))
        }

        Action::WipeElapsed => match state.clearing {
            Some(ClearPhase::Farewell { .. }) => Ok(wipe(state.clone())),
            _ => Err(TransitionError::InvalidTransition(
                "wipe fired without a farewell on screen".to_string(),
            )),
        },

        // ============================================================
        // Resume
        // ============================================================
        Action::Resume { active } => resume(state, &active),
    }
}

fn submit(
    state: &ChatState,
    context: &ChatContext,
    text: &str,
    at: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TransitionError::EmptyInput);
    }
    let len = text.chars().count();
    if len > context.max_message_chars {
        return Err(TransitionError::MessageTooLong {
            len,
            max: context.max_message_chars,
        });
    }
    if state.sending.is_some() {
        return Err(TransitionError::Busy);
    }
    if state.clearing.is_some() {
        return Err(TransitionError::ClearInProgress);
    }

    let mut new_state = state.clone();
    let exchange = state.last_exchange + 1;
    let tentative = new_state.log.append(
        NewMessage::User {
            text: text.to_string(),
        },
        at,
    );
    new_state.last_exchange = exchange;
    new_state.sending = Some(SendSession {
        exchange,
        tentative,
        reply: None,
        meta_before: *state.tracker.current(),
    });

    let request = SendRequest {
        message: text.to_string(),
        conversation_id: state.tracker.current().conversation_id,
    };
    let appended = new_state.log.get(tentative).map(Effect::appended);

    Ok(TransitionResult::new(new_state)
        .with_effects(appended)
        .with_effect(Effect::busy(true, false))
        .with_effect(Effect::OpenStream { exchange, request }))
}

fn live_session(state: &ChatState, exchange: u64) -> Result<SendSession, TransitionError> {
    state
        .sending
        .filter(|session| session.exchange == exchange)
        .ok_or(TransitionError::StaleExchange(exchange))
}

fn apply_stream_event(
    state: &ChatState,
    mut session: SendSession,
    event: StreamEvent,
    at: DateTime<Utc>,
) -> TransitionResult {
    let mut new_state = state.clone();

    match event {
        StreamEvent::Metadata(payload) => {
            let phase = payload.phase;
            new_state.tracker.apply(payload);
            let reply = new_state.log.append(NewMessage::Reply { phase }, at);
            session.reply = Some(reply);
            new_state.sending = Some(session);

            let meta = Effect::Notify(ViewUpdate::Meta(*new_state.tracker.current()));
            let appended = new_state.log.get(reply).map(Effect::appended);
            TransitionResult::new(new_state)
                .with_effect(meta)
                .with_effects(appended)
        }

        StreamEvent::Chunk { content } => {
            if content.is_empty() {
                return TransitionResult::new(new_state);
            }
            let extended = match session.reply {
                Some(reply) => new_state.log.extend(reply, &content).then_some(reply),
                None => {
                    let last = new_state.log.last().map(|m| m.id);
                    if new_state.log.extend_last(&content) {
                        last
                    } else {
                        tracing::debug!(
                            exchange = session.exchange,
                            "Dropping chunk with no reply in progress"
                        );
                        None
                    }
                }
            };
            let update = extended.map(|id| Effect::Notify(ViewUpdate::Extended { id, text: content }));
            TransitionResult::new(new_state).with_effects(update)
        }

        StreamEvent::Crisis { content } => {
            let alert = new_state.log.append(NewMessage::Crisis { text: content }, at);
            let appended = new_state.log.get(alert).map(Effect::appended);
            TransitionResult::new(new_state).with_effects(appended)
        }

        StreamEvent::Error { content } => {
            TransitionResult::new(new_state).with_effect(Effect::notice(NoticeKind::ServerError, content))
        }

        StreamEvent::End => finish_send(new_state),
    }
}

fn finish_send(mut new_state: ChatState) -> TransitionResult {
    new_state.log.seal();
    new_state.sending = None;
    let clearing = new_state.clearing.is_some();
    TransitionResult::new(new_state).with_effect(Effect::busy(false, clearing))
}

/// Undo the exchange: drop the optimistic user message and every reply since,
/// and put the metadata back. Crisis alerts it delivered stay on screen.
fn fail_send(mut new_state: ChatState, session: SendSession, message: String) -> TransitionResult {
    let removed: Vec<Effect> = new_state
        .log
        .roll_back(session.tentative, |m| m.is_crisis)
        .into_iter()
        .map(|id| Effect::Notify(ViewUpdate::Removed { id }))
        .collect();
    new_state.log.seal();
    new_state.sending = None;

    let meta_changed = *new_state.tracker.current() != session.meta_before;
    new_state.tracker.restore(session.meta_before);
    let meta = meta_changed.then(|| Effect::Notify(ViewUpdate::Meta(session.meta_before)));

    TransitionResult::new(new_state)
        .with_effects(removed)
        .with_effects(meta)
        .with_effect(Effect::notice(NoticeKind::SendFailed, message))
        .with_effect(Effect::busy(false, false))
}

fn expect_clear_request(state: &ChatState) -> Result<(), TransitionError> {
    match state.clearing {
        Some(ClearPhase::Requesting) => Ok(()),
        Some(ClearPhase::Farewell { .. }) => Err(TransitionError::InvalidTransition(
            "clear response after the farewell was shown".to_string(),
        )),
        None => Err(TransitionError::InvalidTransition(
            "clear response without a pending clear".to_string(),
        )),
    }
}

fn resolve_clear(
    state: &ChatState,
    context: &ChatContext,
    response: &ClearResponse,
    at: DateTime<Utc>,
) -> TransitionResult {
    let mut new_state = state.clone();

    if !response.success {
        new_state.clearing = None;
        let message = response
            .farewell()
            .unwrap_or("the service declined the request")
            .to_string();
        return TransitionResult::new(new_state)
            .with_effect(Effect::notice(NoticeKind::ClearFailed, message))
            .with_effect(Effect::busy(false, false));
    }

    match response.farewell() {
        Some(text) => {
            let farewell = new_state.log.append(
                NewMessage::Farewell {
                    text: text.to_string(),
                },
                at,
            );
            new_state.clearing = Some(ClearPhase::Farewell { message: farewell });
            let appended = new_state.log.get(farewell).map(Effect::appended);
            TransitionResult::new(new_state)
                .with_effects(appended)
                .with_effect(Effect::ScheduleWipe {
                    delay: context.clear_delay,
                })
        }
        None => wipe(new_state),
    }
}

fn wipe(mut new_state: ChatState) -> TransitionResult {
    new_state.log.clear();
    new_state.tracker.reset();
    new_state.clearing = None;
    let meta = *new_state.tracker.current();
    TransitionResult::new(new_state)
        .with_effect(Effect::Notify(ViewUpdate::Cleared))
        .with_effect(Effect::Notify(ViewUpdate::Meta(meta)))
        .with_effect(Effect::busy(false, false))
}

fn resume(state: &ChatState, active: &ActiveConversation) -> Result<TransitionResult, TransitionError> {
    if state.sending.is_some() {
        return Err(TransitionError::Busy);
    }
    if state.clearing.is_some() {
        return Err(TransitionError::ClearInProgress);
    }
    if !state.log.is_empty() || state.tracker.current().conversation_id.is_some() {
        return Err(TransitionError::ConversationStarted);
    }

    let mut new_state = state.clone();
    if !new_state.tracker.resume(active) {
        return Ok(TransitionResult::new(new_state));
    }
    let meta = *new_state.tracker.current();
    Ok(TransitionResult::new(new_state).with_effect(Effect::Notify(ViewUpdate::Meta(meta))))
}
