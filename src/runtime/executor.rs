//! Chat runtime executor

use super::schedule::ScheduledTask;
use super::Command;
use crate::api::CompanionApi;
use crate::protocol::{event_stream, SendRequest, StreamError, StreamEvent};
use crate::store::{transition, Action, ChatContext, ChatState, Effect, TransitionError, ViewUpdate};
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

const ACTION_CAPACITY: usize = 256;

/// Sole owner and writer of a [`ChatState`]
pub struct ChatRuntime<A: CompanionApi + 'static> {
    context: ChatContext,
    state: ChatState,
    api: Arc<A>,
    command_rx: mpsc::Receiver<Command>,
    action_rx: mpsc::Receiver<Action>,
    action_tx: mpsc::Sender<Action>,
    updates_tx: broadcast::Sender<ViewUpdate>,
    state_tx: watch::Sender<ChatState>,
    /// Parent of every spawned task's token
    shutdown: CancellationToken,
    /// Farewell wipe waiting to fire
    wipe: Option<ScheduledTask>,
}

impl<A: CompanionApi + 'static> ChatRuntime<A> {
    pub fn new(
        context: ChatContext,
        api: A,
        command_rx: mpsc::Receiver<Command>,
        updates_tx: broadcast::Sender<ViewUpdate>,
        state_tx: watch::Sender<ChatState>,
    ) -> Self {
        let (action_tx, action_rx) = mpsc::channel(ACTION_CAPACITY);
        Self {
            context,
            state: ChatState::new(),
            api: Arc::new(api),
            command_rx,
            action_rx,
            action_tx,
            updates_tx,
            state_tx,
            shutdown: CancellationToken::new(),
            wipe: None,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            clear_delay_ms = %self.context.clear_delay.as_millis(),
            max_message_chars = self.context.max_message_chars,
            "Starting chat runtime"
        );

        loop {
            tokio::select! {
                // Commands already queued are handled before later stream progress
                biased;

                command = self.command_rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(action) = self.action_rx.recv() => self.dispatch(action),
            }
        }

        self.teardown();
        tracing::info!("Chat runtime stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { text } => self.dispatch(Action::Submit { text }),
            Command::Clear { confirmed } => self.dispatch(Action::Clear { confirmed }),
            Command::Resume => self.spawn_resume(),
            Command::Shutdown => {}
        }
    }

    fn dispatch(&mut self, action: Action) {
        let label = action.label();
        if matches!(action, Action::WipeElapsed) {
            self.wipe = None;
        }

        // Pure state transition
        let result = match transition(&self.state, &self.context, action, Utc::now()) {
            Ok(r) => r,
            Err(e) if e.is_precondition() => {
                tracing::debug!(action = label, reason = %e, "Command rejected");
                return;
            }
            Err(e @ TransitionError::StaleExchange(_)) => {
                tracing::debug!(action = label, reason = %e, "Ignoring action for finished exchange");
                return;
            }
            Err(e) => {
                tracing::warn!(action = label, error = %e, "Transition failed");
                return;
            }
        };

        // Observers see the new state before any effect they trigger
        self.state = result.new_state;
        self.state_tx.send_replace(self.state.clone());

        for effect in result.effects {
            self.execute_effect(effect);
        }
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::OpenStream { exchange, request } => {
                tracing::info!(exchange, conversation_id = ?request.conversation_id, "Starting exchange");
                let api = Arc::clone(&self.api);
                let tx = self.action_tx.clone();
                let token = self.shutdown.child_token();

                tokio::spawn(async move {
                    tokio::select! {
                        biased;

                        () = token.cancelled() => {
                            tracing::debug!(exchange, "Stream pump cancelled");
                        }

                        () = pump_stream(api, exchange, request, tx) => {}
                    }
                });
            }

            Effect::RequestClear => {
                let api = Arc::clone(&self.api);
                let tx = self.action_tx.clone();
                let token = self.shutdown.child_token();

                tokio::spawn(async move {
                    tokio::select! {
                        biased;

                        () = token.cancelled() => {
                            tracing::debug!("Clear request cancelled");
                        }

                        result = api.clear_conversation() => {
                            let action = match result {
                                Ok(response) => Action::ClearResolved { response },
                                Err(e) => Action::ClearFailed { message: e.message },
                            };
                            let _ = tx.send(action).await;
                        }
                    }
                });
            }

            Effect::ScheduleWipe { delay } => {
                tracing::info!(delay_ms = %delay.as_millis(), "Farewell shown, wipe scheduled");
                // Replacing a pending wipe drops and so cancels it
                self.wipe = Some(ScheduledTask::spawn(
                    delay,
                    self.shutdown.child_token(),
                    self.action_tx.clone(),
                    Action::WipeElapsed,
                ));
            }

            Effect::Notify(update) => {
                // No subscribers is fine
                let _ = self.updates_tx.send(update);
            }
        }
    }

    fn spawn_resume(&self) {
        let api = Arc::clone(&self.api);
        let tx = self.action_tx.clone();
        let token = self.shutdown.child_token();

        tokio::spawn(async move {
            tokio::select! {
                biased;

                () = token.cancelled() => {}

                result = api.active_conversation() => match result {
                    Ok(active) => {
                        let _ = tx.send(Action::Resume { active }).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not look up active conversation");
                    }
                },
            }
        });
    }

    fn teardown(&mut self) {
        if let Some(wipe) = self.wipe.take() {
            tracing::debug!("Cancelling pending wipe");
            wipe.cancel();
        }
        self.shutdown.cancel();
    }
}

/// Feed one exchange's events back to the runtime, in arrival order
async fn pump_stream<A: CompanionApi>(
    api: Arc<A>,
    exchange: u64,
    request: SendRequest,
    tx: mpsc::Sender<Action>,
) {
    let body = match api.open_stream(&request).await {
        Ok(body) => body,
        Err(e) => {
            let _ = tx
                .send(Action::StreamFailed {
                    exchange,
                    message: e.message,
                })
                .await;
            return;
        }
    };

    let events = event_stream(body);
    tokio::pin!(events);

    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                let is_end = matches!(event, StreamEvent::End);
                if tx.send(Action::Stream { exchange, event }).await.is_err() {
                    return;
                }
                if is_end {
                    tracing::info!(exchange, "Exchange finished");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(exchange, error = %e, "Exchange failed mid-stream");
                let message = match e {
                    StreamError::Transport(api_error) => api_error.message,
                    StreamError::Frame(frame_error) => frame_error.to_string(),
                };
                let _ = tx.send(Action::StreamFailed { exchange, message }).await;
                return;
            }
        }
    }

    tracing::info!(exchange, "Exchange closed without end frame");
    let _ = tx.send(Action::StreamClosed { exchange }).await;
}
