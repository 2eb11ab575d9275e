//! Runtime that owns the chat state
//!
//! One task applies every transition. User commands arrive through a
//! [`ChatHandle`]; stream events, clear responses and the wipe timer come
//! back as internal actions. Observers get incremental [`ViewUpdate`]s on a
//! broadcast channel and full snapshots on a watch channel.

mod executor;
mod schedule;

#[cfg(test)]
pub mod testing;

pub use executor::ChatRuntime;
pub use schedule::ScheduledTask;

use crate::api::CompanionApi;
use crate::store::{ChatContext, ChatState, ViewUpdate};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

const COMMAND_CAPACITY: usize = 32;
const UPDATE_CAPACITY: usize = 256;

/// User-level requests to the runtime
#[derive(Debug, Clone)]
pub enum Command {
    Send { text: String },
    Clear { confirmed: bool },
    /// Look up the ongoing conversation and continue it
    Resume,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Chat runtime has stopped")]
    Stopped,
}

/// Cheap, cloneable access to a running [`ChatRuntime`]
#[derive(Clone)]
pub struct ChatHandle {
    command_tx: mpsc::Sender<Command>,
    updates_tx: broadcast::Sender<ViewUpdate>,
    state_rx: watch::Receiver<ChatState>,
}

impl ChatHandle {
    pub async fn send(&self, text: impl Into<String>) -> Result<(), RuntimeError> {
        self.command(Command::Send { text: text.into() }).await
    }

    /// `confirmed` is the user's answer to the clear prompt
    pub async fn clear(&self, confirmed: bool) -> Result<(), RuntimeError> {
        self.command(Command::Clear { confirmed }).await
    }

    pub async fn resume(&self) -> Result<(), RuntimeError> {
        self.command(Command::Resume).await
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.command(Command::Shutdown).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewUpdate> {
        self.updates_tx.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<ChatState> {
        self.state_rx.clone()
    }

    pub fn snapshot(&self) -> ChatState {
        self.state_rx.borrow().clone()
    }

    async fn command(&self, command: Command) -> Result<(), RuntimeError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RuntimeError::Stopped)
    }
}

/// Spawn a runtime over `api` and return its handle
pub fn start<A: CompanionApi + 'static>(context: ChatContext, api: A) -> (ChatHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (updates_tx, _) = broadcast::channel(UPDATE_CAPACITY);
    let (state_tx, state_rx) = watch::channel(ChatState::new());

    let runtime = ChatRuntime::new(context, api, command_rx, updates_tx.clone(), state_tx);
    let join = tokio::spawn(async move {
        runtime.run().await;
    });

    let handle = ChatHandle {
        command_tx,
        updates_tx,
        state_rx,
    };
    (handle, join)
}
