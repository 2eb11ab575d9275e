//! Cancellable single-shot delayed task

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Delivers one message after a delay unless cancelled first.
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn<T: Send + 'static>(
        delay: Duration,
        token: CancellationToken,
        tx: mpsc::Sender<T>,
        message: T,
    ) -> Self {
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;

                () = task_token.cancelled() => {
                    tracing::debug!("Scheduled task cancelled");
                }

                () = tokio::time::sleep(delay) => {
                    let _ = tx.send(message).await;
                }
            }
        });

        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
