//! Per-turn idle watcher.
//!
//! Observes silence from a conversation's agent process and emits idle /
//! recovered events for presentation purposes only. The watcher never
//! terminates a process — cancellation of a turn is always explicit (user
//! stop, a new turn on the same conversation, or process exit).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Events emitted by the idle watcher.
#[derive(Debug, Clone)]
pub enum IdleEvent {
    /// The agent has been silent past the threshold.
    Idle {
        /// Conversation whose agent went silent.
        conversation_id: String,
        /// Seconds of silence when the event was generated.
        idle_seconds: u64,
    },
    /// The agent produced output again after an idle notice.
    Recovered {
        /// Conversation whose agent resumed output.
        conversation_id: String,
    },
}

/// Builder for a per-turn idle watcher.
pub struct IdleWatcher {
    conversation_id: String,
    threshold: Duration,
    event_tx: mpsc::Sender<IdleEvent>,
    cancel: CancellationToken,
}

impl IdleWatcher {
    /// Construct a watcher (does not start the timer yet).
    #[must_use]
    pub fn new(
        conversation_id: String,
        threshold: Duration,
        event_tx: mpsc::Sender<IdleEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conversation_id,
            threshold,
            event_tx,
            cancel,
        }
    }

    /// Spawn the timer task and return the control handle.
    #[must_use]
    pub fn spawn(self) -> IdleWatcherHandle {
        let reset_notify = Arc::new(Notify::new());
        let idle = Arc::new(AtomicBool::new(false));
        let cancel_for_handle = self.cancel.clone();

        let task = tokio::spawn(Self::run(
            self.conversation_id,
            self.threshold,
            self.event_tx,
            self.cancel,
            Arc::clone(&reset_notify),
            Arc::clone(&idle),
        ));

        IdleWatcherHandle {
            reset_notify,
            idle,
            cancel: cancel_for_handle,
            join_handle: Some(task),
        }
    }

    async fn run(
        conversation_id: String,
        threshold: Duration,
        event_tx: mpsc::Sender<IdleEvent>,
        cancel: CancellationToken,
        reset_notify: Arc<Notify>,
        idle: Arc<AtomicBool>,
    ) {
        loop {
            let fired = tokio::select! {
                () = cancel.cancelled() => {
                    debug!(conversation_id, "idle watcher cancelled");
                    return;
                }
                () = tokio::time::sleep(threshold) => true,
                () = reset_notify.notified() => false,
            };

            if fired {
                if !idle.swap(true, Ordering::SeqCst) {
                    let _ = event_tx
                        .send(IdleEvent::Idle {
                            conversation_id: conversation_id.clone(),
                            idle_seconds: threshold.as_secs(),
                        })
                        .await;
                }
            } else if idle.swap(false, Ordering::SeqCst) {
                let _ = event_tx
                    .send(IdleEvent::Recovered {
                        conversation_id: conversation_id.clone(),
                    })
                    .await;
            }
        }
    }
}

/// Handle returned from [`IdleWatcher::spawn`].
#[derive(Debug)]
pub struct IdleWatcherHandle {
    reset_notify: Arc<Notify>,
    idle: Arc<AtomicBool>,
    cancel: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl IdleWatcherHandle {
    /// Reset the silence timer; call on every event from the conversation.
    pub fn reset(&self) {
        self.reset_notify.notify_one();
    }

    /// Whether the watcher currently considers the agent idle.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    /// Stop the watcher and wait for its task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for IdleWatcherHandle {
    /// Cancel the background task when the handle is dropped.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
