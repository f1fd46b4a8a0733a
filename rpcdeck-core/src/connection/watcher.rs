use super::ConnectivityState;
use crate::events::{Event, EventSink};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinError, JoinHandle};

/// Background task publishing every connectivity change of a session.
#[derive(Debug)]
pub(crate) struct StateWatcher {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl StateWatcher {
    /// Publishes the current state right away, then every change until stopped.
    pub(crate) fn spawn(
        mut state: watch::Receiver<ConnectivityState>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            tracing::debug!("connection state watcher started");

            loop {
                let current = *state.borrow_and_update();
                events.publish(Event::ConnectionStateChanged { state: current });

                // Changes that happened before the stop signal are still published.
                tokio::select! {
                    biased;
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = &mut stopped => break,
                }
            }

            tracing::debug!("connection state watcher stopped");
        });

        Self { stop, task }
    }

    /// Signals the task to exit and waits for it.
    pub(crate) async fn stop(self) -> Result<(), JoinError> {
        // The task may already be gone if the state sender was dropped.
        let _ = self.stop.send(());
        self.task.await
    }
}
