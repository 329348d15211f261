//! Throttled notifications of local database writes.

use crate::database::LocalDatabase;
use crate::trigger::DebouncedTrigger;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Handle to a running mutation listener.
///
/// The callback runs at most once per throttle window, with a trailing call
/// if writes keep arriving. Dropping the handle or calling
/// [`unsubscribe`](Self::unsubscribe) stops delivery.
#[derive(Debug)]
pub struct MutationSubscription {
    task: JoinHandle<()>,
}

impl MutationSubscription {
    /// Starts listening to `database` on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<F>(database: &dyn LocalDatabase, throttle: Duration, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut rx = database.subscribe();
        let trigger = DebouncedTrigger::spawn(throttle, move || {
            callback();
            async {}
        });

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(_) => {
                        trigger.fire();
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::debug!(missed, "mutation listener lagged");
                        trigger.fire();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self { task }
    }

    /// Stops delivery. Calling it again has no effect.
    pub fn unsubscribe(&self) {
        self.task.abort();
    }

    /// Returns true once the listener has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for MutationSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
