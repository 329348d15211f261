//! Debounced trigger: coalesces bursts of requests into spaced runs.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Runs an action at most once per window, coalescing requests.
///
/// Requests go into a single-slot queue drained by one task. The first
/// request of a burst runs immediately; every request made while the window
/// is open collapses into one trailing run at the window boundary. A burst
/// therefore produces at most two runs.
///
/// Runs never overlap: the window starts when a run starts and the next run
/// waits for both the window and the previous run.
///
/// The task is aborted when the trigger is dropped.
#[derive(Debug)]
pub struct DebouncedTrigger {
    tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl DebouncedTrigger {
    /// Spawns the draining task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<F, Fut>(window: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let started = Instant::now();
                action().await;
                tokio::time::sleep_until(started + window).await;
            }
        });

        Self { tx, task }
    }

    /// Requests a run.
    ///
    /// Returns false if the request was coalesced into one already pending.
    pub fn fire(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => false,
            Err(TrySendError::Closed(())) => {
                tracing::debug!("trigger fired after shutdown");
                false
            }
        }
    }

    /// Stops the draining task. A run in progress is cancelled.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for DebouncedTrigger {
    fn drop(&mut self) {
        self.task.abort();
    }
}
