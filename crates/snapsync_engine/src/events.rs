//! Sync event notifications.
//!
//! Handlers registered with [`EventBus::on`] are called synchronously on the
//! task that completed the tick. [`EventBus::subscribe`] gives an async
//! receiver for consumers that prefer a channel.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Something observable that happened during a sync tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Another device's snapshot was imported into the local database.
    Received {
        /// Device that produced the snapshot.
        from_device: String,
    },
    /// This device published a snapshot.
    Uploaded {
        /// Remote path of the written file.
        path: String,
    },
}

impl SyncEvent {
    /// Returns the kind used for handler routing.
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::Received { .. } => EventKind::Received,
            SyncEvent::Uploaded { .. } => EventKind::Uploaded,
        }
    }
}

/// Event kinds handlers can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`SyncEvent::Received`].
    Received,
    /// See [`SyncEvent::Uploaded`].
    Uploaded,
}

/// Identifies a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback type for [`EventBus::on`].
pub type EventHandler = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

struct Registration {
    id: SubscriptionId,
    kind: EventKind,
    handler: EventHandler,
}

/// Fan-out of sync events to handlers and channel subscribers.
pub struct EventBus {
    handlers: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a bus with no handlers.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            sender,
        }
    }

    /// Registers a handler for one event kind.
    pub fn on(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push(Registration { id, kind, handler });
        id
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|r| r.id != id);
        handlers.len() != before
    }

    /// Returns a channel receiving every emitted event.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Delivers an event. Returns the number of handlers called.
    pub fn emit(&self, event: &SyncEvent) -> usize {
        // Snapshot the handlers so callbacks may call on/off.
        let matching: Vec<EventHandler> = self
            .handlers
            .read()
            .iter()
            .filter(|r| r.kind == event.kind())
            .map(|r| Arc::clone(&r.handler))
            .collect();

        for handler in &matching {
            handler(event);
        }

        // No receivers is not an error.
        let _ = self.sender.send(event.clone());
        matching.len()
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
