//! Change notification fan-out for store watches.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use webapp_core::{Error, Kind, Object, Result};

/// Default capacity of the broadcast channel behind a [`WatchBus`].
pub const DEFAULT_WATCH_CAPACITY: usize = 1024;

/// What happened to the object carried by a [`WatchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub change: ChangeKind,
    /// Object state after the change; for deletions, the last stored state.
    pub object: Object,
}

impl WatchEvent {
    /// Create a new watch event.
    #[must_use]
    pub const fn new(change: ChangeKind, object: Object) -> Self {
        Self { change, object }
    }
}

/// Publisher side shared by a store implementation.
#[derive(Debug)]
pub struct WatchBus {
    sender: broadcast::Sender<WatchEvent>,
}

impl Default for WatchBus {
    fn default() -> Self {
        Self::new(DEFAULT_WATCH_CAPACITY)
    }
}

impl WatchBus {
    /// Create a bus that buffers up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every live subscriber.
    pub fn publish(&self, event: WatchEvent) {
        debug!(
            kind = %event.object.kind(),
            key = %event.object.key(),
            change = ?event.change,
            "Publishing watch event"
        );
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events for one kind.
    #[must_use]
    pub fn subscribe(&self, kind: Kind) -> WatchStream {
        WatchStream {
            kind,
            receiver: self.sender.subscribe(),
        }
    }
}

/// Subscription handle yielding events for a single kind.
#[derive(Debug)]
pub struct WatchStream {
    kind: Kind,
    receiver: broadcast::Receiver<WatchEvent>,
}

impl WatchStream {
    /// Kind this stream is filtered to.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        self.kind
    }

    /// Receive the next event for this stream's kind.
    ///
    /// # Errors
    ///
    /// Returns `Error::WatchLagged` if events were dropped because this
    /// subscriber fell behind (the caller should relist), and
    /// `Error::WatchClosed` once the store is gone.
    pub async fn recv(&mut self) -> Result<WatchEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.object.kind() == self.kind => return Ok(event),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => return Err(Error::WatchLagged { missed }),
                Err(RecvError::Closed) => return Err(Error::WatchClosed),
            }
        }
    }
}
