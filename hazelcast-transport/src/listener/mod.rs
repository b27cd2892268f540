//! Event listener registrations.
//!
//! A listener is registered by sending a registration request; the
//! correlation ID of that request becomes the key under which every
//! subsequent event frame (one carrying the LISTENER flag) is dispatched.

use std::fmt;

use hazelcast_protocol::ClientMessage;
use uuid::Uuid;

/// Unique identifier for a listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Creates a new unique listener ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Receives the event frames of one listener registration.
///
/// Handlers run on the connection's reader task and must not block.
pub trait EventHandler: Send + Sync {
    /// Handles one event frame.
    fn handle(&self, event: ClientMessage);
}

impl<F> EventHandler for F
where
    F: Fn(ClientMessage) + Send + Sync,
{
    fn handle(&self, event: ClientMessage) {
        self(event)
    }
}

/// A live listener registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRegistration {
    id: ListenerId,
    correlation_id: i32,
}

impl ListenerRegistration {
    pub(crate) fn new(correlation_id: i32) -> Self {
        Self {
            id: ListenerId::new(),
            correlation_id,
        }
    }

    /// Returns the listener ID.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns the correlation ID event frames are delivered under.
    pub fn correlation_id(&self) -> i32 {
        self.correlation_id
    }
}
