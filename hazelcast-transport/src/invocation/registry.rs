//! Correlation of in-flight requests with their responses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use hazelcast_protocol::codecs::error as error_codec;
use hazelcast_protocol::{ClientMessage, HazelcastError, Result};
use tokio::sync::oneshot;

use crate::connection::ConnectionId;
use crate::listener::EventHandler;

/// Completion side of one sent request.
#[derive(Debug)]
pub struct PendingInvocation {
    connection_id: ConnectionId,
    message_type: u16,
    issued_at: Instant,
    completion: oneshot::Sender<Result<ClientMessage>>,
}

impl PendingInvocation {
    /// Creates a pending entry for a request sent on `connection_id`.
    pub fn new(
        connection_id: ConnectionId,
        message_type: u16,
        completion: oneshot::Sender<Result<ClientMessage>>,
    ) -> Self {
        Self {
            connection_id,
            message_type,
            issued_at: Instant::now(),
            completion,
        }
    }

    /// Returns the connection the request was sent on.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Returns the request message type.
    pub fn message_type(&self) -> u16 {
        self.message_type
    }

    /// Returns when the entry was created.
    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    fn complete(self, result: Result<ClientMessage>) {
        // The waiter may have given up already.
        let _ = self.completion.send(result);
    }
}

/// Tracks pending requests and listener registrations by correlation ID.
///
/// Responses may arrive in any order; each one completes exactly the entry
/// registered under its correlation ID. Entries are removed on completion,
/// so a late or duplicate response finds nothing and is dropped.
pub struct CorrelationRegistry {
    next_id: AtomicI32,
    pending: Mutex<HashMap<i32, PendingInvocation>>,
    listeners: Mutex<HashMap<i32, Arc<dyn EventHandler>>>,
}

impl CorrelationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            pending: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a fresh correlation ID.
    ///
    /// IDs are positive; after `i32::MAX` the sequence restarts at 1.
    pub fn next_correlation_id(&self) -> i32 {
        self.next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                Some(if id == i32::MAX { 1 } else { id + 1 })
            })
            .unwrap_or_else(|id| id)
    }

    /// Registers a pending request before it is sent.
    ///
    /// Fails if `correlation_id` is still pending or used by a listener.
    pub fn register(&self, correlation_id: i32, invocation: PendingInvocation) -> Result<()> {
        // Lock order: listeners, then pending.
        let listeners = lock(&self.listeners);
        let mut pending = lock(&self.pending);
        if listeners.contains_key(&correlation_id) || pending.contains_key(&correlation_id) {
            return Err(duplicate(correlation_id));
        }
        pending.insert(correlation_id, invocation);
        Ok(())
    }

    /// Completes the request registered under the response's correlation ID.
    ///
    /// Exception responses complete it with the decoded server error.
    /// Returns `false` if no such request is pending.
    pub fn resolve(&self, response: ClientMessage) -> bool {
        let correlation_id = response.correlation_id();
        let Some(invocation) = lock(&self.pending).remove(&correlation_id) else {
            tracing::debug!(correlation_id, "dropping response for unknown correlation id");
            return false;
        };

        tracing::trace!(
            correlation_id,
            connection = %invocation.connection_id,
            elapsed_us = invocation.issued_at.elapsed().as_micros() as u64,
            "resolved invocation"
        );

        if error_codec::is_exception(&response) {
            invocation.complete(Err(error_codec::decode(response)));
        } else {
            invocation.complete(Ok(response));
        }
        true
    }

    /// Removes a pending request without completing it.
    pub fn remove(&self, correlation_id: i32) -> Option<PendingInvocation> {
        lock(&self.pending).remove(&correlation_id)
    }

    /// Completes a pending request with an error.
    pub fn fail(&self, correlation_id: i32, cause: HazelcastError) -> bool {
        match self.remove(correlation_id) {
            Some(invocation) => {
                invocation.complete(Err(cause));
                true
            }
            None => false,
        }
    }

    /// Fails every request pending on a connection that went away.
    ///
    /// Returns the number of requests failed.
    pub fn fail_connection(&self, connection_id: ConnectionId, reason: &str) -> usize {
        let failed: Vec<PendingInvocation> = {
            let mut pending = lock(&self.pending);
            let ids: Vec<i32> = pending
                .iter()
                .filter(|(_, inv)| inv.connection_id == connection_id)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter().filter_map(|id| pending.remove(&id)).collect()
        };

        let count = failed.len();
        for invocation in failed {
            invocation.complete(Err(HazelcastError::Connection(reason.to_string())));
        }
        if count > 0 {
            tracing::debug!(connection = %connection_id, count, "failed pending invocations");
        }
        count
    }

    /// Fails every pending request.
    pub fn fail_all(&self, reason: &str) -> usize {
        let failed: Vec<PendingInvocation> =
            lock(&self.pending).drain().map(|(_, inv)| inv).collect();
        let count = failed.len();
        for invocation in failed {
            invocation.complete(Err(HazelcastError::Connection(reason.to_string())));
        }
        count
    }

    /// Returns the number of pending requests.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Returns `true` if a request is pending under `correlation_id`.
    pub fn is_pending(&self, correlation_id: i32) -> bool {
        lock(&self.pending).contains_key(&correlation_id)
    }

    /// Registers the handler that receives events sent under `correlation_id`.
    pub fn register_listener(
        &self,
        correlation_id: i32,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        let mut listeners = lock(&self.listeners);
        if listeners.contains_key(&correlation_id) {
            return Err(duplicate(correlation_id));
        }
        listeners.insert(correlation_id, handler);
        Ok(())
    }

    /// Removes a listener. Returns `false` if none was registered.
    pub fn deregister_listener(&self, correlation_id: i32) -> bool {
        lock(&self.listeners).remove(&correlation_id).is_some()
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Hands an event frame to the listener registered under its
    /// correlation ID. Returns `false` if there is none.
    pub fn dispatch_event(&self, event: ClientMessage) -> bool {
        let correlation_id = event.correlation_id();
        let handler = lock(&self.listeners).get(&correlation_id).cloned();
        match handler {
            Some(handler) => {
                handler.handle(event);
                true
            }
            None => {
                tracing::debug!(correlation_id, "dropping event without listener");
                false
            }
        }
    }
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("pending", &self.pending_count())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn duplicate(correlation_id: i32) -> HazelcastError {
    HazelcastError::IllegalArgument(format!(
        "correlation id {} is already in use",
        correlation_id
    ))
}
