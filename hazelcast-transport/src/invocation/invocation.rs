//! A single logical request and the caller's handle to its outcome.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use hazelcast_protocol::{ClientMessage, HazelcastError, Result};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::listener::EventHandler;

/// Where the requests of an invocation are sent.
#[derive(Debug, Clone)]
pub enum InvocationTarget {
    /// The current owner of a partition, looked up before every attempt.
    Partition(i32),
    /// A fixed connection.
    Connection(Arc<dyn Connection>),
    /// Any live connection.
    Any,
}

/// Progress of an invocation, shared between its driver and its handle.
#[derive(Debug, Default)]
pub(crate) struct InvocationState {
    attempts: AtomicU32,
    correlation_id: AtomicI32,
    connection: Mutex<Option<Arc<dyn Connection>>>,
}

impl InvocationState {
    pub(crate) fn begin_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn set_correlation_id(&self, correlation_id: i32) {
        self.correlation_id.store(correlation_id, Ordering::Release);
    }

    pub(crate) fn set_connection(&self, connection: Arc<dyn Connection>) {
        *self.connection.lock().unwrap_or_else(|p| p.into_inner()) = Some(connection);
    }

    pub(crate) fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub(crate) fn correlation_id(&self) -> i32 {
        self.correlation_id.load(Ordering::Acquire)
    }
}

/// One logical request, possibly sent several times.
///
/// Every attempt sends the same payload under a fresh correlation ID.
pub(crate) struct Invocation {
    pub(crate) message: ClientMessage,
    pub(crate) target: InvocationTarget,
    pub(crate) retryable: bool,
    pub(crate) issued_at: Instant,
    pub(crate) deadline: Instant,
    pub(crate) listener: Option<Arc<dyn EventHandler>>,
    pub(crate) state: Arc<InvocationState>,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("message_type", &self.message.message_type())
            .field("target", &self.target)
            .field("retryable", &self.retryable)
            .field("attempts", &self.state.attempts())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

/// The caller's handle to a running invocation.
///
/// Resolves exactly once, with the response or the terminal error.
/// Dropping the handle abandons the invocation.
#[derive(Debug)]
pub struct InvocationHandle {
    state: Arc<InvocationState>,
    cancel: CancellationToken,
    completion: oneshot::Receiver<Result<ClientMessage>>,
}

impl InvocationHandle {
    pub(crate) fn new(
        state: Arc<InvocationState>,
        cancel: CancellationToken,
        completion: oneshot::Receiver<Result<ClientMessage>>,
    ) -> Self {
        Self {
            state,
            cancel,
            completion,
        }
    }

    /// Returns a handle that is already completed with `error`.
    pub(crate) fn failed(error: HazelcastError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self::new(Arc::default(), CancellationToken::new(), rx)
    }

    /// Cancels the invocation.
    ///
    /// The handle then resolves with [`HazelcastError::Cancelled`] unless a
    /// response already completed it. A response arriving later is dropped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns how many times the request has been sent so far.
    pub fn attempts(&self) -> u32 {
        self.state.attempts()
    }

    /// Returns the correlation ID of the latest attempt, or zero before the
    /// first send.
    pub fn correlation_id(&self) -> i32 {
        self.state.correlation_id()
    }

    /// Returns the connection the latest attempt was sent on.
    pub(crate) fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.state.connection()
    }
}

impl Future for InvocationHandle {
    type Output = Result<ClientMessage>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.completion).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                Err(HazelcastError::Cancelled(
                    "invocation was dropped before completing".to_string(),
                ))
            })
        })
    }
}
