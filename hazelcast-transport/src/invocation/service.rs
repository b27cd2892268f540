//! The invocation engine: dispatch, retry and response routing.

use std::sync::Arc;
use std::time::Duration;

use hazelcast_protocol::codecs::{self, RequestCodec};
use hazelcast_protocol::protocol::PARTITION_ID_ANY;
use hazelcast_protocol::{ClientMessage, HazelcastError, Result};
use rand::Rng;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Deadline horizon used when the configured timeout does not fit an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

use super::invocation::{Invocation, InvocationHandle, InvocationState, InvocationTarget};
use super::registry::{CorrelationRegistry, PendingInvocation};
use crate::cluster::PartitionRouter;
use crate::config::InvocationConfig;
use crate::connection::{Connection, ConnectionId};
use crate::listener::{EventHandler, ListenerRegistration};

/// Sends requests, correlates responses and retries transient failures.
///
/// Each invocation runs on its own task. An attempt resolves its target,
/// registers a fresh correlation ID, sends the message and waits for the
/// matching response. Retryable failures of retryable operations are
/// retried with exponential backoff until the attempt limit or the
/// invocation deadline is reached.
///
/// Cloning is cheap; clones share the registry and router.
#[derive(Debug, Clone)]
pub struct InvocationService {
    config: Arc<InvocationConfig>,
    registry: Arc<CorrelationRegistry>,
    router: Arc<dyn PartitionRouter>,
    shutdown: CancellationToken,
}

impl InvocationService {
    /// Creates an invocation service routing through `router`.
    pub fn new(config: InvocationConfig, router: Arc<dyn PartitionRouter>) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(CorrelationRegistry::new()),
            router,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the invocation configuration.
    pub fn config(&self) -> &InvocationConfig {
        &self.config
    }

    /// Returns the partition router.
    pub fn router(&self) -> &Arc<dyn PartitionRouter> {
        &self.router
    }

    /// Returns the correlation registry.
    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    /// Returns the number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Invokes `message` on the owner of its partition, or on any connection
    /// if it has no partition affinity.
    ///
    /// Partition-bound operations without a partition ID are never sent to
    /// an arbitrary member; they wait for a partition like any other unknown
    /// owner.
    ///
    /// # Errors
    ///
    /// The returned handle resolves with:
    /// - [`HazelcastError::Cancelled`] if the service is shut down or the
    ///   invocation is cancelled
    /// - [`HazelcastError::Timeout`] once the invocation timeout elapses
    /// - the last attempt's error when retries are exhausted or the failure
    ///   is not retryable
    pub fn invoke(&self, message: ClientMessage) -> InvocationHandle {
        let target = match message.partition_id() {
            PARTITION_ID_ANY => InvocationTarget::Any,
            partition_id => InvocationTarget::Partition(partition_id),
        };
        self.start(message, target, None)
    }

    /// Invokes `message` on the owner of `partition_id`.
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke). While the partition has no live
    /// owner, attempts fail with the retryable
    /// [`HazelcastError::UnknownPartition`].
    pub fn invoke_on_partition(
        &self,
        mut message: ClientMessage,
        partition_id: i32,
    ) -> InvocationHandle {
        message.set_partition_id(partition_id);
        self.start(message, InvocationTarget::Partition(partition_id), None)
    }

    /// Invokes `message` on a fixed connection.
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke). Retries go to the same connection.
    pub fn invoke_on_connection(
        &self,
        message: ClientMessage,
        connection: Arc<dyn Connection>,
    ) -> InvocationHandle {
        self.start(message, InvocationTarget::Connection(connection), None)
    }

    /// Encodes `request`, invokes it and decodes the response.
    ///
    /// # Errors
    ///
    /// Returns the invocation's error, as for [`invoke`](Self::invoke), or
    /// the decoding error of the response:
    /// - [`HazelcastError::Serialization`] for a response of the wrong type
    /// - [`HazelcastError::Protocol`] for a payload that overruns its frame;
    ///   the connection it arrived on is then closed
    pub async fn invoke_codec<C: RequestCodec>(
        &self,
        request: &C,
        partition_id: i32,
    ) -> Result<C::Response> {
        let message = request.encode_request();
        let mut handle = if partition_id == PARTITION_ID_ANY {
            self.invoke(message)
        } else {
            self.invoke_on_partition(message, partition_id)
        };
        let response = (&mut handle).await?;
        C::decode_response(response).map_err(|err| {
            if let (HazelcastError::Protocol(_), Some(connection)) = (&err, handle.connection()) {
                self.close_connection(&connection, &err);
            }
            err
        })
    }

    /// Sends a listener registration request and routes the events that
    /// follow it to `handler`.
    ///
    /// The handler is installed before each attempt is sent, so events that
    /// overtake the registration response are not lost. Returns the
    /// registration together with the registration response.
    ///
    /// # Errors
    ///
    /// Returns the registration invocation's error, as for
    /// [`invoke`](Self::invoke). No handler stays installed after a failure.
    pub async fn register_listener(
        &self,
        message: ClientMessage,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(ListenerRegistration, ClientMessage)> {
        let target = match message.partition_id() {
            PARTITION_ID_ANY => InvocationTarget::Any,
            partition_id => InvocationTarget::Partition(partition_id),
        };
        let response = self.start(message, target, Some(handler)).await?;
        let registration = ListenerRegistration::new(response.correlation_id());
        tracing::debug!(
            listener = %registration.id(),
            correlation_id = registration.correlation_id(),
            "registered listener"
        );
        Ok((registration, response))
    }

    /// Stops routing events to a listener's handler.
    ///
    /// Returns `false` if the registration was already removed.
    pub fn deregister_listener(&self, registration: &ListenerRegistration) -> bool {
        self.registry.deregister_listener(registration.correlation_id())
    }

    /// Routes one inbound message: events go to their listener, everything
    /// else completes the pending request with the same correlation ID.
    pub fn handle_message(&self, message: ClientMessage) {
        if message.is_event() {
            self.registry.dispatch_event(message);
        } else {
            self.registry.resolve(message);
        }
    }

    /// Fails every request pending on a connection that was torn down.
    pub fn connection_closed(&self, connection_id: ConnectionId, reason: &str) {
        let failed = self.registry.fail_connection(connection_id, reason);
        tracing::warn!(connection = %connection_id, failed, reason, "connection closed");
    }

    /// Tears down a connection whose inbound stream can no longer be trusted.
    fn close_connection(&self, connection: &Arc<dyn Connection>, cause: &HazelcastError) {
        let id = connection.id();
        tracing::warn!(connection = %id, error = %cause, "malformed response, closing connection");
        connection.close();
        self.connection_closed(
            id,
            &format!("connection {} closed after malformed response: {}", id, cause),
        );
    }

    /// Stops the service. Running invocations resolve with
    /// [`HazelcastError::Cancelled`] and new ones fail immediately.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let failed = self.registry.fail_all("invocation service is shut down");
        tracing::debug!(failed, "invocation service shut down");
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn start(
        &self,
        message: ClientMessage,
        target: InvocationTarget,
        listener: Option<Arc<dyn EventHandler>>,
    ) -> InvocationHandle {
        if self.is_shutdown() {
            return InvocationHandle::failed(HazelcastError::Cancelled(
                "invocation service is shut down".to_string(),
            ));
        }

        let descriptor = codecs::operation(message.message_type());
        let retryable = descriptor.map_or(false, |op| op.retryable) || message.is_retryable();
        let target = match target {
            InvocationTarget::Any if descriptor.map_or(false, |op| op.partition_bound) => {
                InvocationTarget::Partition(PARTITION_ID_ANY)
            }
            target => target,
        };
        let issued_at = Instant::now();
        let deadline = issued_at
            .checked_add(self.config.invocation_timeout())
            .unwrap_or_else(|| issued_at + FAR_FUTURE);
        let invocation = Invocation {
            message,
            target,
            retryable,
            issued_at,
            deadline,
            listener,
            state: Arc::default(),
        };

        let (done_tx, done_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let handle = InvocationHandle::new(Arc::clone(&invocation.state), cancel.clone(), done_rx);

        let span = tracing::debug_span!(
            "invocation",
            message_type = invocation.message.message_type(),
            retryable
        );
        tokio::spawn(self.clone().run(invocation, done_tx, cancel).instrument(span));
        handle
    }

    async fn run(
        self,
        mut invocation: Invocation,
        mut done_tx: oneshot::Sender<Result<ClientMessage>>,
        cancel: CancellationToken,
    ) {
        let state = Arc::clone(&invocation.state);
        let deadline = invocation.deadline;
        let has_listener = invocation.listener.is_some();

        let result = tokio::select! {
            result = self.drive(&mut invocation) => Some(result),
            _ = cancel.cancelled() => Some(Err(HazelcastError::Cancelled(
                "invocation was cancelled".to_string(),
            ))),
            _ = self.shutdown.cancelled() => Some(Err(HazelcastError::Cancelled(
                "invocation service is shut down".to_string(),
            ))),
            _ = tokio::time::sleep_until(deadline) => Some(Err(HazelcastError::Timeout(format!(
                "invocation timed out after {:?}",
                self.config.invocation_timeout()
            )))),
            _ = done_tx.closed() => None,
        };

        // The attempt in flight, if any, must not be completed later.
        let correlation_id = state.correlation_id();
        let failed = !matches!(result, Some(Ok(_)));
        if failed {
            if self.registry.remove(correlation_id).is_some() {
                tracing::debug!(correlation_id, "abandoned pending request");
            }
            if has_listener {
                self.registry.deregister_listener(correlation_id);
            }
        }

        if let Some(result) = result {
            tracing::trace!(
                attempts = state.attempts(),
                elapsed_ms = invocation.issued_at.elapsed().as_millis() as u64,
                ok = result.is_ok(),
                "invocation completed"
            );
            let _ = done_tx.send(result);
        }
    }

    async fn drive(&self, invocation: &mut Invocation) -> Result<ClientMessage> {
        let retry = self.config.retry();
        let mut backoff = retry.initial_backoff();

        loop {
            let attempt = invocation.state.begin_attempt();
            let err = match self.attempt(invocation).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if !invocation.retryable || !err.is_retryable() || attempt >= retry.max_attempts() {
                return Err(err);
            }
            let resumes_at = Instant::now().checked_add(backoff);
            if resumes_at.map_or(true, |at| at >= invocation.deadline) {
                tracing::debug!(attempt, error = %err, "deadline leaves no room for another attempt");
                return Err(err);
            }

            tracing::debug!(
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "retrying invocation"
            );
            tokio::time::sleep(backoff).await;
            backoff = calculate_backoff_with_jitter(
                backoff,
                retry.multiplier(),
                retry.max_backoff(),
                retry.jitter(),
            );
        }
    }

    async fn attempt(&self, invocation: &mut Invocation) -> Result<ClientMessage> {
        let connection = match &invocation.target {
            InvocationTarget::Partition(partition_id) => self.router.owner_of(*partition_id).await?,
            InvocationTarget::Connection(connection) => Arc::clone(connection),
            InvocationTarget::Any => self.router.any_connection().await?,
        };

        invocation.state.set_connection(Arc::clone(&connection));
        let correlation_id = self.registry.next_correlation_id();
        invocation.state.set_correlation_id(correlation_id);
        invocation.message.set_correlation_id(correlation_id);

        let (tx, rx) = oneshot::channel();
        let pending = PendingInvocation::new(connection.id(), invocation.message.message_type(), tx);
        self.registry.register(correlation_id, pending)?;
        if let Some(handler) = &invocation.listener {
            if let Err(e) = self.registry.register_listener(correlation_id, Arc::clone(handler)) {
                self.registry.remove(correlation_id);
                return Err(e);
            }
        }

        tracing::trace!(correlation_id, connection = %connection.id(), "sending request");
        let result = match connection.send(invocation.message.clone()).await {
            Ok(()) => {
                let result = rx.await.unwrap_or_else(|_| {
                    Err(HazelcastError::Connection(
                        "pending request was discarded".to_string(),
                    ))
                });
                // Only response decoding completes an entry with a protocol error.
                if let Err(err @ HazelcastError::Protocol(_)) = &result {
                    self.close_connection(&connection, err);
                }
                result
            }
            Err(e) => {
                self.registry.remove(correlation_id);
                Err(e)
            }
        };

        if result.is_err() && invocation.listener.is_some() {
            self.registry.deregister_listener(correlation_id);
        }
        result
    }
}

/// Grows `current_backoff` by `multiplier`, applies up to `jitter` of random
/// spread and caps the result at `max_backoff`.
fn calculate_backoff_with_jitter(
    current_backoff: Duration,
    multiplier: f64,
    max_backoff: Duration,
    jitter: f64,
) -> Duration {
    let base_backoff = current_backoff.as_secs_f64() * multiplier;

    let jitter_factor = if jitter > 0.0 {
        let mut rng = rand::thread_rng();
        1.0 + rng.gen_range(-jitter..=jitter)
    } else {
        1.0
    };

    let jittered_backoff = (base_backoff * jitter_factor).min(max_backoff.as_secs_f64());
    Duration::from_secs_f64(jittered_backoff.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::PartitionTable;

    #[test]
    fn test_backoff_grows_and_caps() {
        let max = Duration::from_secs(5);
        let mut backoff = Duration::from_millis(100);
        backoff = calculate_backoff_with_jitter(backoff, 2.0, max, 0.0);
        assert_eq!(backoff, Duration::from_millis(200));
        for _ in 0..10 {
            backoff = calculate_backoff_with_jitter(backoff, 2.0, max, 0.0);
        }
        assert_eq!(backoff, max);
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        for _ in 0..100 {
            let backoff = calculate_backoff_with_jitter(
                Duration::from_millis(100),
                2.0,
                Duration::from_secs(5),
                0.5,
            );
            assert!(backoff >= Duration::from_millis(100));
            assert!(backoff <= Duration::from_millis(300));
        }
    }

    #[tokio::test]
    async fn test_invoke_after_shutdown_fails() {
        let service = InvocationService::new(
            InvocationConfig::default(),
            Arc::new(PartitionTable::new(1)),
        );
        service.shutdown();
        assert!(service.is_shutdown());

        let err = service
            .invoke(ClientMessage::create_for_encode(0))
            .await
            .unwrap_err();
        assert!(matches!(err, HazelcastError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_non_retryable_routing_failure_surfaces() {
        let service = InvocationService::new(
            InvocationConfig::default(),
            Arc::new(PartitionTable::new(0)),
        );
        let mut message = ClientMessage::create_for_encode(0);
        message.update_frame_length();

        let handle = service.invoke(message);
        let err = handle.await.unwrap_err();
        assert!(matches!(err, HazelcastError::Connection(_)));
    }

    #[tokio::test]
    async fn test_huge_timeout_does_not_overflow_deadline() {
        let config = InvocationConfig::builder()
            .invocation_timeout(Duration::from_secs(u64::MAX))
            .build()
            .unwrap();
        let service = InvocationService::new(config, Arc::new(PartitionTable::new(0)));
        let mut message = ClientMessage::create_for_encode(0);
        message.update_frame_length();

        let err = service.invoke(message).await.unwrap_err();
        assert!(matches!(err, HazelcastError::Connection(_)));
    }

    #[test]
    fn test_service_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<InvocationService>();
    }
}
