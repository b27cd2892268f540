//! Single connection to a Hazelcast cluster member.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use hazelcast_protocol::{ClientMessage, ClientMessageCodec, HazelcastError, Result};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::invocation::InvocationService;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An outbound channel to one cluster member.
///
/// Implementations write each message as whole frames; concurrent senders
/// never interleave bytes of different messages.
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Returns the connection's unique identifier.
    fn id(&self) -> ConnectionId;

    /// Writes one message to the member.
    async fn send(&self, message: ClientMessage) -> Result<()>;

    /// Returns `false` once the connection has been torn down.
    fn is_alive(&self) -> bool;

    /// Tears the connection down.
    ///
    /// Sends fail afterwards and requests pending on it fail with a
    /// connection error.
    fn close(&self);
}

/// A TCP connection to a Hazelcast cluster member.
///
/// Writes are serialized by a lock around the framed writer. A reader task
/// feeds every inbound message to the [`InvocationService`] and, when the
/// stream ends or a framing error occurs, fails the invocations still
/// pending on this connection.
#[derive(Debug)]
pub struct TcpConnection {
    id: ConnectionId,
    address: SocketAddr,
    writer: Mutex<FramedWrite<OwnedWriteHalf, ClientMessageCodec>>,
    alive: Arc<AtomicBool>,
    shutdown: CancellationToken,
    created_at: Instant,
}

impl TcpConnection {
    /// Establishes a new connection to the given address.
    pub async fn connect(
        address: SocketAddr,
        service: Arc<InvocationService>,
    ) -> Result<Arc<Self>> {
        let stream = TcpStream::connect(address).await.map_err(|e| {
            HazelcastError::Connection(format!("failed to connect to {}: {}", address, e))
        })?;

        stream.set_nodelay(true).map_err(|e| {
            HazelcastError::Connection(format!("failed to set TCP_NODELAY: {}", e))
        })?;

        tracing::debug!(address = %address, "established connection");
        Ok(Self::from_stream(stream, address, service))
    }

    /// Wraps an established TCP stream and starts its reader task.
    ///
    /// Must be called within a tokio runtime.
    pub fn from_stream(
        stream: TcpStream,
        address: SocketAddr,
        service: Arc<InvocationService>,
    ) -> Arc<Self> {
        let max_frame_length = service.config().max_frame_length();
        let (read_half, write_half) = stream.into_split();

        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            address,
            writer: Mutex::new(FramedWrite::new(write_half, ClientMessageCodec::new())),
            alive: Arc::new(AtomicBool::new(true)),
            shutdown: CancellationToken::new(),
            created_at: Instant::now(),
        });

        let reader = FramedRead::new(
            read_half,
            ClientMessageCodec::with_max_frame_length(max_frame_length),
        );
        tokio::spawn(read_loop(
            reader,
            connection.id,
            service,
            Arc::clone(&connection.alive),
            connection.shutdown.clone(),
        ));

        connection
    }

    /// Returns the remote address of this connection.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns when this connection was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, message: ClientMessage) -> Result<()> {
        if !self.is_alive() {
            return Err(HazelcastError::Connection(format!(
                "connection {} to {} is closed",
                self.id, self.address
            )));
        }

        let correlation_id = message.correlation_id();
        let mut writer = self.writer.lock().await;
        match writer.send(message).await {
            Ok(()) => {
                tracing::trace!(connection = %self.id, correlation_id, "sent message");
                Ok(())
            }
            // A malformed outbound message leaves the stream intact.
            Err(e @ HazelcastError::Protocol(_)) => Err(e),
            Err(e) => {
                tracing::warn!(connection = %self.id, error = %e, "write failed, closing connection");
                self.close();
                Err(HazelcastError::Connection(format!(
                    "failed to write to {}: {}",
                    self.address, e
                )))
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.alive.store(false, Ordering::Release);
        self.shutdown.cancel();
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn read_loop(
    mut reader: FramedRead<OwnedReadHalf, ClientMessageCodec>,
    id: ConnectionId,
    service: Arc<InvocationService>,
    alive: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break format!("connection {} closed", id),
            frame = reader.next() => match frame {
                Some(Ok(message)) => service.handle_message(message),
                Some(Err(e)) => {
                    tracing::warn!(connection = %id, error = %e, "failed to read message, closing connection");
                    break format!("connection {} failed: {}", id, e);
                }
                None => break format!("connection {} closed by peer", id),
            }
        }
    };

    alive.store(false, Ordering::Release);
    shutdown.cancel();
    service.connection_closed(id, &reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::PartitionTable;
    use crate::config::InvocationConfig;
    use hazelcast_protocol::codecs::encode_response;
    use hazelcast_protocol::codecs::error::error_codes;
    use hazelcast_protocol::codecs::semaphore::SemaphoreAvailablePermits;
    use hazelcast_protocol::protocol::{RESPONSE_EXCEPTION, RESPONSE_INTEGER};
    use tokio::net::TcpListener;
    use tokio_util::codec::Framed;

    #[test]
    fn test_connection_id_uniqueness() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id2.value() > id1.value());
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new();
        assert_eq!(id.to_string(), format!("conn-{}", id.value()));
    }

    #[test]
    fn test_tcp_connection_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TcpConnection>();
        assert_send_sync::<Arc<dyn Connection>>();
    }

    fn service() -> Arc<InvocationService> {
        Arc::new(InvocationService::new(
            InvocationConfig::default(),
            Arc::new(PartitionTable::new(1)),
        ))
    }

    #[tokio::test]
    async fn test_request_response_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let member = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(socket, ClientMessageCodec::new());
            let request = framed.next().await.unwrap().unwrap();
            let response = encode_response(RESPONSE_INTEGER, request.correlation_id(), |m| {
                m.append_int(99);
            });
            framed.send(response).await.unwrap();
        });

        let service = service();
        let connection = TcpConnection::connect(address, Arc::clone(&service))
            .await
            .unwrap();
        assert!(connection.is_alive());

        let mut request = ClientMessage::create_for_encode(0);
        request.set_message_type(0x0d03).update_frame_length();
        let mut response = service
            .invoke_on_connection(request, connection.clone())
            .await
            .unwrap();
        assert_eq!(response.read_int().unwrap(), 99);

        member.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_close_fails_pending_invocation() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let member = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(socket, ClientMessageCodec::new());
            let _ = framed.next().await;
            drop(framed);
        });

        let service = service();
        let connection = TcpConnection::connect(address, Arc::clone(&service))
            .await
            .unwrap();

        let mut request = ClientMessage::create_for_encode(0);
        request.set_message_type(0x0d02).update_frame_length();
        let err = service
            .invoke_on_connection(request, connection.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, HazelcastError::Connection(_)));

        member.await.unwrap();
        assert_eq!(service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_on_closed_connection_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let connection = TcpConnection::connect(address, service()).await.unwrap();
        let _socket = accept.await.unwrap();

        connection.close();
        assert!(!connection.is_alive());

        let mut request = ClientMessage::create_for_encode(0);
        request.update_frame_length();
        assert!(matches!(
            connection.send(request).await.unwrap_err(),
            HazelcastError::Connection(_)
        ));
    }

    #[tokio::test]
    async fn test_truncated_response_payload_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let member = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(socket, ClientMessageCodec::new());
            let request = framed.next().await.unwrap().unwrap();
            // One byte where a four byte integer is expected.
            let response = encode_response(RESPONSE_INTEGER, request.correlation_id(), |m| {
                m.append_byte(1);
            });
            framed.send(response).await.unwrap();
            framed
        });

        let table = Arc::new(PartitionTable::new(1));
        let service = Arc::new(InvocationService::new(
            InvocationConfig::default(),
            table.clone(),
        ));
        let connection = TcpConnection::connect(address, Arc::clone(&service))
            .await
            .unwrap();
        table.add_connection(connection.clone()).await;
        table
            .update_partition_table(1, vec![(connection.id(), vec![0])])
            .await
            .unwrap();

        let err = service
            .invoke_codec(&SemaphoreAvailablePermits { name: "gate" }, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, HazelcastError::Protocol(_)));
        assert!(!connection.is_alive());

        assert_eq!(service.pending_count(), 0);
        drop(member.await.unwrap());
    }

    #[tokio::test]
    async fn test_truncated_exception_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let member = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(socket, ClientMessageCodec::new());
            let request = framed.next().await.unwrap().unwrap();
            let response = encode_response(RESPONSE_EXCEPTION, request.correlation_id(), |m| {
                m.append_int(error_codes::ILLEGAL_STATE);
            });
            framed.send(response).await.unwrap();
            framed
        });

        let service = service();
        let connection = TcpConnection::connect(address, Arc::clone(&service))
            .await
            .unwrap();

        let mut request = ClientMessage::create_for_encode(0);
        request.set_message_type(0x0d02).update_frame_length();
        let err = service
            .invoke_on_connection(request, connection.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, HazelcastError::Protocol(_)));
        assert!(!connection.is_alive());
        drop(member.await.unwrap());
    }
}
