//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hazelcast_protocol::codecs::encode_response;
use hazelcast_protocol::codecs::error::{self as error_codec, error_codes};
use hazelcast_protocol::protocol::{LISTENER_FLAG, RESPONSE_INTEGER, RESPONSE_VOID};
use hazelcast_transport::{
    ClientMessage, Connection, ConnectionId, HazelcastError, InvocationConfig, InvocationService,
    PartitionTable, Result,
};
use tokio::sync::mpsc;

/// An in-memory connection that records every message it is asked to send.
#[derive(Debug)]
pub struct MockConnection {
    id: ConnectionId,
    alive: AtomicBool,
    sent: Mutex<Vec<ClientMessage>>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
}

impl MockConnection {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ClientMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            alive: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            outbound,
        });
        (connection, rx)
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent_correlation_ids(&self) -> Vec<i32> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.correlation_id())
            .collect()
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, message: ClientMessage) -> Result<()> {
        if !self.is_alive() {
            return Err(HazelcastError::Connection(format!("{} is closed", self.id)));
        }
        self.sent.lock().unwrap().push(message.clone());
        let _ = self.outbound.send(message);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.set_alive(false);
    }
}

/// A service whose partitions are all owned by one mock connection.
pub struct SingleMember {
    pub service: Arc<InvocationService>,
    pub table: Arc<PartitionTable>,
    pub connection: Arc<MockConnection>,
    pub requests: mpsc::UnboundedReceiver<ClientMessage>,
}

pub const PARTITION_COUNT: i32 = 4;

pub async fn single_member(config: InvocationConfig) -> SingleMember {
    let table = Arc::new(PartitionTable::new(PARTITION_COUNT));
    let (connection, requests) = MockConnection::new();
    table.add_connection(connection.clone()).await;
    table
        .update_partition_table(PARTITION_COUNT, vec![(connection.id(), (0..PARTITION_COUNT).collect())])
        .await
        .expect("failed to assign partitions");

    let service = Arc::new(InvocationService::new(config, table.clone()));
    SingleMember {
        service,
        table,
        connection,
        requests,
    }
}

/// Retry settings with backoffs short enough for tests.
pub fn fast_retry_config(max_attempts: u32) -> InvocationConfig {
    InvocationConfig::builder()
        .invocation_timeout(Duration::from_secs(5))
        .retry(|r| {
            r.max_attempts(max_attempts)
                .initial_backoff(Duration::from_millis(10))
                .max_backoff(Duration::from_millis(40))
        })
        .build()
        .expect("failed to build config")
}

pub fn request(message_type: u16) -> ClientMessage {
    let mut message = ClientMessage::create_for_encode(0);
    message.set_message_type(message_type).update_frame_length();
    message
}

pub fn int_response(correlation_id: i32, value: i32) -> ClientMessage {
    encode_response(RESPONSE_INTEGER, correlation_id, |m| {
        m.append_int(value);
    })
}

pub fn void_response(correlation_id: i32) -> ClientMessage {
    encode_response(RESPONSE_VOID, correlation_id, |_| {})
}

pub fn event(correlation_id: i32, value: i32) -> ClientMessage {
    let mut message = int_response(correlation_id, value);
    message.add_flag(LISTENER_FLAG);
    message
}

/// An exception response the engine treats as transient.
pub fn retryable_error(correlation_id: i32) -> ClientMessage {
    error_codec::encode(
        correlation_id,
        error_codes::PARTITION_MIGRATING,
        "PartitionMigratingException",
        Some("partition is migrating"),
    )
}

/// Receives the next outbound request, failing the test after one second.
pub async fn next_request(requests: &mut mpsc::UnboundedReceiver<ClientMessage>) -> ClientMessage {
    tokio::time::timeout(Duration::from_secs(1), requests.recv())
        .await
        .expect("no request was sent")
        .expect("request channel closed")
}

/// Answers every request with the message built by `respond`.
pub fn spawn_responder<F>(
    service: Arc<InvocationService>,
    mut requests: mpsc::UnboundedReceiver<ClientMessage>,
    respond: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(ClientMessage) -> ClientMessage + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            service.handle_message(respond(request));
        }
    })
}
