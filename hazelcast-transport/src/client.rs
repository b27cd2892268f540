//! Client facade wiring connections, routing and the invocation engine.

use std::net::SocketAddr;
use std::sync::Arc;

use hazelcast_protocol::{HazelcastError, Result};

use crate::cluster::{PartitionRouter, PartitionTable};
use crate::config::InvocationConfig;
use crate::connection::{Connection, TcpConnection};
use crate::invocation::InvocationService;
use crate::proxy::Semaphore;

/// Entry point for invoking operations on a cluster.
#[derive(Debug)]
pub struct TransportClient {
    service: Arc<InvocationService>,
    partition_table: Option<Arc<PartitionTable>>,
    connections: Vec<Arc<TcpConnection>>,
}

impl TransportClient {
    /// Creates a client that routes through an existing partition router.
    pub fn new(config: InvocationConfig, router: Arc<dyn PartitionRouter>) -> Self {
        Self {
            service: Arc::new(InvocationService::new(config, router)),
            partition_table: None,
            connections: Vec::new(),
        }
    }

    /// Connects to every address and spreads `partition_count` partitions
    /// over the connections in round-robin order.
    ///
    /// The assignment can be replaced later through
    /// [`partition_table`](Self::partition_table).
    ///
    /// # Errors
    ///
    /// Returns [`HazelcastError::Configuration`] if `addresses` is empty and
    /// [`HazelcastError::Connection`] if any member cannot be reached.
    pub async fn connect(
        config: InvocationConfig,
        addresses: &[SocketAddr],
        partition_count: i32,
    ) -> Result<Self> {
        if addresses.is_empty() {
            return Err(HazelcastError::Configuration(
                "at least one member address is required".to_string(),
            ));
        }

        let table = Arc::new(PartitionTable::new(partition_count));
        let router: Arc<dyn PartitionRouter> = table.clone();
        let service = Arc::new(InvocationService::new(config, router));

        let mut connections = Vec::with_capacity(addresses.len());
        for address in addresses {
            let connection = TcpConnection::connect(*address, Arc::clone(&service)).await?;
            table.add_connection(connection.clone()).await;
            connections.push(connection);
        }

        let mut assignments: Vec<_> = connections.iter().map(|c| (c.id(), Vec::new())).collect();
        for partition_id in 0..partition_count.max(0) {
            let index = partition_id as usize % assignments.len();
            assignments[index].1.push(partition_id);
        }
        if partition_count > 0 {
            table
                .update_partition_table(partition_count, assignments)
                .await?;
        }

        tracing::info!(
            members = connections.len(),
            partition_count,
            "connected to Hazelcast cluster"
        );

        Ok(Self {
            service,
            partition_table: Some(table),
            connections,
        })
    }

    /// Returns the invocation engine.
    pub fn invocation_service(&self) -> &Arc<InvocationService> {
        &self.service
    }

    /// Returns the partition table built by [`connect`](Self::connect).
    pub fn partition_table(&self) -> Option<&Arc<PartitionTable>> {
        self.partition_table.as_ref()
    }

    /// Returns a distributed Semaphore proxy for the given name.
    pub fn get_semaphore(&self, name: &str) -> Semaphore {
        Semaphore::new(name.to_string(), Arc::clone(&self.service))
    }

    /// Shuts the client down.
    ///
    /// Pending invocations fail and the connections opened by
    /// [`connect`](Self::connect) are closed.
    pub fn shutdown(&self) {
        tracing::info!(
            pending = self.service.pending_count(),
            "shutting down Hazelcast client"
        );
        self.service.shutdown();
        for connection in &self.connections {
            connection.close();
        }
    }
}
