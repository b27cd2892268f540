//! Partition routing: which connection owns which partition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hazelcast_protocol::{HazelcastError, Result};
use tokio::sync::RwLock;

use crate::connection::{Connection, ConnectionId};

/// Resolves partitions to the connections that currently own them.
///
/// The invocation engine asks the router before every attempt, so a
/// partition that moved between attempts is followed to its new owner.
#[async_trait]
pub trait PartitionRouter: Send + Sync + std::fmt::Debug {
    /// Returns the connection to the owner of `partition_id`.
    ///
    /// Fails with [`HazelcastError::UnknownPartition`] while the owner is not
    /// known.
    async fn owner_of(&self, partition_id: i32) -> Result<Arc<dyn Connection>>;

    /// Returns any live connection, for requests without partition affinity.
    async fn any_connection(&self) -> Result<Arc<dyn Connection>>;

    /// Returns the number of partitions, or zero while it is unknown.
    fn partition_count(&self) -> i32;
}

/// A partition table fed with explicit ownership assignments.
#[derive(Debug, Default)]
pub struct PartitionTable {
    connections: RwLock<HashMap<ConnectionId, Arc<dyn Connection>>>,
    owners: RwLock<HashMap<i32, ConnectionId>>,
    partition_count: AtomicI32,
}

impl PartitionTable {
    /// Creates an empty table for `partition_count` partitions.
    pub fn new(partition_count: i32) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
            partition_count: AtomicI32::new(partition_count.max(0)),
        }
    }

    /// Adds a connection that partitions can be assigned to.
    pub async fn add_connection(&self, connection: Arc<dyn Connection>) {
        let id = connection.id();
        self.connections.write().await.insert(id, connection);
        tracing::debug!(connection = %id, "added connection to partition table");
    }

    /// Removes a connection and every partition assignment pointing at it.
    pub async fn remove_connection(&self, id: ConnectionId) -> Option<Arc<dyn Connection>> {
        let removed = self.connections.write().await.remove(&id);
        if removed.is_some() {
            self.owners.write().await.retain(|_, owner| *owner != id);
            tracing::debug!(connection = %id, "removed connection from partition table");
        }
        removed
    }

    /// Returns the number of known connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Assigns one partition to a known connection.
    pub async fn set_partition_owner(&self, partition_id: i32, owner: ConnectionId) -> Result<()> {
        self.check_partition(partition_id)?;
        if !self.connections.read().await.contains_key(&owner) {
            return Err(HazelcastError::IllegalArgument(format!(
                "unknown connection {}",
                owner
            )));
        }
        self.owners.write().await.insert(partition_id, owner);
        Ok(())
    }

    /// Replaces the whole table with a new partition count and assignments.
    pub async fn update_partition_table<I>(&self, partition_count: i32, assignments: I) -> Result<()>
    where
        I: IntoIterator<Item = (ConnectionId, Vec<i32>)>,
    {
        if partition_count <= 0 {
            return Err(HazelcastError::IllegalArgument(format!(
                "partition count must be positive, got {}",
                partition_count
            )));
        }

        let mut owners = HashMap::new();
        for (connection, partitions) in assignments {
            for partition_id in partitions {
                if !(0..partition_count).contains(&partition_id) {
                    return Err(HazelcastError::IllegalArgument(format!(
                        "partition {} is out of range 0..{}",
                        partition_id, partition_count
                    )));
                }
                owners.insert(partition_id, connection);
            }
        }

        let mut current = self.owners.write().await;
        *current = owners;
        self.partition_count.store(partition_count, Ordering::Release);
        tracing::debug!(partition_count, owned = current.len(), "updated partition table");
        Ok(())
    }

    fn check_partition(&self, partition_id: i32) -> Result<()> {
        let count = self.partition_count();
        if (0..count).contains(&partition_id) {
            Ok(())
        } else {
            Err(HazelcastError::UnknownPartition(partition_id))
        }
    }
}

#[async_trait]
impl PartitionRouter for PartitionTable {
    async fn owner_of(&self, partition_id: i32) -> Result<Arc<dyn Connection>> {
        self.check_partition(partition_id)?;
        let owner = self
            .owners
            .read()
            .await
            .get(&partition_id)
            .copied()
            .ok_or(HazelcastError::UnknownPartition(partition_id))?;

        match self.connections.read().await.get(&owner) {
            Some(connection) if connection.is_alive() => Ok(Arc::clone(connection)),
            _ => Err(HazelcastError::UnknownPartition(partition_id)),
        }
    }

    async fn any_connection(&self) -> Result<Arc<dyn Connection>> {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.is_alive())
            .min_by_key(|c| c.id())
            .cloned()
            .ok_or_else(|| HazelcastError::Connection("no live connection available".to_string()))
    }

    fn partition_count(&self) -> i32 {
        self.partition_count.load(Ordering::Acquire)
    }
}
