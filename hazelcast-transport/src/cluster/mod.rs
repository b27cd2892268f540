//! Partition routing.

mod partition_service;

pub use partition_service::{PartitionRouter, PartitionTable};
