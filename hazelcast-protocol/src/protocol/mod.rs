//! Hazelcast client binary protocol implementation.
//!
//! This module provides the frame type, its stream codec and the partition
//! hashing used to route keyed requests.

mod client_message;
mod codec;
pub mod constants;
mod partition;

pub use client_message::ClientMessage;
pub use codec::ClientMessageCodec;
pub use constants::*;
pub use partition::{compute_partition_hash, hash_to_index, partition_id_for_key};
