//! Distributed data structure proxies.

mod semaphore;

pub use semaphore::Semaphore;

use hazelcast_protocol::protocol::{partition_id_for_key, PARTITION_ID_ANY};
use hazelcast_protocol::{HazelcastError, Result};

use crate::invocation::InvocationService;

/// Returns the partition owning the distributed object called `name`, or
/// [`PARTITION_ID_ANY`] while the partition count is unknown.
pub(crate) fn partition_for_name(service: &InvocationService, name: &str) -> i32 {
    partition_id_for_key(name.as_bytes(), service.router().partition_count())
        .unwrap_or(PARTITION_ID_ANY)
}

/// Fails with [`HazelcastError::IllegalArgument`] if `value` is negative.
pub(crate) fn check_non_negative(value: i32, message: &str) -> Result<()> {
    if value < 0 {
        return Err(HazelcastError::IllegalArgument(message.to_string()));
    }
    Ok(())
}
