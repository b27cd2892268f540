//! Distributed semaphore proxy implementation.

use std::sync::Arc;
use std::time::Duration;

use hazelcast_protocol::codecs::semaphore::{
    SemaphoreAcquire, SemaphoreAvailablePermits, SemaphoreDrainPermits, SemaphoreInit,
    SemaphoreReducePermits, SemaphoreRelease, SemaphoreTryAcquire,
};
use hazelcast_protocol::Result;
#[cfg(doc)]
use hazelcast_protocol::HazelcastError;

use super::{check_non_negative, partition_for_name};
use crate::invocation::InvocationService;

const NEGATIVE_PERMITS: &str = "Permits cannot be negative!";
const NEGATIVE_REDUCTION: &str = "Reduction cannot be negative!";

/// A distributed counting semaphore.
///
/// Every operation is routed to the partition that owns the semaphore's
/// name. Permit arguments are validated locally: a negative count fails
/// with [`HazelcastError::IllegalArgument`](hazelcast_protocol::HazelcastError::IllegalArgument)
/// before any request is built.
#[derive(Debug, Clone)]
pub struct Semaphore {
    name: String,
    service: Arc<InvocationService>,
}

impl Semaphore {
    /// Creates a new Semaphore proxy.
    pub(crate) fn new(name: String, service: Arc<InvocationService>) -> Self {
        Self { name, service }
    }

    /// Returns the name of this Semaphore.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the partition this semaphore lives on.
    pub fn partition_id(&self) -> i32 {
        partition_for_name(&self.service, &self.name)
    }

    /// Initializes the semaphore with the given number of permits.
    ///
    /// # Arguments
    ///
    /// * `permits` - The initial number of permits
    ///
    /// # Returns
    ///
    /// `false` if the semaphore was already initialized.
    ///
    /// # Errors
    ///
    /// Returns [`HazelcastError::IllegalArgument`] if `permits` is negative,
    /// or the invocation error if the request fails.
    pub async fn init(&self, permits: i32) -> Result<bool> {
        check_non_negative(permits, NEGATIVE_PERMITS)?;
        let request = SemaphoreInit {
            name: &self.name,
            permits,
        };
        self.service
            .invoke_codec(&request, self.partition_id())
            .await
    }

    /// Acquires the given number of permits, waiting until they are available.
    ///
    /// # Errors
    ///
    /// Returns [`HazelcastError::IllegalArgument`] if `permits` is negative,
    /// or the invocation error if the request fails. The request is not
    /// re-sent after a transient failure.
    pub async fn acquire(&self, permits: i32) -> Result<()> {
        check_non_negative(permits, NEGATIVE_PERMITS)?;
        let request = SemaphoreAcquire {
            name: &self.name,
            permits,
        };
        self.service
            .invoke_codec(&request, self.partition_id())
            .await
    }

    /// Returns the current number of available permits.
    ///
    /// # Errors
    ///
    /// Returns the invocation error if the request fails after its retries.
    pub async fn available_permits(&self) -> Result<i32> {
        let request = SemaphoreAvailablePermits { name: &self.name };
        self.service
            .invoke_codec(&request, self.partition_id())
            .await
    }

    /// Acquires and returns all permits that are immediately available.
    ///
    /// # Errors
    ///
    /// Returns the invocation error if the request fails.
    pub async fn drain_permits(&self) -> Result<i32> {
        let request = SemaphoreDrainPermits { name: &self.name };
        self.service
            .invoke_codec(&request, self.partition_id())
            .await
    }

    /// Reduces the number of available permits without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`HazelcastError::IllegalArgument`] if `reduction` is
    /// negative, or the invocation error if the request fails.
    pub async fn reduce_permits(&self, reduction: i32) -> Result<()> {
        check_non_negative(reduction, NEGATIVE_REDUCTION)?;
        let request = SemaphoreReducePermits {
            name: &self.name,
            reduction,
        };
        self.service
            .invoke_codec(&request, self.partition_id())
            .await
    }

    /// Releases the given number of permits.
    ///
    /// # Errors
    ///
    /// Returns [`HazelcastError::IllegalArgument`] if `permits` is negative,
    /// or the invocation error if the request fails.
    pub async fn release(&self, permits: i32) -> Result<()> {
        check_non_negative(permits, NEGATIVE_PERMITS)?;
        let request = SemaphoreRelease {
            name: &self.name,
            permits,
        };
        self.service
            .invoke_codec(&request, self.partition_id())
            .await
    }

    /// Tries to acquire the given number of permits within `timeout`.
    ///
    /// # Arguments
    ///
    /// * `permits` - The number of permits to acquire
    /// * `timeout` - How long the member waits for the permits
    ///
    /// # Returns
    ///
    /// `false` if the permits did not become available in time.
    ///
    /// # Errors
    ///
    /// Returns [`HazelcastError::IllegalArgument`] if `permits` is negative,
    /// or the invocation error if the request fails.
    pub async fn try_acquire(&self, permits: i32, timeout: Duration) -> Result<bool> {
        check_non_negative(permits, NEGATIVE_PERMITS)?;
        let request = SemaphoreTryAcquire {
            name: &self.name,
            permits,
            timeout_millis: i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX),
        };
        self.service
            .invoke_codec(&request, self.partition_id())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::PartitionTable;
    use crate::config::InvocationConfig;
    use hazelcast_protocol::protocol::{partition_id_for_key, PARTITION_ID_ANY};
    use hazelcast_protocol::HazelcastError;

    fn semaphore(partition_count: i32) -> Semaphore {
        let service = InvocationService::new(
            InvocationConfig::default(),
            Arc::new(PartitionTable::new(partition_count)),
        );
        Semaphore::new("permits".to_string(), Arc::new(service))
    }

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_partition_follows_name() {
        let semaphore = semaphore(271);
        assert_eq!(
            Some(semaphore.partition_id()),
            partition_id_for_key(b"permits", 271)
        );
    }

    #[test]
    fn test_unknown_partition_count_has_no_affinity() {
        assert_eq!(semaphore(0).partition_id(), PARTITION_ID_ANY);
    }

    #[tokio::test]
    async fn test_negative_permits_rejected() {
        let semaphore = semaphore(271);

        for err in [
            semaphore.acquire(-1).await.unwrap_err(),
            semaphore.release(-1).await.unwrap_err(),
            semaphore.init(-1).await.unwrap_err(),
            semaphore
                .try_acquire(-1, Duration::from_secs(1))
                .await
                .unwrap_err(),
        ] {
            match err {
                HazelcastError::IllegalArgument(message) => {
                    assert_eq!(message, "Permits cannot be negative!")
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(semaphore.service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_negative_reduction_rejected() {
        let semaphore = semaphore(271);
        match semaphore.reduce_permits(-3).await.unwrap_err() {
            HazelcastError::IllegalArgument(message) => {
                assert_eq!(message, "Reduction cannot be negative!")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
