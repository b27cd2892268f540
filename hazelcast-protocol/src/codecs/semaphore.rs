//! Semaphore request codecs.

use crate::error::Result;
use crate::protocol::constants::*;
use crate::protocol::ClientMessage;

use super::{
    calculate_str_size, decode_bool_response, decode_int_response, decode_void_response,
    RequestCodec,
};

/// Initializes the semaphore with the given number of permits.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreInit<'a> {
    /// Semaphore name.
    pub name: &'a str,
    /// Initial permits.
    pub permits: i32,
}

impl RequestCodec for SemaphoreInit<'_> {
    type Response = bool;
    const MESSAGE_TYPE: u16 = SEMAPHORE_INIT;

    fn payload_size(&self) -> usize {
        calculate_str_size(self.name) + INT_SIZE_IN_BYTES
    }

    fn encode_payload(&self, message: &mut ClientMessage) {
        message.append_str(self.name).append_int(self.permits);
    }

    fn decode_response(response: ClientMessage) -> Result<bool> {
        decode_bool_response(response)
    }
}

/// Acquires permits, waiting until they are available.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreAcquire<'a> {
    /// Semaphore name.
    pub name: &'a str,
    /// Permits to acquire.
    pub permits: i32,
}

impl RequestCodec for SemaphoreAcquire<'_> {
    type Response = ();
    const MESSAGE_TYPE: u16 = SEMAPHORE_ACQUIRE;

    fn payload_size(&self) -> usize {
        calculate_str_size(self.name) + INT_SIZE_IN_BYTES
    }

    fn encode_payload(&self, message: &mut ClientMessage) {
        message.append_str(self.name).append_int(self.permits);
    }

    fn decode_response(response: ClientMessage) -> Result<()> {
        decode_void_response(response)
    }
}

/// Queries the number of available permits.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreAvailablePermits<'a> {
    /// Semaphore name.
    pub name: &'a str,
}

impl RequestCodec for SemaphoreAvailablePermits<'_> {
    type Response = i32;
    const MESSAGE_TYPE: u16 = SEMAPHORE_AVAILABLE_PERMITS;

    fn payload_size(&self) -> usize {
        calculate_str_size(self.name)
    }

    fn encode_payload(&self, message: &mut ClientMessage) {
        message.append_str(self.name);
    }

    fn decode_response(response: ClientMessage) -> Result<i32> {
        decode_int_response(response)
    }
}

/// Acquires all immediately available permits.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreDrainPermits<'a> {
    /// Semaphore name.
    pub name: &'a str,
}

impl RequestCodec for SemaphoreDrainPermits<'_> {
    type Response = i32;
    const MESSAGE_TYPE: u16 = SEMAPHORE_DRAIN_PERMITS;

    fn payload_size(&self) -> usize {
        calculate_str_size(self.name)
    }

    fn encode_payload(&self, message: &mut ClientMessage) {
        message.append_str(self.name);
    }

    fn decode_response(response: ClientMessage) -> Result<i32> {
        decode_int_response(response)
    }
}

/// Shrinks the number of available permits.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreReducePermits<'a> {
    /// Semaphore name.
    pub name: &'a str,
    /// Permits to remove.
    pub reduction: i32,
}

impl RequestCodec for SemaphoreReducePermits<'_> {
    type Response = ();
    const MESSAGE_TYPE: u16 = SEMAPHORE_REDUCE_PERMITS;

    fn payload_size(&self) -> usize {
        calculate_str_size(self.name) + INT_SIZE_IN_BYTES
    }

    fn encode_payload(&self, message: &mut ClientMessage) {
        message.append_str(self.name).append_int(self.reduction);
    }

    fn decode_response(response: ClientMessage) -> Result<()> {
        decode_void_response(response)
    }
}

/// Releases permits.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreRelease<'a> {
    /// Semaphore name.
    pub name: &'a str,
    /// Permits to release.
    pub permits: i32,
}

impl RequestCodec for SemaphoreRelease<'_> {
    type Response = ();
    const MESSAGE_TYPE: u16 = SEMAPHORE_RELEASE;

    fn payload_size(&self) -> usize {
        calculate_str_size(self.name) + INT_SIZE_IN_BYTES
    }

    fn encode_payload(&self, message: &mut ClientMessage) {
        message.append_str(self.name).append_int(self.permits);
    }

    fn decode_response(response: ClientMessage) -> Result<()> {
        decode_void_response(response)
    }
}

/// Acquires permits if they become available within the timeout.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreTryAcquire<'a> {
    /// Semaphore name.
    pub name: &'a str,
    /// Permits to acquire.
    pub permits: i32,
    /// Wait time in milliseconds.
    pub timeout_millis: i64,
}

impl RequestCodec for SemaphoreTryAcquire<'_> {
    type Response = bool;
    const MESSAGE_TYPE: u16 = SEMAPHORE_TRY_ACQUIRE;

    fn payload_size(&self) -> usize {
        calculate_str_size(self.name) + INT_SIZE_IN_BYTES + LONG_SIZE_IN_BYTES
    }

    fn encode_payload(&self, message: &mut ClientMessage) {
        message
            .append_str(self.name)
            .append_int(self.permits)
            .append_long(self.timeout_millis);
    }

    fn decode_response(response: ClientMessage) -> Result<bool> {
        decode_bool_response(response)
    }
}
