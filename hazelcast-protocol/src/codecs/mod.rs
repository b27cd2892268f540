//! Typed request/response codecs and the operation table.
//!
//! Every operation has one [`RequestCodec`] implementation that builds its
//! request frame and decodes the matching response. The static
//! [`OPERATIONS`] table, keyed by message type, carries the per-operation
//! invocation policy: whether a request may be re-sent after a transient
//! failure and whether it is bound to a partition.

pub mod error;
pub mod semaphore;

use crate::error::{HazelcastError, Result};
use crate::protocol::constants::*;
use crate::protocol::ClientMessage;

/// Invocation policy of a single operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Request message type.
    pub message_type: u16,
    /// Human readable operation name.
    pub name: &'static str,
    /// Re-sending the request cannot duplicate side effects.
    pub retryable: bool,
    /// The request must be sent to the owner of its partition.
    pub partition_bound: bool,
}

impl OperationDescriptor {
    const fn new(
        message_type: u16,
        name: &'static str,
        retryable: bool,
        partition_bound: bool,
    ) -> Self {
        Self {
            message_type,
            name,
            retryable,
            partition_bound,
        }
    }
}

/// Known operations, sorted by message type.
pub static OPERATIONS: &[OperationDescriptor] = &[
    OperationDescriptor::new(SEMAPHORE_INIT, "Semaphore.init", false, true),
    OperationDescriptor::new(SEMAPHORE_ACQUIRE, "Semaphore.acquire", false, true),
    OperationDescriptor::new(
        SEMAPHORE_AVAILABLE_PERMITS,
        "Semaphore.availablePermits",
        true,
        true,
    ),
    OperationDescriptor::new(SEMAPHORE_DRAIN_PERMITS, "Semaphore.drainPermits", false, true),
    OperationDescriptor::new(SEMAPHORE_REDUCE_PERMITS, "Semaphore.reducePermits", false, true),
    OperationDescriptor::new(SEMAPHORE_RELEASE, "Semaphore.release", false, true),
    OperationDescriptor::new(SEMAPHORE_TRY_ACQUIRE, "Semaphore.tryAcquire", false, true),
];

/// Looks up the policy of an operation type.
pub fn operation(message_type: u16) -> Option<&'static OperationDescriptor> {
    OPERATIONS
        .binary_search_by_key(&message_type, |op| op.message_type)
        .ok()
        .map(|index| &OPERATIONS[index])
}

/// A typed encode/decode pair for one operation.
pub trait RequestCodec {
    /// The decoded response value.
    type Response;

    /// Request message type.
    const MESSAGE_TYPE: u16;

    /// Number of payload bytes the request needs.
    fn payload_size(&self) -> usize;

    /// Writes the request parameters into the payload.
    fn encode_payload(&self, message: &mut ClientMessage);

    /// Decodes the response payload.
    fn decode_response(response: ClientMessage) -> Result<Self::Response>;

    /// Builds the complete request frame.
    fn encode_request(&self) -> ClientMessage {
        let mut message = ClientMessage::create_for_encode(self.payload_size());
        message.set_message_type(Self::MESSAGE_TYPE);
        self.encode_payload(&mut message);
        message.update_frame_length();
        message
    }

    /// Returns the invocation policy of this operation.
    fn descriptor() -> Option<&'static OperationDescriptor> {
        operation(Self::MESSAGE_TYPE)
    }
}

/// Size of a length-prefixed string.
pub fn calculate_str_size(value: &str) -> usize {
    INT_SIZE_IN_BYTES + value.len()
}

/// Fails unless `response` has the expected response type.
pub fn expect_response_type(response: &ClientMessage, expected: u16) -> Result<()> {
    if response.message_type() == expected {
        Ok(())
    } else {
        Err(HazelcastError::Serialization(format!(
            "expected response type {}, got {}",
            expected,
            response.message_type()
        )))
    }
}

/// Decodes a response carrying no value.
pub fn decode_void_response(response: ClientMessage) -> Result<()> {
    expect_response_type(&response, RESPONSE_VOID)
}

/// Decodes a response carrying a boolean.
pub fn decode_bool_response(mut response: ClientMessage) -> Result<bool> {
    expect_response_type(&response, RESPONSE_BOOLEAN)?;
    response.read_bool()
}

/// Decodes a response carrying a 32-bit integer.
pub fn decode_int_response(mut response: ClientMessage) -> Result<i32> {
    expect_response_type(&response, RESPONSE_INTEGER)?;
    response.read_int()
}

/// Builds a response frame of the given type with an already written payload.
///
/// The closure writes the payload; the frame length is set afterwards.
pub fn encode_response<F>(response_type: u16, correlation_id: i32, payload: F) -> ClientMessage
where
    F: FnOnce(&mut ClientMessage),
{
    let mut message = ClientMessage::create_for_encode(0);
    message
        .set_message_type(response_type)
        .set_correlation_id(correlation_id);
    payload(&mut message);
    message.update_frame_length();
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_table_is_sorted_and_unique() {
        for pair in OPERATIONS.windows(2) {
            assert!(pair[0].message_type < pair[1].message_type);
        }
    }

    #[test]
    fn test_operation_lookup() {
        let op = operation(SEMAPHORE_AVAILABLE_PERMITS).unwrap();
        assert_eq!(op.name, "Semaphore.availablePermits");
        assert!(op.retryable);
        assert!(op.partition_bound);

        assert!(!operation(SEMAPHORE_ACQUIRE).unwrap().retryable);
        assert!(operation(0x7777).is_none());
    }

    #[test]
    fn test_decode_bool_response() {
        let response = encode_response(RESPONSE_BOOLEAN, 1, |m| {
            m.append_bool(true);
        });
        assert!(decode_bool_response(response).unwrap());
    }

    #[test]
    fn test_decode_int_response_negative() {
        let response = encode_response(RESPONSE_INTEGER, 1, |m| {
            m.append_int(-5);
        });
        assert_eq!(decode_int_response(response).unwrap(), -5);
    }

    #[test]
    fn test_decode_wrong_response_type() {
        let response = encode_response(RESPONSE_VOID, 1, |_| {});
        assert!(matches!(
            decode_int_response(response).unwrap_err(),
            HazelcastError::Serialization(_)
        ));
    }

    #[test]
    fn test_decode_truncated_response() {
        let response = encode_response(RESPONSE_INTEGER, 1, |m| {
            m.append_byte(1);
        });
        assert!(matches!(
            decode_int_response(response).unwrap_err(),
            HazelcastError::Protocol(_)
        ));
    }
}
