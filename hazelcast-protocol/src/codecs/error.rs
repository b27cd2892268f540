//! Codec for exception responses.
//!
//! An exception response has the type [`RESPONSE_EXCEPTION`] and carries the
//! server error code, the exception class name and an optional message.

use crate::error::HazelcastError;
use crate::protocol::constants::*;
use crate::protocol::ClientMessage;

use super::encode_response;

/// Server error codes.
pub mod error_codes {
    /// The caller is not a member of the cluster.
    pub const CALLER_NOT_MEMBER: i32 = 8;
    /// The member is shutting down or not yet started.
    pub const HAZELCAST_INSTANCE_NOT_ACTIVE: i32 = 21;
    /// An argument was rejected by the member.
    pub const ILLEGAL_ARGUMENT: i32 = 25;
    /// The illegal state of a distributed object.
    pub const ILLEGAL_STATE: i32 = 26;
    /// The target partition is migrating.
    pub const PARTITION_MIGRATING: i32 = 40;
    /// Generic transient failure.
    pub const RETRYABLE_HAZELCAST: i32 = 45;
    /// Transient I/O failure on the member side.
    pub const RETRYABLE_IO: i32 = 46;
    /// The connection to the target member was lost.
    pub const TARGET_DISCONNECTED: i32 = 52;
    /// The target is no longer a member of the cluster.
    pub const TARGET_NOT_MEMBER: i32 = 53;
    /// The request reached a member that does not own the partition.
    pub const WRONG_TARGET: i32 = 62;
}

/// Codes of failures after which a retryable operation may be re-sent.
const RETRYABLE_CODES: &[i32] = &[
    error_codes::CALLER_NOT_MEMBER,
    error_codes::HAZELCAST_INSTANCE_NOT_ACTIVE,
    error_codes::PARTITION_MIGRATING,
    error_codes::RETRYABLE_HAZELCAST,
    error_codes::RETRYABLE_IO,
    error_codes::TARGET_DISCONNECTED,
    error_codes::TARGET_NOT_MEMBER,
    error_codes::WRONG_TARGET,
];

/// Returns `true` if the server error code denotes a transient failure.
pub fn is_retryable_code(code: i32) -> bool {
    RETRYABLE_CODES.contains(&code)
}

/// Returns `true` if `message` is an exception response.
pub fn is_exception(message: &ClientMessage) -> bool {
    message.message_type() == RESPONSE_EXCEPTION
}

/// Decodes an exception response into a [`HazelcastError::Server`].
///
/// A malformed exception payload is reported as the framing or decoding
/// error it produced instead.
pub fn decode(mut response: ClientMessage) -> HazelcastError {
    let decoded = (|| {
        let code = response.read_int()?;
        let class_name = response.read_str()?;
        let message = if response.read_bool()? {
            None
        } else {
            Some(response.read_str()?)
        };
        Ok::<_, HazelcastError>((code, class_name, message))
    })();

    match decoded {
        Ok((code, class_name, message)) => HazelcastError::Server {
            code,
            class_name,
            message,
            retryable: is_retryable_code(code),
        },
        Err(e) => e,
    }
}

/// Builds an exception response frame.
pub fn encode(
    correlation_id: i32,
    code: i32,
    class_name: &str,
    message: Option<&str>,
) -> ClientMessage {
    encode_response(RESPONSE_EXCEPTION, correlation_id, |m| {
        m.append_int(code)
            .append_str(class_name)
            .append_bool(message.is_none());
        if let Some(text) = message {
            m.append_str(text);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_retryable_error() {
        let response = encode(
            3,
            error_codes::PARTITION_MIGRATING,
            "PartitionMigratingException",
            Some("partition 7 is migrating"),
        );
        assert!(is_exception(&response));

        match decode(response) {
            HazelcastError::Server {
                code,
                class_name,
                message,
                retryable,
            } => {
                assert_eq!(code, error_codes::PARTITION_MIGRATING);
                assert_eq!(class_name, "PartitionMigratingException");
                assert_eq!(message.as_deref(), Some("partition 7 is migrating"));
                assert!(retryable);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_non_retryable_error_without_message() {
        let response = encode(3, error_codes::ILLEGAL_STATE, "IllegalStateException", None);
        let err = decode(response);
        assert!(!err.is_retryable());
        assert!(matches!(
            err,
            HazelcastError::Server { message: None, .. }
        ));
    }

    #[test]
    fn test_decode_malformed_exception() {
        let response = encode_response(RESPONSE_EXCEPTION, 3, |m| {
            m.append_int(error_codes::RETRYABLE_IO);
        });
        assert!(matches!(decode(response), HazelcastError::Protocol(_)));
    }

    #[test]
    fn test_retryable_codes() {
        assert!(is_retryable_code(error_codes::TARGET_NOT_MEMBER));
        assert!(is_retryable_code(error_codes::WRONG_TARGET));
        assert!(!is_retryable_code(error_codes::ILLEGAL_ARGUMENT));
    }
}
