//! Protocol constants for the Hazelcast client binary protocol.

/// Protocol version written into every outbound frame.
pub const VERSION: u8 = 0;

/// Size of a byte field in bytes.
pub const BYTE_SIZE_IN_BYTES: usize = 1;

/// Size of a boolean field in bytes.
pub const BOOLEAN_SIZE_IN_BYTES: usize = 1;

/// Size of a 16-bit field in bytes.
pub const SHORT_SIZE_IN_BYTES: usize = 2;

/// Size of a 32-bit field in bytes.
pub const INT_SIZE_IN_BYTES: usize = 4;

/// Size of a 64-bit field in bytes.
pub const LONG_SIZE_IN_BYTES: usize = 8;

/// Offset of the frame length field.
pub const FRAME_LENGTH_FIELD_OFFSET: usize = 0;

/// Offset of the version field.
pub const VERSION_FIELD_OFFSET: usize = FRAME_LENGTH_FIELD_OFFSET + INT_SIZE_IN_BYTES;

/// Offset of the flags field.
pub const FLAGS_FIELD_OFFSET: usize = VERSION_FIELD_OFFSET + BYTE_SIZE_IN_BYTES;

/// Offset of the message type field.
pub const TYPE_FIELD_OFFSET: usize = FLAGS_FIELD_OFFSET + BYTE_SIZE_IN_BYTES;

/// Offset of the correlation ID field.
pub const CORRELATION_ID_FIELD_OFFSET: usize = TYPE_FIELD_OFFSET + SHORT_SIZE_IN_BYTES;

/// Offset of the partition ID field.
pub const PARTITION_ID_FIELD_OFFSET: usize = CORRELATION_ID_FIELD_OFFSET + INT_SIZE_IN_BYTES;

/// Offset of the data offset field.
pub const DATA_OFFSET_FIELD_OFFSET: usize = PARTITION_ID_FIELD_OFFSET + INT_SIZE_IN_BYTES;

/// Total size of the fixed frame header (18 bytes).
pub const HEADER_SIZE: usize = DATA_OFFSET_FIELD_OFFSET + SHORT_SIZE_IN_BYTES;

/// Begin flag - marks the first fragment of a message.
pub const BEGIN_FLAG: u8 = 0x80;

/// End flag - marks the last fragment of a message.
pub const END_FLAG: u8 = 0x40;

/// Flags for an unfragmented message.
pub const BEGIN_END_FLAG: u8 = BEGIN_FLAG | END_FLAG;

/// Listener flag - the frame is an event for a listener registration.
pub const LISTENER_FLAG: u8 = 0x01;

/// Partition ID indicating no partition affinity.
pub const PARTITION_ID_ANY: i32 = -1;

/// Default upper bound for a single inbound frame.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Default upper bound for messages being reassembled at the same time.
pub const DEFAULT_MAX_PENDING_FRAGMENTS: usize = 1024;

/// Largest byte array whose length fits the 4-byte length prefix.
pub const MAX_BYTE_ARRAY_LENGTH: usize = i32::MAX as usize;

// Response message types.

/// Response carrying no value.
pub const RESPONSE_VOID: u16 = 100;

/// Response carrying a boolean.
pub const RESPONSE_BOOLEAN: u16 = 101;

/// Response carrying a 32-bit integer.
pub const RESPONSE_INTEGER: u16 = 102;

/// Response carrying a 64-bit integer.
pub const RESPONSE_LONG: u16 = 103;

/// Exception response reported by the cluster.
pub const RESPONSE_EXCEPTION: u16 = 109;

// Request message types.

/// Semaphore init request.
pub const SEMAPHORE_INIT: u16 = 0x0d01;

/// Semaphore acquire request.
pub const SEMAPHORE_ACQUIRE: u16 = 0x0d02;

/// Semaphore available permits request.
pub const SEMAPHORE_AVAILABLE_PERMITS: u16 = 0x0d03;

/// Semaphore drain permits request.
pub const SEMAPHORE_DRAIN_PERMITS: u16 = 0x0d04;

/// Semaphore reduce permits request.
pub const SEMAPHORE_REDUCE_PERMITS: u16 = 0x0d05;

/// Semaphore release request.
pub const SEMAPHORE_RELEASE: u16 = 0x0d06;

/// Semaphore try acquire request.
pub const SEMAPHORE_TRY_ACQUIRE: u16 = 0x0d07;
