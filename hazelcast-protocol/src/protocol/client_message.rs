//! ClientMessage type: one header-prefixed frame of the client protocol.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Frame Length                          |
//! +---------------+---------------+-------------------------------+
//! |    Version    |B|E|   Flags   |             Type              |
//! +---------------+---------------+-------------------------------+
//! |                         CorrelationId                         |
//! +---------------------------------------------------------------+
//! |                          PartitionId                          |
//! +-------------------------------+-------------------------------+
//! |          Data Offset          |                               |
//! +-------------------------------+                               |
//! |                     Message Payload Data                    ...
//! ```
//!
//! Header fields are read and patched at absolute offsets. The payload is
//! accessed through a write cursor (the end of the buffer) and a read cursor
//! that starts at the data offset, so header fields can be changed at any
//! time without disturbing payload decoding.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::*;
use crate::error::{HazelcastError, Result};

/// A single frame of the Hazelcast client protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    buffer: BytesMut,
    read_offset: usize,
    retryable: bool,
}

impl ClientMessage {
    /// Creates an outbound message with room for `payload_size` payload bytes.
    ///
    /// The header is zeroed, except for the version, the BEGIN|END flags,
    /// the "any partition" sentinel and the data offset. The size is a
    /// capacity hint; the buffer grows if the payload turns out larger.
    pub fn create_for_encode(payload_size: usize) -> Self {
        let mut buffer = BytesMut::with_capacity(HEADER_SIZE + payload_size);
        buffer.resize(HEADER_SIZE, 0);

        let mut message = Self {
            buffer,
            read_offset: HEADER_SIZE,
            retryable: false,
        };
        message
            .set_version(VERSION)
            .set_flags(BEGIN_END_FLAG)
            .set_partition_id(PARTITION_ID_ANY)
            .set_data_offset(HEADER_SIZE as u16);
        message
    }

    /// Wraps a received frame for reading.
    ///
    /// The read cursor starts at the frame's data offset.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the buffer is shorter than the header or
    /// the data offset points outside the buffer.
    pub fn from_bytes(buffer: BytesMut) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(HazelcastError::Protocol(format!(
                "frame of {} bytes is shorter than the {}-byte header",
                buffer.len(),
                HEADER_SIZE
            )));
        }

        let data_offset = (&buffer[DATA_OFFSET_FIELD_OFFSET..]).get_u16_le() as usize;
        if data_offset < HEADER_SIZE || data_offset > buffer.len() {
            return Err(HazelcastError::Protocol(format!(
                "data offset {} outside of frame ({} bytes)",
                data_offset,
                buffer.len()
            )));
        }

        Ok(Self {
            buffer,
            read_offset: data_offset,
            retryable: false,
        })
    }

    // Header accessors.

    /// Returns the frame length field.
    pub fn frame_length(&self) -> u32 {
        (&self.buffer[FRAME_LENGTH_FIELD_OFFSET..]).get_u32_le()
    }

    /// Sets the frame length field.
    pub fn set_frame_length(&mut self, length: u32) -> &mut Self {
        self.patch(FRAME_LENGTH_FIELD_OFFSET, &length.to_le_bytes())
    }

    /// Returns the protocol version field.
    pub fn version(&self) -> u8 {
        self.buffer[VERSION_FIELD_OFFSET]
    }

    /// Sets the protocol version field.
    pub fn set_version(&mut self, version: u8) -> &mut Self {
        self.patch(VERSION_FIELD_OFFSET, &[version])
    }

    /// Returns the flags field.
    pub fn flags(&self) -> u8 {
        self.buffer[FLAGS_FIELD_OFFSET]
    }

    /// Replaces the flags field.
    pub fn set_flags(&mut self, flags: u8) -> &mut Self {
        self.patch(FLAGS_FIELD_OFFSET, &[flags])
    }

    /// Returns the message type field.
    pub fn message_type(&self) -> u16 {
        (&self.buffer[TYPE_FIELD_OFFSET..]).get_u16_le()
    }

    /// Sets the message type field.
    pub fn set_message_type(&mut self, message_type: u16) -> &mut Self {
        self.patch(TYPE_FIELD_OFFSET, &message_type.to_le_bytes())
    }

    /// Returns the correlation ID field.
    pub fn correlation_id(&self) -> i32 {
        (&self.buffer[CORRELATION_ID_FIELD_OFFSET..]).get_i32_le()
    }

    /// Sets the correlation ID field.
    pub fn set_correlation_id(&mut self, correlation_id: i32) -> &mut Self {
        self.patch(CORRELATION_ID_FIELD_OFFSET, &correlation_id.to_le_bytes())
    }

    /// Returns the partition ID field.
    pub fn partition_id(&self) -> i32 {
        (&self.buffer[PARTITION_ID_FIELD_OFFSET..]).get_i32_le()
    }

    /// Sets the partition ID field.
    pub fn set_partition_id(&mut self, partition_id: i32) -> &mut Self {
        self.patch(PARTITION_ID_FIELD_OFFSET, &partition_id.to_le_bytes())
    }

    /// Returns the data offset field.
    pub fn data_offset(&self) -> u16 {
        (&self.buffer[DATA_OFFSET_FIELD_OFFSET..]).get_u16_le()
    }

    /// Sets the data offset field.
    pub fn set_data_offset(&mut self, data_offset: u16) -> &mut Self {
        self.patch(DATA_OFFSET_FIELD_OFFSET, &data_offset.to_le_bytes())
    }

    fn patch(&mut self, offset: usize, bytes: &[u8]) -> &mut Self {
        self.buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    // Payload writes.

    /// Returns the write cursor position (absolute).
    pub fn write_offset(&self) -> usize {
        self.buffer.len()
    }

    /// Appends a single byte.
    pub fn append_byte(&mut self, value: u8) -> &mut Self {
        self.buffer.put_u8(value);
        self
    }

    /// Appends a boolean encoded as one byte.
    pub fn append_bool(&mut self, value: bool) -> &mut Self {
        self.append_byte(u8::from(value))
    }

    /// Appends a little-endian 32-bit integer.
    pub fn append_int(&mut self, value: i32) -> &mut Self {
        self.buffer.put_i32_le(value);
        self
    }

    /// Appends a little-endian 64-bit integer.
    pub fn append_long(&mut self, value: i64) -> &mut Self {
        self.buffer.put_i64_le(value);
        self
    }

    /// Appends a 4-byte length followed by the raw bytes.
    ///
    /// # Panics
    ///
    /// Panics if `value` is longer than [`MAX_BYTE_ARRAY_LENGTH`].
    pub fn append_byte_array(&mut self, value: &[u8]) -> &mut Self {
        self.append_int(byte_array_length(value.len()));
        self.buffer.put_slice(value);
        self
    }

    /// Appends a UTF-8 string as a length-prefixed byte array.
    pub fn append_str(&mut self, value: &str) -> &mut Self {
        self.append_byte_array(value.as_bytes())
    }

    /// Appends raw bytes without a length prefix.
    ///
    /// Used to concatenate the payload of continuation fragments.
    pub fn append_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buffer.put_slice(bytes);
        self
    }

    // Payload reads.

    /// Returns the read cursor position (absolute).
    pub fn read_offset(&self) -> usize {
        self.read_offset
    }

    fn read_limit(&self) -> usize {
        std::cmp::min(self.frame_length() as usize, self.buffer.len())
    }

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        let limit = self.read_limit();
        let start = self.read_offset;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= limit)
            .ok_or_else(|| {
                HazelcastError::Protocol(format!(
                    "read of {} bytes at offset {} overruns frame of {} bytes",
                    len, start, limit
                ))
            })?;
        self.read_offset = end;
        Ok(&self.buffer[start..end])
    }

    /// Reads a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.take(BYTE_SIZE_IN_BYTES)?[0])
    }

    /// Reads a boolean; any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    /// Reads a little-endian 32-bit integer.
    pub fn read_int(&mut self) -> Result<i32> {
        Ok(self.take(INT_SIZE_IN_BYTES)?.get_i32_le())
    }

    /// Reads a little-endian 64-bit integer.
    pub fn read_long(&mut self) -> Result<i64> {
        Ok(self.take(LONG_SIZE_IN_BYTES)?.get_i64_le())
    }

    /// Reads a length-prefixed byte array.
    pub fn read_byte_array(&mut self) -> Result<Vec<u8>> {
        let len = self.read_int()?;
        let len = usize::try_from(len).map_err(|_| {
            HazelcastError::Protocol(format!("negative byte array length {}", len))
        })?;
        Ok(self.take(len)?.to_vec())
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<String> {
        let bytes = self.read_byte_array()?;
        String::from_utf8(bytes)
            .map_err(|e| HazelcastError::Serialization(format!("invalid UTF-8 string: {}", e)))
    }

    // Derived queries.

    /// Returns `true` once the read cursor has consumed exactly the whole frame.
    pub fn is_complete(&self) -> bool {
        self.read_offset >= HEADER_SIZE && self.read_offset == self.frame_length() as usize
    }

    /// Returns `true` if every bit of `flag` is set.
    pub fn is_flag_set(&self, flag: u8) -> bool {
        self.flags() & flag == flag
    }

    /// Sets the given flag bits in addition to the existing ones.
    pub fn add_flag(&mut self, flag: u8) -> &mut Self {
        let flags = self.flags() | flag;
        self.set_flags(flags)
    }

    /// Returns `true` if this frame carries an event for a listener.
    pub fn is_event(&self) -> bool {
        self.is_flag_set(LISTENER_FLAG)
    }

    /// Backpatches the frame length with the current write cursor.
    ///
    /// This is the last step before the frame is handed to a connection.
    /// A frame longer than `u32::MAX` bytes gets a saturated length, which
    /// the stream encoder rejects.
    pub fn update_frame_length(&mut self) -> &mut Self {
        let length = saturated_frame_length(self.write_offset());
        self.set_frame_length(length)
    }

    /// Returns whether this particular message was marked retryable.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Marks this message as safe to re-send after a transient failure.
    pub fn set_retryable(&mut self, retryable: bool) -> &mut Self {
        self.retryable = retryable;
        self
    }

    /// Returns the payload region, from the data offset to the frame end.
    pub fn payload(&self) -> &[u8] {
        let start = std::cmp::min(self.data_offset() as usize, self.buffer.len());
        let end = std::cmp::max(start, self.read_limit());
        &self.buffer[start..end]
    }

    /// Returns the raw frame bytes written so far, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the message and returns the frame bytes.
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClientMessage{{length={}, correlationId={}, messageType={:#06x}, partitionId={}, \
             isComplete={}, isRetryable={}, isEvent={}, writeOffset={}}}",
            self.frame_length(),
            self.correlation_id(),
            self.message_type(),
            self.partition_id(),
            self.is_complete(),
            self.is_retryable(),
            self.is_event(),
            self.write_offset()
        )
    }
}

fn byte_array_length(len: usize) -> i32 {
    i32::try_from(len).unwrap_or_else(|_| {
        panic!(
            "byte array of {} bytes exceeds the limit of {} bytes",
            len, MAX_BYTE_ARRAY_LENGTH
        )
    })
}

fn saturated_frame_length(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
