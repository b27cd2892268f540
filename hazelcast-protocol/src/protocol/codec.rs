//! Stream codec for reading and writing client messages over a byte stream.

use std::collections::HashMap;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::constants::*;
use super::ClientMessage;
use crate::error::{HazelcastError, Result};

/// Codec for encoding and decoding Hazelcast client messages.
///
/// Implements the `tokio_util::codec::{Encoder, Decoder}` traits for use
/// with tokio's framed I/O. The decoder splits the stream on the frame length
/// field and reassembles fragmented messages: a BEGIN fragment opens a
/// message, continuation fragments with the same correlation ID append their
/// payload, and the END fragment releases it.
#[derive(Debug)]
pub struct ClientMessageCodec {
    max_frame_length: usize,
    max_pending_fragments: usize,
    /// Partially received messages, keyed by correlation ID.
    fragments: HashMap<i32, ClientMessage>,
}

impl ClientMessageCodec {
    /// Creates a new codec with the default frame size limit.
    pub fn new() -> Self {
        Self::with_max_frame_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    /// Creates a codec that rejects frames longer than `max_frame_length`.
    pub fn with_max_frame_length(max_frame_length: usize) -> Self {
        Self {
            max_frame_length,
            max_pending_fragments: DEFAULT_MAX_PENDING_FRAGMENTS,
            fragments: HashMap::new(),
        }
    }

    /// Limits how many fragmented messages may be unfinished at once.
    ///
    /// A BEGIN fragment beyond the limit is a protocol error.
    pub fn max_pending_fragments(mut self, limit: usize) -> Self {
        self.max_pending_fragments = limit;
        self
    }

    /// Returns the number of messages waiting for further fragments.
    pub fn pending_fragments(&self) -> usize {
        self.fragments.len()
    }

    fn assemble(&mut self, frame: ClientMessage) -> Result<Option<ClientMessage>> {
        if frame.is_flag_set(BEGIN_END_FLAG) {
            return Ok(Some(frame));
        }

        let correlation_id = frame.correlation_id();
        if frame.is_flag_set(BEGIN_FLAG) {
            if !self.fragments.contains_key(&correlation_id)
                && self.fragments.len() >= self.max_pending_fragments
            {
                return Err(HazelcastError::Protocol(format!(
                    "begin fragment for correlation id {} exceeds the limit of {} unfinished messages",
                    correlation_id, self.max_pending_fragments
                )));
            }
            if self.fragments.insert(correlation_id, frame).is_some() {
                tracing::warn!(
                    correlation_id,
                    "begin fragment replaced an unfinished message"
                );
            }
            return Ok(None);
        }

        let Some(mut message) = self.fragments.remove(&correlation_id) else {
            return Err(HazelcastError::Protocol(format!(
                "continuation fragment for correlation id {} without a begin fragment",
                correlation_id
            )));
        };

        if message.write_offset() + frame.payload().len() > u32::MAX as usize {
            return Err(HazelcastError::Protocol(format!(
                "reassembled message for correlation id {} exceeds the frame length range",
                correlation_id
            )));
        }
        message.append_raw(frame.payload());
        if frame.is_flag_set(END_FLAG) {
            message.add_flag(END_FLAG).update_frame_length();
            tracing::trace!(correlation_id, "reassembled fragmented message");
            Ok(Some(message))
        } else {
            self.fragments.insert(correlation_id, message);
            Ok(None)
        }
    }
}

impl Default for ClientMessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<ClientMessage> for ClientMessageCodec {
    type Error = HazelcastError;

    fn encode(&mut self, item: ClientMessage, dst: &mut BytesMut) -> Result<()> {
        let frame_length = item.frame_length() as usize;
        if frame_length < HEADER_SIZE || frame_length != item.write_offset() {
            return Err(HazelcastError::Protocol(format!(
                "frame length {} does not match the {} bytes written",
                frame_length,
                item.write_offset()
            )));
        }

        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}

impl Decoder for ClientMessageCodec {
    type Item = ClientMessage;
    type Error = HazelcastError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            if src.len() < INT_SIZE_IN_BYTES {
                return Ok(None);
            }

            let frame_length = (&src[FRAME_LENGTH_FIELD_OFFSET..]).get_u32_le() as usize;
            if frame_length < HEADER_SIZE {
                return Err(HazelcastError::Protocol(format!(
                    "frame length {} is shorter than the header",
                    frame_length
                )));
            }
            if frame_length > self.max_frame_length {
                return Err(HazelcastError::Protocol(format!(
                    "frame length {} exceeds the limit of {} bytes",
                    frame_length, self.max_frame_length
                )));
            }

            if src.len() < frame_length {
                src.reserve(frame_length - src.len());
                return Ok(None);
            }

            let frame = ClientMessage::from_bytes(src.split_to(frame_length))?;
            if let Some(message) = self.assemble(frame)? {
                return Ok(Some(message));
            }
        }
    }
}
