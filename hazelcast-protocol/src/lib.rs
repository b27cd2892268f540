//! Wire protocol for the Hazelcast client.
//!
//! Provides the [`ClientMessage`] frame with its 18-byte header, the
//! [`ClientMessageCodec`] stream codec, partition hashing and the typed
//! request codecs of every supported operation.

#![warn(missing_docs)]

pub mod codecs;
pub mod error;
pub mod protocol;

pub use error::{HazelcastError, Result};
pub use protocol::{ClientMessage, ClientMessageCodec};
