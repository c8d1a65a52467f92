//! Protocol error types.

use thiserror::Error;

/// Errors from decoding wire bytes into typed messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// Message ended before the fixed layout for its item code was complete.
    #[error("message too short for item code {item_code}: {len} < {expected} bytes")]
    Truncated {
        /// Item code of the message being decoded.
        item_code: u8,
        /// Actual message length.
        len: usize,
        /// Minimum length the layout requires.
        expected: usize,
    },

    /// Inbound message carried an item code with no registered schema.
    ///
    /// Never fatal to the transport; the raw bytes are still dispatched as
    /// opaque payload to anyone listening.
    #[error("unknown item code {0}")]
    UnknownItemCode(u8),

    /// Known item code but the leading type byte is not one we can decode.
    #[error("unsupported type byte {type_byte} for item code {item_code}")]
    UnsupportedType {
        /// Item code of the message.
        item_code: u8,
        /// The unrecognized leading type byte.
        type_byte: u8,
    },

    /// Message was empty (no item code byte at all).
    #[error("empty message")]
    Empty,
}
