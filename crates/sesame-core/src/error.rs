//! Link and handshake error types.

use thiserror::Error;

use crate::handshake::HandshakeState;

/// Failures reported by the external GATT link.
///
/// These are propagated to the caller as-is; this layer performs no
/// retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Establishing the BLE connection failed.
    #[error("link connect failed: {0}")]
    Connect(String),

    /// Subscribing to the notify characteristic failed.
    #[error("notification subscribe failed: {0}")]
    Subscribe(String),

    /// Writing to the write characteristic failed.
    #[error("characteristic write failed: {0}")]
    Write(String),

    /// Operation attempted without an established link.
    #[error("link is not connected")]
    NotConnected,

    /// The link dropped underneath us.
    #[error("link disconnected")]
    Disconnected,
}

/// Failures of the login handshake state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// An operation was attempted in a state that does not allow it.
    #[error("invalid handshake operation {operation} in state {state:?}")]
    InvalidState {
        /// State the machine was in.
        state: HandshakeState,
        /// Operation that was attempted.
        operation: &'static str,
    },

    /// The item-14 message was too short to carry a 4-byte challenge.
    #[error("challenge message too short: {len} bytes")]
    ChallengeTooShort {
        /// Length of the offending message.
        len: usize,
    },

    /// Key derivation failed.
    #[error(transparent)]
    Crypto(#[from] sesame_crypto::CryptoError),
}
