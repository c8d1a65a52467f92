//! Client error taxonomy.

use thiserror::Error;

use sesame_core::{HandshakeError, LinkError};
use sesame_crypto::CryptoError;
use sesame_proto::ProtoError;

/// Everything a client call can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The external GATT layer failed; propagated, not retried here.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Encrypted send or receive attempted before the handshake completed.
    #[error("session not ready: handshake has not completed")]
    SessionNotReady,

    /// An inbound message failed AEAD authentication. The message was
    /// discarded; the session is kept, but counters may have
    /// desynchronized.
    #[error("authentication failed: AEAD tag mismatch")]
    Authentication,

    /// The handshake did not complete.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Handshake state machine rejected a transition.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// No matching response arrived within the configured deadline.
    #[error("{command} command timed out")]
    Timeout {
        /// Name of the command that timed out.
        command: &'static str,
    },

    /// The device answered a command with a non-zero status.
    #[error("{command} command failed with status {status}")]
    CommandFailed {
        /// Name of the failed command.
        command: &'static str,
        /// Device status code.
        status: u8,
    },

    /// The device refused to delete a history record.
    #[error("history delete failed with status {status}")]
    HistoryDeleteFailed {
        /// Device status code.
        status: u8,
    },

    /// A response did not match its schema.
    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// Other cryptographic failure (bad key material, oversized message).
    #[error(transparent)]
    Crypto(CryptoError),

    /// The transport task is gone (client dropped or link closed for good).
    #[error("transport task stopped")]
    Closed,
}

impl From<CryptoError> for Error {
    fn from(error: CryptoError) -> Self {
        match error {
            CryptoError::Authentication | CryptoError::CiphertextTooShort { .. } => {
                Self::Authentication
            },
            CryptoError::MessageTooLarge | CryptoError::InvalidSecretLength(_) => {
                Self::Crypto(error)
            },
        }
    }
}
