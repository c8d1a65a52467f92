//! Crypto error types.

use thiserror::Error;

/// Errors from session establishment and AEAD processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// AEAD tag did not verify; the message is discarded, never returned.
    ///
    /// The receive counter has still advanced, so later messages from the
    /// device remain decryptable unless the counters themselves have
    /// desynchronized.
    #[error("authentication failed: AEAD tag mismatch")]
    Authentication,

    /// Ciphertext shorter than the authentication tag.
    #[error("ciphertext too short: {len} < {min} bytes")]
    CiphertextTooShort {
        /// Actual ciphertext length.
        len: usize,
        /// Minimum length (the tag).
        min: usize,
    },

    /// Plaintext exceeds what the CCM length field can carry.
    #[error("message too large for CCM parameters")]
    MessageTooLarge,

    /// Device secret is not a valid AES-128 key.
    #[error("device secret must be 16 bytes, got {0}")]
    InvalidSecretLength(usize),
}
