//! Cryptographic session layer for the Sesame protocol.
//!
//! The device issues a 4-byte random challenge at connect time. The session
//! key is CMAC-AES over the challenge-bearing message under the long-term
//! device secret, and all post-login traffic is AES-CCM with a 4-byte tag,
//! nonced by per-direction monotonic counters mixed with the challenge.
//!
//! # Security
//!
//! Nonce reuse under CCM is a catastrophic failure, so counter advancement
//! happens only inside [`SecureSession::encrypt`] and
//! [`SecureSession::decrypt`] - exactly once per call, including failed
//! decrypts, keeping the client's receive counter in lockstep with the
//! device's send counter. There is no other way to touch the counters.

pub mod derive;
pub mod error;
pub mod session;

pub use derive::{LOGIN_PROOF_LEN, SESSION_KEY_LEN, derive_session_key, login_proof};
pub use error::CryptoError;
pub use session::{SecureSession, TAG_LEN};
