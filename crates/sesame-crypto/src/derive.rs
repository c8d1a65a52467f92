//! Session key derivation.
//!
//! The key is CMAC-AES128 under the long-term device secret over the
//! challenge-bearing payload of the item-14 message (every byte from offset
//! 2 onward, challenge included). The first 4 bytes of the key double as
//! the login proof sent back to the device.
//!
//! This is a pure function of `(secret, challenge payload)`: two handshakes
//! over the same inputs derive the same key.

use aes::Aes128;
use cmac::{Cmac, Mac};

use crate::error::CryptoError;

/// Derived session key length in bytes (AES-128).
pub const SESSION_KEY_LEN: usize = 16;

/// Login proof length in bytes.
pub const LOGIN_PROOF_LEN: usize = 4;

/// Derive the session key from the device secret and the challenge payload
/// (the item-14 message from offset 2 onward).
pub fn derive_session_key(
    secret: &[u8],
    challenge_payload: &[u8],
) -> Result<[u8; SESSION_KEY_LEN], CryptoError> {
    let mut mac = Cmac::<Aes128>::new_from_slice(secret)
        .map_err(|_| CryptoError::InvalidSecretLength(secret.len()))?;
    mac.update(challenge_payload);
    let digest: [u8; SESSION_KEY_LEN] = mac.finalize().into_bytes().into();
    Ok(digest)
}

/// First [`LOGIN_PROOF_LEN`] bytes of the session key, proving possession
/// of the device secret.
pub fn login_proof(key: &[u8; SESSION_KEY_LEN]) -> [u8; LOGIN_PROOF_LEN] {
    [key[0], key[1], key[2], key[3]]
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn fixture_vector() {
        // Challenge 0x11223344 under the all-zero secret.
        let key = derive_session_key(&[0u8; 16], &hex!("11223344")).unwrap();
        assert_eq!(key, hex!("2b3cbebb794a6a64fd62074641024ed3"));
        assert_eq!(login_proof(&key), hex!("2b3cbebb"));
    }

    #[test]
    fn deterministic() {
        let secret = [7u8; 16];
        let payload = hex!("a1b2c3d4aabb");
        let first = derive_session_key(&secret, &payload).unwrap();
        let second = derive_session_key(&secret, &payload).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn trailing_payload_bytes_change_the_key() {
        let secret = [0u8; 16];
        let short = derive_session_key(&secret, &hex!("11223344")).unwrap();
        let long = derive_session_key(&secret, &hex!("1122334455")).unwrap();
        assert_ne!(short, long);
    }

    #[test]
    fn rejects_bad_secret_length() {
        let result = derive_session_key(&[0u8; 15], &hex!("11223344"));
        assert_eq!(result, Err(CryptoError::InvalidSecretLength(15)));
    }
}
