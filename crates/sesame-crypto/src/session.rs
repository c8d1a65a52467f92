//! AES-CCM secure session with per-direction counter nonces.

use std::fmt;

use aes::Aes128;
use ccm::Ccm;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{Aead, KeyInit, Payload};
use ccm::consts::{U4, U13};

use crate::derive::SESSION_KEY_LEN;
use crate::error::CryptoError;

/// AES-128-CCM, 4-byte tag, 13-byte nonce.
type SessionCipher = Ccm<Aes128, U4, U13>;

/// Authentication tag length appended to every ciphertext.
pub const TAG_LEN: usize = 4;

const NONCE_LEN: usize = 13;

/// The protocol's fixed associated data: a single zero byte.
const AAD: [u8; 1] = [0];

/// Authenticated-encryption state for one established session.
///
/// Holds the derived key, the device challenge and one monotonic counter
/// per direction. Counters start at zero, advance exactly once per
/// encrypt/decrypt call (after the nonce is captured, success or not) and
/// are reachable only through those calls, which structurally rules out
/// nonce reuse within a direction.
pub struct SecureSession {
    cipher: SessionCipher,
    challenge: [u8; 4],
    send_counter: u64,
    recv_counter: u64,
}

impl SecureSession {
    /// Build a session from a derived key and the device challenge.
    pub fn new(key: &[u8; SESSION_KEY_LEN], challenge: [u8; 4]) -> Self {
        Self {
            cipher: SessionCipher::new(GenericArray::from_slice(key)),
            challenge,
            send_counter: 0,
            recv_counter: 0,
        }
    }

    /// Nonce for one message: counter (u64 LE) ‖ reserved zero ‖ challenge.
    fn nonce(&self, counter: u64) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..8].copy_from_slice(&counter.to_le_bytes());
        // nonce[8] stays zero (reserved byte)
        nonce[9..].copy_from_slice(&self.challenge);
        nonce
    }

    /// Encrypt an outbound message; the 4-byte tag is appended.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = self.nonce(self.send_counter);
        self.send_counter += 1;
        self.cipher
            .encrypt(GenericArray::from_slice(&nonce), Payload { msg: plaintext, aad: &AAD })
            .map_err(|_| CryptoError::MessageTooLarge)
    }

    /// Decrypt and authenticate an inbound message (ciphertext ‖ tag).
    ///
    /// The receive counter advances even when authentication fails: the
    /// device's send counter is authoritative and has already moved on, so
    /// staying in lockstep is what keeps later messages decryptable.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = self.nonce(self.recv_counter);
        self.recv_counter += 1;
        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::CiphertextTooShort { len: ciphertext.len(), min: TAG_LEN });
        }
        self.cipher
            .decrypt(GenericArray::from_slice(&nonce), Payload { msg: ciphertext, aad: &AAD })
            .map_err(|_| CryptoError::Authentication)
    }

    /// Messages encrypted so far.
    pub fn send_counter(&self) -> u64 {
        self.send_counter
    }

    /// Messages decrypted (or attempted) so far.
    pub fn recv_counter(&self) -> u64 {
        self.recv_counter
    }
}

impl fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key deliberately omitted.
        f.debug_struct("SecureSession")
            .field("challenge", &self.challenge)
            .field("send_counter", &self.send_counter)
            .field("recv_counter", &self.recv_counter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;
    use crate::derive::derive_session_key;

    const CHALLENGE: [u8; 4] = hex!("11223344");

    fn fixture_session() -> SecureSession {
        let key = derive_session_key(&[0u8; 16], &CHALLENGE).unwrap();
        SecureSession::new(&key, CHALLENGE)
    }

    #[test]
    fn fixture_ciphertext() {
        let mut session = fixture_session();
        let ciphertext = session.encrypt(b"\x53\x06Sesame").unwrap();
        assert_eq!(ciphertext.len(), 8 + TAG_LEN);
        assert_eq!(ciphertext, hex!("331ef7b7fd647342e8e9373f"));
        assert_eq!(session.send_counter(), 1);

        // Counter 1 produces a different ciphertext for the same plaintext.
        let second = session.encrypt(b"\x53\x06Sesame").unwrap();
        assert_eq!(second, hex!("e0a98466e9dbe0b18199f6f0"));
    }

    #[test]
    fn round_trip_between_peers() {
        // The directions are symmetric: the peer's send counter drives our
        // receive counter.
        let mut client = fixture_session();
        let mut device = fixture_session();

        for message in [&b"\x52\x50hello"[..], b"", &[0xFF; 40]] {
            let ciphertext = device.encrypt(message).unwrap();
            assert_eq!(client.decrypt(&ciphertext).unwrap(), message);
        }
        assert_eq!(client.recv_counter(), 3);
        assert_eq!(client.send_counter(), 0);
    }

    #[test]
    fn failed_decrypt_still_advances_recv_counter() {
        let mut client = fixture_session();
        let mut device = fixture_session();

        // Device message 0 is corrupted in flight and lost.
        let _ = device.encrypt(b"lost").unwrap();
        assert_eq!(client.decrypt(&[0u8; 8]), Err(CryptoError::Authentication));
        assert_eq!(client.recv_counter(), 1);

        // Message 1 still decrypts because the counters stayed in lockstep.
        let ciphertext = device.encrypt(b"next").unwrap();
        assert_eq!(client.decrypt(&ciphertext).unwrap(), b"next");
    }

    #[test]
    fn short_ciphertext_rejected_but_counted() {
        let mut session = fixture_session();
        assert_eq!(
            session.decrypt(&[1, 2]),
            Err(CryptoError::CiphertextTooShort { len: 2, min: TAG_LEN })
        );
        assert_eq!(session.recv_counter(), 1);
    }

    #[test]
    fn nonce_layout() {
        let session = fixture_session();
        let nonce = session.nonce(0x0102_0304_0506_0708);
        assert_eq!(nonce, hex!("0807060504030201 00 11223344"));
    }

    proptest! {
        #[test]
        fn counter_monotonicity_and_unique_nonces(n in 1usize..64) {
            let mut session = fixture_session();
            let mut nonces = std::collections::HashSet::new();
            for _ in 0..n {
                prop_assert!(nonces.insert(session.nonce(session.send_counter())));
                session.encrypt(b"payload").unwrap();
            }
            prop_assert_eq!(session.send_counter(), n as u64);
            prop_assert_eq!(nonces.len(), n);
        }

        #[test]
        fn bit_flip_breaks_authentication(
            message in proptest::collection::vec(any::<u8>(), 1..64),
            flip_byte in any::<prop::sample::Index>(),
            flip_bit in 0u8..8,
        ) {
            let mut sender = fixture_session();
            let mut receiver = fixture_session();

            let mut ciphertext = sender.encrypt(&message).unwrap();
            let index = flip_byte.index(ciphertext.len());
            ciphertext[index] ^= 1 << flip_bit;

            prop_assert_eq!(receiver.decrypt(&ciphertext), Err(CryptoError::Authentication));
        }

        #[test]
        fn ciphertext_is_plaintext_plus_tag(
            message in proptest::collection::vec(any::<u8>(), 0..=256),
        ) {
            let mut session = fixture_session();
            let ciphertext = session.encrypt(&message).unwrap();
            prop_assert_eq!(ciphertext.len(), message.len() + TAG_LEN);
        }
    }
}
