//! Login handshake state machine.
//!
//! Drives the session-establishing login sequence as a pure state machine:
//! methods accept decoded messages and return `Result<Vec<HandshakeAction>>`
//! for the driver to execute. No I/O, no time, no randomness inside - the
//! only entropy is the device's challenge, so a handshake is a pure function
//! of `(device secret, challenge message)`.
//!
//! # State machine
//!
//! ```text
//! ┌──────────────┐ link ready ┌───────────────────┐ item 14 ┌─────────────┐
//! │ Disconnected │───────────>│ AwaitingChallenge │────────>│ DerivingKey │
//! └──────────────┘            └───────────────────┘         └──────┬──────┘
//!                                                   key derived,   │
//!                                                   login sent     │
//!        ┌───────────────┐       item 2        ┌─────────────────┐ │
//!        │ Authenticated │<────────────────────│ AwaitingLoginAck│<┘
//!        └───────────────┘                     └─────────────────┘
//! ```
//!
//! `Failed` is terminal and reachable from every state via [`Handshake::fail`]
//! (the driver calls it when its timeout elapses or derivation errors out).
//!
//! The login proof travels unencrypted: the session is not mutually
//! confirmed until the device answers with the item-2 acknowledgment, after
//! which all application commands go through the secure session.

use tracing::{debug, info};

use sesame_crypto::derive::{LOGIN_PROOF_LEN, SESSION_KEY_LEN, derive_session_key, login_proof};
use sesame_proto::ItemCode;

use crate::error::HandshakeError;

/// Actions returned by the handshake state machine.
///
/// The driver (the transport actor, or a test) executes these in order:
/// install the session first, then send the login proof through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Construct the secure session from the derived key and challenge,
    /// counters zeroed.
    InstallSession {
        /// Derived session key.
        key: [u8; SESSION_KEY_LEN],
        /// Device challenge, part of every nonce for this session.
        challenge: [u8; 4],
    },

    /// Send the item-2 login command carrying this proof, unencrypted.
    SendLogin {
        /// First four bytes of the session key.
        proof: [u8; LOGIN_PROOF_LEN],
    },
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No link yet.
    Disconnected,
    /// Link up and subscribed; waiting for the item-14 challenge.
    AwaitingChallenge,
    /// Challenge received; key derivation in progress.
    DerivingKey,
    /// Login proof sent; waiting for the item-2 acknowledgment.
    AwaitingLoginAck,
    /// Session established; application traffic may flow encrypted.
    Authenticated,
    /// Handshake failed (timeout or derivation error). Terminal.
    Failed,
}

/// Login handshake state machine.
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
    secret: [u8; 16],
}

impl Handshake {
    /// Create a handshake in `Disconnected`, holding the long-term device
    /// secret.
    pub fn new(secret: [u8; 16]) -> Self {
        Self { state: HandshakeState::Disconnected, secret }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Whether application commands may be sent encrypted.
    pub fn is_authenticated(&self) -> bool {
        self.state == HandshakeState::Authenticated
    }

    /// The link connected and subscribed to notifications.
    ///
    /// # Errors
    /// `InvalidState` unless currently `Disconnected`.
    pub fn link_ready(&mut self) -> Result<(), HandshakeError> {
        if self.state != HandshakeState::Disconnected {
            return Err(HandshakeError::InvalidState {
                state: self.state,
                operation: "link_ready",
            });
        }
        self.state = HandshakeState::AwaitingChallenge;
        Ok(())
    }

    /// Feed one decoded inbound message.
    ///
    /// Messages that are not the step the handshake is waiting for pass
    /// through with no actions and no state change; the dispatcher still
    /// delivers them to listeners. On the item-14 challenge this derives
    /// the session key and emits the install/login actions; on the item-2
    /// acknowledgment it completes the handshake.
    pub fn on_message(&mut self, message: &[u8]) -> Result<Vec<HandshakeAction>, HandshakeError> {
        let code = message.get(1).copied().and_then(ItemCode::from_u8);
        match (self.state, code) {
            (HandshakeState::AwaitingChallenge, Some(ItemCode::Challenge)) => {
                self.state = HandshakeState::DerivingKey;
                self.on_challenge(message).inspect_err(|_| self.state = HandshakeState::Failed)
            },
            (HandshakeState::AwaitingLoginAck, Some(ItemCode::Login)) => {
                self.state = HandshakeState::Authenticated;
                info!("handshake complete, session established");
                Ok(vec![])
            },
            _ => Ok(vec![]),
        }
    }

    fn on_challenge(&mut self, message: &[u8]) -> Result<Vec<HandshakeAction>, HandshakeError> {
        if message.len() < 6 {
            return Err(HandshakeError::ChallengeTooShort { len: message.len() });
        }
        let challenge = [message[2], message[3], message[4], message[5]];
        // The CMAC input is the whole challenge payload, trailing bytes
        // included, not just the 4 challenge bytes.
        let key = derive_session_key(&self.secret, &message[2..])?;
        let proof = login_proof(&key);

        debug!(challenge = ?challenge, "challenge received, key derived");
        self.state = HandshakeState::AwaitingLoginAck;
        Ok(vec![
            HandshakeAction::InstallSession { key, challenge },
            HandshakeAction::SendLogin { proof },
        ])
    }

    /// Move to the terminal `Failed` state (driver timeout or send error).
    pub fn fail(&mut self) {
        self.state = HandshakeState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    const CHALLENGE_MESSAGE: [u8; 6] = [7, 14, 0x11, 0x22, 0x33, 0x44];
    const LOGIN_ACK: [u8; 7] = [7, 2, 0, 0x78, 0x56, 0x34, 0x12];

    #[test]
    fn full_handshake_lifecycle() {
        let mut handshake = Handshake::new([0u8; 16]);
        assert_eq!(handshake.state(), HandshakeState::Disconnected);

        handshake.link_ready().unwrap();
        assert_eq!(handshake.state(), HandshakeState::AwaitingChallenge);

        let actions = handshake.on_message(&CHALLENGE_MESSAGE).unwrap();
        assert_eq!(handshake.state(), HandshakeState::AwaitingLoginAck);
        assert_eq!(
            actions,
            vec![
                HandshakeAction::InstallSession {
                    key: hex!("2b3cbebb794a6a64fd62074641024ed3"),
                    challenge: hex!("11223344"),
                },
                HandshakeAction::SendLogin { proof: hex!("2b3cbebb") },
            ]
        );

        let actions = handshake.on_message(&LOGIN_ACK).unwrap();
        assert!(actions.is_empty());
        assert!(handshake.is_authenticated());
    }

    #[test]
    fn same_inputs_derive_same_key() {
        let run = || {
            let mut handshake = Handshake::new([3u8; 16]);
            handshake.link_ready().unwrap();
            handshake.on_message(&CHALLENGE_MESSAGE).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn unrelated_messages_pass_through() {
        let mut handshake = Handshake::new([0u8; 16]);
        handshake.link_ready().unwrap();

        // A mech status push before the challenge changes nothing.
        let actions = handshake.on_message(&[8, 81, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert!(actions.is_empty());
        assert_eq!(handshake.state(), HandshakeState::AwaitingChallenge);

        // A login ack in the wrong state is ignored, not an error.
        let actions = handshake.on_message(&LOGIN_ACK).unwrap();
        assert!(actions.is_empty());
        assert_eq!(handshake.state(), HandshakeState::AwaitingChallenge);
    }

    #[test]
    fn short_challenge_fails_terminally() {
        let mut handshake = Handshake::new([0u8; 16]);
        handshake.link_ready().unwrap();

        let result = handshake.on_message(&[7, 14, 0x11]);
        assert_eq!(result, Err(HandshakeError::ChallengeTooShort { len: 3 }));
        assert_eq!(handshake.state(), HandshakeState::Failed);

        // Terminal: a later good challenge is ignored.
        let actions = handshake.on_message(&CHALLENGE_MESSAGE).unwrap();
        assert!(actions.is_empty());
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[test]
    fn link_ready_twice_is_invalid() {
        let mut handshake = Handshake::new([0u8; 16]);
        handshake.link_ready().unwrap();
        assert!(matches!(
            handshake.link_ready(),
            Err(HandshakeError::InvalidState { operation: "link_ready", .. })
        ));
    }

    #[test]
    fn fail_is_reachable_from_any_state() {
        let mut handshake = Handshake::new([0u8; 16]);
        handshake.link_ready().unwrap();
        handshake.fail();
        assert_eq!(handshake.state(), HandshakeState::Failed);
        assert!(!handshake.is_authenticated());
    }
}
