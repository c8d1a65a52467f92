//! Core protocol logic for the Sesame BLE lock client.
//!
//! Pure state machine logic, decoupled from I/O: the handshake accepts
//! decoded messages and returns declarative actions for a driver
//! (`sesame-client`'s transport actor in production, plain function calls
//! in tests) to execute. Time, radio I/O and scheduling stay outside, which
//! keeps every transition deterministic and testable.
//!
//! # Components
//!
//! - [`handshake`]: login handshake state machine
//! - [`link`]: the `GattLink` collaborator trait over the external BLE stack
//! - [`config`]: client timeouts
//! - [`error`]: link and handshake error types

pub mod config;
pub mod error;
pub mod handshake;
pub mod link;

pub use config::ClientConfig;
pub use error::{HandshakeError, LinkError};
pub use handshake::{Handshake, HandshakeAction, HandshakeState};
pub use link::{GattLink, MAX_WRITE, NOTIFY_CHARACTERISTIC_UUID, WRITE_CHARACTERISTIC_UUID};
