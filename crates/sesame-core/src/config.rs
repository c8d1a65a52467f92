//! Client configuration.

use std::time::Duration;

/// Timeouts governing the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Budget for the whole handshake: challenge received through login
    /// acknowledged. Exceeding it fails `connect()` with a handshake error.
    pub handshake_timeout: Duration,

    /// Per-command deadline for a matching response. A timed-out command
    /// fails with a named timeout error and is not retried.
    pub command_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(20),
            command_timeout: Duration::from_secs(5),
        }
    }
}
