//! The `GattLink` collaborator trait.
//!
//! The BLE radio stack is an external collaborator: anything that can write
//! a characteristic and surface notifications can carry this protocol.
//! Production implementations wrap a platform GATT client; tests script the
//! trait directly over in-memory channels.

use async_trait::async_trait;

use crate::error::LinkError;

/// Write characteristic accepting the client's ≤20-byte frames.
pub const WRITE_CHARACTERISTIC_UUID: &str = "16860002-a5ae-9856-b6d3-dbb4c676993e";

/// Notify characteristic delivering the device's ≤20-byte frames.
pub const NOTIFY_CHARACTERISTIC_UUID: &str = "16860003-a5ae-9856-b6d3-dbb4c676993e";

/// Largest payload a single characteristic write may carry.
pub const MAX_WRITE: usize = 20;

/// A generic BLE GATT client, as seen by the transport.
///
/// Implementations must deliver notifications in arrival order and complete
/// each `write` before the next one is issued; the transport serializes its
/// calls, so no internal locking is required.
#[async_trait]
pub trait GattLink: Send + 'static {
    /// Connect and subscribe to the notify characteristic.
    async fn connect(&mut self) -> Result<(), LinkError>;

    /// Unsubscribe and drop the connection. Idempotent.
    async fn disconnect(&mut self) -> Result<(), LinkError>;

    /// Write one frame (≤ [`MAX_WRITE`] bytes) to the write characteristic.
    async fn write(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    /// Next notification from the device, in arrival order.
    ///
    /// Pends while the link is connected but idle; returns `None` once the
    /// link is closed for good.
    async fn next_notification(&mut self) -> Option<Vec<u8>>;
}
