//! Wire format for the Sesame BLE lock protocol.
//!
//! The link is a BLE GATT characteristic pair with a 20-byte write limit, so
//! every logical message travels as one or more fragments carrying a 1-byte
//! segmentation header followed by at most 19 payload bytes. Reassembled
//! messages are a 1-byte item code multiplexing all commands, responses and
//! pushes over the single notification stream; responses additionally carry
//! a leading type byte ahead of the item code.
//!
//! Whether a message is encrypted is signalled per frame (terminal headers
//! come in a plaintext and an encrypted flavor), not inside the message, so
//! the codec reports an `encrypted` flag alongside every completed message.
//!
//! Everything here is pure byte manipulation: encryption itself lives in
//! `sesame-crypto` and I/O in `sesame-client`.

pub mod command;
pub mod error;
pub mod event;
pub mod frame;
pub mod item_code;

pub use command::{Command, MAX_DISPLAY_NAME};
pub use error::ProtoError;
pub use event::{Event, EventMeta, HistoryEntry, HistoryKind, MechFlags, MechSettings, MechStatus};
pub use frame::{FrameHeader, MAX_CHUNK, Reassembler, fragment};
pub use item_code::ItemCode;
