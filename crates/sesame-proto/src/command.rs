//! Outbound command encoding.

use crate::item_code::ItemCode;

/// Longest display name carried by a lock/unlock command, in bytes.
pub const MAX_DISPLAY_NAME: usize = 32;

/// A command the client can send to the device.
///
/// [`Command::encode`] produces the payload that follows the item-code byte
/// in the outbound message envelope; all integers are little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Login proof: the first 4 bytes of the derived session key. The only
    /// command sent unencrypted, since it is what confirms the session.
    Login {
        /// Key-possession proof.
        proof: [u8; 4],
    },
    /// Lock the door, recording `name` in the history log.
    Lock {
        /// Display name for the history record.
        name: String,
    },
    /// Unlock the door, recording `name` in the history log.
    Unlock {
        /// Display name for the history record.
        name: String,
    },
    /// Set the autolock delay; 0 disables autolock.
    SetAutolockTime {
        /// Delay in seconds.
        seconds: u16,
    },
    /// Set lock/unlock motor angles.
    SetMechSettings {
        /// Locked motor position.
        lock: i16,
        /// Unlocked motor position.
        unlock: i16,
    },
    /// Request the firmware version string.
    GetVersion,
    /// Fetch the newest history record without consuming it.
    HistoryHead,
    /// Pop the oldest history record.
    HistoryTail,
    /// Delete one history record.
    DeleteHistory {
        /// Record id from a previous history response.
        id: u32,
    },
}

impl Command {
    /// Item code this command is sent (and its response received) under.
    pub fn item_code(&self) -> ItemCode {
        match self {
            Self::Login { .. } => ItemCode::Login,
            Self::Lock { .. } => ItemCode::Lock,
            Self::Unlock { .. } => ItemCode::Unlock,
            Self::SetAutolockTime { .. } => ItemCode::SetAutolockTime,
            Self::SetMechSettings { .. } => ItemCode::MechSettings,
            Self::GetVersion => ItemCode::Version,
            Self::HistoryHead | Self::HistoryTail => ItemCode::History,
            Self::DeleteHistory { .. } => ItemCode::DeleteHistory,
        }
    }

    /// Whether the command goes out through the secure session.
    ///
    /// Everything except the login proof requires an established session.
    pub fn encrypted(&self) -> bool {
        !matches!(self, Self::Login { .. })
    }

    /// Command name for logs and timeout errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Lock { .. } => "lock",
            Self::Unlock { .. } => "unlock",
            Self::SetAutolockTime { .. } => "set autolock time",
            Self::SetMechSettings { .. } => "set mech settings",
            Self::GetVersion => "get version",
            Self::HistoryHead => "history head",
            Self::HistoryTail => "history tail",
            Self::DeleteHistory { .. } => "delete history",
        }
    }

    /// Encode the payload following the item-code byte.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Login { proof } => proof.to_vec(),
            Self::Lock { name } | Self::Unlock { name } => {
                let name = truncate_name(name);
                let mut payload = Vec::with_capacity(1 + name.len());
                payload.push(name.len() as u8);
                payload.extend_from_slice(name);
                payload
            },
            Self::SetAutolockTime { seconds } => seconds.to_le_bytes().to_vec(),
            Self::SetMechSettings { lock, unlock } => {
                let mut payload = Vec::with_capacity(4);
                payload.extend_from_slice(&lock.to_le_bytes());
                payload.extend_from_slice(&unlock.to_le_bytes());
                payload
            },
            Self::GetVersion => Vec::new(),
            Self::HistoryHead => vec![1],
            Self::HistoryTail => vec![0],
            Self::DeleteHistory { id } => id.to_le_bytes().to_vec(),
        }
    }
}

/// Clamp a display name to [`MAX_DISPLAY_NAME`] bytes on a character
/// boundary, so the wire payload stays valid UTF-8.
fn truncate_name(name: &str) -> &[u8] {
    let mut end = name.len().min(MAX_DISPLAY_NAME);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].as_bytes()
}
