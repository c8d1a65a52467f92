//! Item codes multiplexing all message types over the single channel.

/// 1-byte command/response identifier carried by every logical message.
///
/// The same code is used for a command and its response; the protocol has
/// no request-ID field, so correlation is purely by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ItemCode {
    /// Login handshake: proof out, device timestamp back.
    Login = 2,
    /// History query (head/tail) and its record/empty response.
    History = 4,
    /// Firmware version string.
    Version = 5,
    /// Set the autolock delay.
    SetAutolockTime = 11,
    /// Device-issued random challenge, first message after subscribe.
    Challenge = 14,
    /// Delete one history record by id.
    DeleteHistory = 18,
    /// Mechanical settings (angles, autolock) push and update.
    MechSettings = 80,
    /// Mechanical status push (battery, position, flags).
    MechStatus = 81,
    /// Lock command.
    Lock = 82,
    /// Unlock command.
    Unlock = 83,
    /// Open-sensor autolock timer push.
    AutolockTimer = 92,
}

impl ItemCode {
    /// Map a wire byte onto the closed set of known codes.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            2 => Some(Self::Login),
            4 => Some(Self::History),
            5 => Some(Self::Version),
            11 => Some(Self::SetAutolockTime),
            14 => Some(Self::Challenge),
            18 => Some(Self::DeleteHistory),
            80 => Some(Self::MechSettings),
            81 => Some(Self::MechStatus),
            82 => Some(Self::Lock),
            83 => Some(Self::Unlock),
            92 => Some(Self::AutolockTimer),
            _ => None,
        }
    }

    /// Wire value of this code.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
