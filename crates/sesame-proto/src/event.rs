//! Typed decoding of inbound messages.
//!
//! Every reassembled (and, where flagged, decrypted) inbound message is
//! `type: u8 ‖ item_code: u8 ‖ data`. [`decode`] turns that into one closed
//! [`Event`] sum type with a variant per item code; all integers are
//! little-endian.

use bitflags::bitflags;

use crate::error::ProtoError;
use crate::item_code::ItemCode;

/// Metadata handed to subscribers alongside each dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMeta {
    /// Whether the message arrived on an encrypted-terminal frame.
    pub was_encrypted: bool,
}

bitflags! {
    /// Flags byte of a mech status push (bits 0-6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MechFlags: u8 {
        /// Clutch failed to engage.
        const CLUTCH_FAILED = 1 << 0;
        /// Position is inside the configured lock range.
        const LOCK_RANGE = 1 << 1;
        /// Position is inside the configured unlock range.
        const UNLOCK_RANGE = 1 << 2;
        /// Battery critically low.
        const CRITICAL = 1 << 3;
        /// Motor stopped.
        const STOP = 1 << 4;
        /// Battery low.
        const LOW_BATTERY = 1 << 5;
        /// Motor turns clockwise.
        const CLOCKWISE = 1 << 6;
    }
}

/// Mechanical status push (item 81), also embedded in history records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MechStatus {
    /// Battery voltage in millivolts.
    pub battery_mv: u16,
    /// Target motor position.
    pub target: i16,
    /// Current motor position.
    pub position: i16,
    /// Status flags byte.
    pub flags: MechFlags,
}

impl MechStatus {
    /// Decode the fixed 7-byte layout.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtoError> {
        if data.len() < 7 {
            return Err(ProtoError::Truncated {
                item_code: ItemCode::MechStatus.as_u8(),
                len: data.len(),
                expected: 7,
            });
        }
        Ok(Self {
            battery_mv: u16::from_le_bytes([data[0], data[1]]),
            target: i16::from_le_bytes([data[2], data[3]]),
            position: i16::from_le_bytes([data[4], data[5]]),
            flags: MechFlags::from_bits_truncate(data[6]),
        })
    }

    /// Position is inside the lock range.
    pub fn lock_range(&self) -> bool {
        self.flags.contains(MechFlags::LOCK_RANGE)
    }

    /// Position is inside the unlock range.
    pub fn unlock_range(&self) -> bool {
        self.flags.contains(MechFlags::UNLOCK_RANGE)
    }

    /// Battery is critically low.
    pub fn critical(&self) -> bool {
        self.flags.contains(MechFlags::CRITICAL)
    }

    /// Battery is low.
    pub fn low_battery(&self) -> bool {
        self.flags.contains(MechFlags::LOW_BATTERY)
    }
}

/// Mechanical settings (item 80): lock/unlock angles and autolock delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MechSettings {
    /// Locked motor position.
    pub lock: i16,
    /// Unlocked motor position.
    pub unlock: i16,
    /// Autolock delay in seconds, 0 when disabled.
    pub auto_lock_seconds: u16,
}

impl MechSettings {
    fn from_bytes(data: &[u8]) -> Result<Self, ProtoError> {
        if data.len() < 6 {
            return Err(ProtoError::Truncated {
                item_code: ItemCode::MechSettings.as_u8(),
                len: data.len(),
                expected: 6,
            });
        }
        Ok(Self {
            lock: i16::from_le_bytes([data[0], data[1]]),
            unlock: i16::from_le_bytes([data[2], data[3]]),
            auto_lock_seconds: u16::from_le_bytes([data[4], data[5]]),
        })
    }
}

/// What triggered a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    /// No event.
    None,
    /// Locked over BLE.
    BleLock,
    /// Unlocked over BLE.
    BleUnlock,
    /// Device clock changed.
    TimeChanged,
    /// Autolock setting updated.
    AutolockUpdated,
    /// Mech settings updated.
    MechSettingUpdated,
    /// Autolock fired.
    Autolock,
    /// Thumb-turned to locked.
    ManualLocked,
    /// Thumb-turned to unlocked.
    ManualUnlocked,
    /// Thumb-turned elsewhere.
    ManualElse,
    /// Motor drive reached locked.
    DriveLocked,
    /// Motor drive reached unlocked.
    DriveUnlocked,
    /// Motor drive failed.
    DriveFailed,
    /// BLE advertising parameters updated.
    BleAdvParamUpdated,
    /// Locked via WM2 bridge.
    Wm2Lock,
    /// Unlocked via WM2 bridge.
    Wm2Unlock,
    /// Locked via web API.
    WebLock,
    /// Unlocked via web API.
    WebUnlock,
    /// Code not in the known set.
    Other(u8),
}

impl HistoryKind {
    fn from_u8(kind: u8) -> Self {
        match kind {
            0 => Self::None,
            1 => Self::BleLock,
            2 => Self::BleUnlock,
            3 => Self::TimeChanged,
            4 => Self::AutolockUpdated,
            5 => Self::MechSettingUpdated,
            6 => Self::Autolock,
            7 => Self::ManualLocked,
            8 => Self::ManualUnlocked,
            9 => Self::ManualElse,
            10 => Self::DriveLocked,
            11 => Self::DriveUnlocked,
            12 => Self::DriveFailed,
            13 => Self::BleAdvParamUpdated,
            14 => Self::Wm2Lock,
            15 => Self::Wm2Unlock,
            16 => Self::WebLock,
            17 => Self::WebUnlock,
            other => Self::Other(other),
        }
    }
}

/// One record from the device's history log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Record id, used for deletion.
    pub id: u32,
    /// What triggered the record.
    pub kind: HistoryKind,
    /// Unix timestamp of the record.
    pub timestamp: u32,
    /// Mech status snapshot at record time.
    pub mech_status: MechStatus,
    /// Trailing SS5 blob, present on newer firmware.
    pub ss5: Option<Vec<u8>>,
}

impl HistoryEntry {
    /// Decode from the status byte onward (`data[0]` is the status).
    fn from_bytes(data: &[u8]) -> Result<Self, ProtoError> {
        if data.len() < 17 {
            return Err(ProtoError::Truncated {
                item_code: ItemCode::History.as_u8(),
                len: data.len(),
                expected: 17,
            });
        }
        let ss5 = data.get(17).map(|&len| {
            let blob = &data[18..];
            blob[..blob.len().min(len as usize)].to_vec()
        });
        Ok(Self {
            id: u32::from_le_bytes([data[1], data[2], data[3], data[4]]),
            kind: HistoryKind::from_u8(data[5]),
            timestamp: u32::from_le_bytes([data[6], data[7], data[8], data[9]]),
            mech_status: MechStatus::from_bytes(&data[10..17])?,
            ss5,
        })
    }
}

/// Decoded inbound message, one variant per item code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Login acknowledgment carrying the device clock (informational).
    Login {
        /// Device unix timestamp.
        timestamp: u32,
    },
    /// History query response; `None` when the log is empty.
    History(Option<HistoryEntry>),
    /// Firmware version string.
    Version(String),
    /// Acknowledgment of a set-autolock command.
    AutolockTimeAck,
    /// Device-issued session challenge.
    Challenge([u8; 4]),
    /// History-delete response status; 0 is success.
    DeleteHistory {
        /// Device status code.
        status: u8,
    },
    /// Mechanical settings push.
    MechSettings(MechSettings),
    /// Mechanical status push.
    MechStatus(MechStatus),
    /// Lock response status; 0 is success.
    Lock {
        /// Device status code.
        status: u8,
    },
    /// Unlock response status; 0 is success.
    Unlock {
        /// Device status code.
        status: u8,
    },
    /// Open-sensor autolock timer push.
    AutolockTimer {
        /// Timer value in seconds.
        seconds: u16,
    },
}

fn ensure_len(message: &[u8], expected: usize) -> Result<(), ProtoError> {
    if message.len() < expected {
        Err(ProtoError::Truncated { item_code: message[1], len: message.len(), expected })
    } else {
        Ok(())
    }
}

/// Decode a complete inbound message (`type ‖ item_code ‖ data`).
///
/// Item codes outside the closed set yield [`ProtoError::UnknownItemCode`];
/// the transport logs those and still hands the raw bytes to any waiter.
pub fn decode(message: &[u8]) -> Result<Event, ProtoError> {
    if message.is_empty() {
        return Err(ProtoError::Empty);
    }
    if message.len() < 2 {
        return Err(ProtoError::Truncated { item_code: 0, len: message.len(), expected: 2 });
    }
    let code = ItemCode::from_u8(message[1]).ok_or(ProtoError::UnknownItemCode(message[1]))?;

    match code {
        ItemCode::Login => {
            ensure_len(message, 7)?;
            Ok(Event::Login {
                timestamp: u32::from_le_bytes([message[3], message[4], message[5], message[6]]),
            })
        },
        ItemCode::History => {
            ensure_len(message, 3)?;
            if message[2] == 0 {
                Ok(Event::History(Some(HistoryEntry::from_bytes(&message[2..])?)))
            } else {
                // Status 5 is the explicit no-history marker; any other
                // non-zero status also carries no record.
                Ok(Event::History(None))
            }
        },
        ItemCode::Version => {
            ensure_len(message, 15)?;
            Ok(Event::Version(String::from_utf8_lossy(&message[3..15]).into_owned()))
        },
        ItemCode::SetAutolockTime => Ok(Event::AutolockTimeAck),
        ItemCode::Challenge => {
            ensure_len(message, 6)?;
            Ok(Event::Challenge([message[2], message[3], message[4], message[5]]))
        },
        ItemCode::DeleteHistory => {
            ensure_len(message, 3)?;
            Ok(Event::DeleteHistory { status: message[2] })
        },
        ItemCode::MechSettings => {
            ensure_len(message, 8)?;
            if message[0] != 8 {
                return Err(ProtoError::UnsupportedType {
                    item_code: code.as_u8(),
                    type_byte: message[0],
                });
            }
            Ok(Event::MechSettings(MechSettings::from_bytes(&message[2..])?))
        },
        ItemCode::MechStatus => {
            ensure_len(message, 9)?;
            Ok(Event::MechStatus(MechStatus::from_bytes(&message[2..9])?))
        },
        ItemCode::Lock => {
            ensure_len(message, 3)?;
            Ok(Event::Lock { status: message[2] })
        },
        ItemCode::Unlock => {
            ensure_len(message, 3)?;
            Ok(Event::Unlock { status: message[2] })
        },
        ItemCode::AutolockTimer => {
            ensure_len(message, 4)?;
            Ok(Event::AutolockTimer { seconds: u16::from_le_bytes([message[2], message[3]]) })
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mech_status_flags_scenario() {
        // battery=3700 mV, target=100, position=100, flags 0b0010_0010
        let payload = [0x74, 0x0E, 100, 0, 100, 0, 0b0010_0010];
        let status = MechStatus::from_bytes(&payload).unwrap();
        assert_eq!(status.battery_mv, 3700);
        assert_eq!(status.target, 100);
        assert_eq!(status.position, 100);
        assert!(status.lock_range());
        assert!(status.low_battery());
        assert!(!status.critical());
        assert!(!status.unlock_range());
    }

    #[test]
    fn mech_status_negative_positions() {
        let payload = [0x74, 0x0E, 0x9C, 0xFF, 0x38, 0xFF, 0];
        let status = MechStatus::from_bytes(&payload).unwrap();
        assert_eq!(status.target, -100);
        assert_eq!(status.position, -200);
    }

    #[test]
    fn mech_status_push_decodes() {
        let message = [8, 81, 0x74, 0x0E, 100, 0, 100, 0, 0b0100_0000, 0xEE];
        match decode(&message).unwrap() {
            Event::MechStatus(status) => {
                assert!(status.flags.contains(MechFlags::CLOCKWISE));
            },
            other => panic!("expected mech status, got {other:?}"),
        }
    }

    #[test]
    fn login_timestamp() {
        let message = [7, 2, 0, 0x78, 0x56, 0x34, 0x12];
        assert_eq!(decode(&message).unwrap(), Event::Login { timestamp: 0x1234_5678 });
    }

    #[test]
    fn history_with_record_and_ss5() {
        let mut message = vec![7u8, 4];
        message.push(0); // status: record follows
        message.extend_from_slice(&0x0A0B_0C0Du32.to_le_bytes()); // id
        message.push(2); // kind: BLE unlock
        message.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        message.extend_from_slice(&[0x74, 0x0E, 100, 0, 100, 0, 0b10]); // mech status
        message.push(3); // ss5 length
        message.extend_from_slice(&[0xA1, 0xA2, 0xA3]);

        match decode(&message).unwrap() {
            Event::History(Some(entry)) => {
                assert_eq!(entry.id, 0x0A0B_0C0D);
                assert_eq!(entry.kind, HistoryKind::BleUnlock);
                assert_eq!(entry.timestamp, 1_700_000_000);
                assert!(entry.mech_status.lock_range());
                assert_eq!(entry.ss5.as_deref(), Some(&[0xA1, 0xA2, 0xA3][..]));
            },
            other => panic!("expected history record, got {other:?}"),
        }
    }

    #[test]
    fn history_status_five_is_empty_not_error() {
        let message = [7, 4, 5];
        assert_eq!(decode(&message).unwrap(), Event::History(None));
    }

    #[test]
    fn version_string() {
        let mut message = vec![7u8, 5, 0];
        message.extend_from_slice(b"3.0-1-abcdef");
        match decode(&message).unwrap() {
            Event::Version(version) => assert_eq!(version, "3.0-1-abcdef"),
            other => panic!("expected version, got {other:?}"),
        }
    }

    #[test]
    fn challenge_bytes() {
        let message = [7, 14, 0x11, 0x22, 0x33, 0x44];
        assert_eq!(decode(&message).unwrap(), Event::Challenge([0x11, 0x22, 0x33, 0x44]));
    }

    #[test]
    fn autolock_timer_push() {
        let message = [7, 92, 0x2C, 0x01];
        assert_eq!(decode(&message).unwrap(), Event::AutolockTimer { seconds: 300 });
    }

    #[test]
    fn mech_settings_requires_type_eight() {
        let ok = [8, 80, 0x9C, 0xFF, 100, 0, 0x2C, 0x01];
        match decode(&ok).unwrap() {
            Event::MechSettings(settings) => {
                assert_eq!(settings.lock, -100);
                assert_eq!(settings.unlock, 100);
                assert_eq!(settings.auto_lock_seconds, 300);
            },
            other => panic!("expected mech settings, got {other:?}"),
        }

        let bad = [7, 80, 0x9C, 0xFF, 100, 0, 0x2C, 0x01];
        assert!(matches!(decode(&bad), Err(ProtoError::UnsupportedType { .. })));
    }

    #[test]
    fn unknown_item_code() {
        let message = [7, 200, 1, 2, 3];
        assert_eq!(decode(&message), Err(ProtoError::UnknownItemCode(200)));
    }

    #[test]
    fn truncated_login() {
        let message = [7, 2, 0, 1];
        assert!(matches!(decode(&message), Err(ProtoError::Truncated { expected: 7, .. })));
    }
}
