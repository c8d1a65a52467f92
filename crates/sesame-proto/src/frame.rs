//! Link-layer fragmentation and reassembly.
//!
//! Each GATT write or notification carries a 1-byte segmentation header
//! packed as `(kind << 1) | is_first`, where kind 0 is a middle fragment,
//! 1 a plaintext terminal and 2 an encrypted terminal. That yields six
//! observed header values:
//!
//! | value | meaning                                        |
//! |-------|------------------------------------------------|
//! | 0     | middle fragment                                |
//! | 1     | first fragment of a multi-fragment message     |
//! | 2     | final fragment, message is plaintext           |
//! | 3     | single-fragment plaintext message              |
//! | 4     | final fragment, message is encrypted           |
//! | 5     | single-fragment encrypted message              |
//!
//! A message is exactly one of single-fragment or multi-fragment;
//! multi-fragment messages open with header 1, carry interior fragments as
//! header 0 and terminate with header 2 or 4.

use bytes::Bytes;
use tracing::warn;

/// Maximum payload bytes per fragment: the 20-byte link write limit minus
/// the segmentation header.
pub const MAX_CHUNK: usize = 19;

/// Decoded segmentation header of a single fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHeader {
    /// Interior fragment of a multi-fragment message.
    Middle,
    /// First fragment of a multi-fragment message.
    First,
    /// Final fragment; the completed message is plaintext.
    PlainEnd,
    /// Entire plaintext message in one fragment.
    PlainSingle,
    /// Final fragment; the completed message is encrypted.
    EncryptedEnd,
    /// Entire encrypted message in one fragment.
    EncryptedSingle,
}

impl FrameHeader {
    /// Decode a header byte. Values above 5 are not part of the protocol.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Middle),
            1 => Some(Self::First),
            2 => Some(Self::PlainEnd),
            3 => Some(Self::PlainSingle),
            4 => Some(Self::EncryptedEnd),
            5 => Some(Self::EncryptedSingle),
            _ => None,
        }
    }

    /// Wire encoding of this header.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Middle => 0,
            Self::First => 1,
            Self::PlainEnd => 2,
            Self::PlainSingle => 3,
            Self::EncryptedEnd => 4,
            Self::EncryptedSingle => 5,
        }
    }
}

/// Split a logical message into link frames, each a 1-byte header followed
/// by at most [`MAX_CHUNK`] payload bytes.
///
/// The empty message still produces one (payload-less) single-fragment
/// frame so the receiver observes it.
pub fn fragment(message: &[u8], encrypted: bool) -> Vec<Vec<u8>> {
    let chunks: Vec<&[u8]> = if message.is_empty() {
        vec![&[]]
    } else {
        message.chunks(MAX_CHUNK).collect()
    };
    let last = chunks.len() - 1;

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let header = match (i, i == last) {
                (0, true) if encrypted => FrameHeader::EncryptedSingle,
                (0, true) => FrameHeader::PlainSingle,
                (0, false) => FrameHeader::First,
                (_, true) if encrypted => FrameHeader::EncryptedEnd,
                (_, true) => FrameHeader::PlainEnd,
                (_, false) => FrameHeader::Middle,
            };
            let mut frame = Vec::with_capacity(1 + chunk.len());
            frame.push(header.as_byte());
            frame.extend_from_slice(chunk);
            frame
        })
        .collect()
}

/// Reassembles inbound fragments into complete messages.
///
/// Owns the single per-connection reassembly buffer. The buffer is reset on
/// header 1, appended to by header 0 and the terminal headers, and flushed
/// exactly once per completed message. Single-fragment messages bypass the
/// buffer entirely.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: Vec<u8>,
}

impl Reassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw link frame (header byte included).
    ///
    /// Returns the completed message and its encrypted flag once a terminal
    /// fragment arrives. Frames with unknown headers are logged and
    /// dropped, zero-length frames ignored; a header-1 frame over an unflushed
    /// buffer abandons the previous partial message with a warning, as the
    /// device is observed to do under reconnect races.
    pub fn push(&mut self, frame: &[u8]) -> Option<(Bytes, bool)> {
        let (&header_byte, payload) = frame.split_first()?;
        let Some(header) = FrameHeader::from_byte(header_byte) else {
            warn!(header = header_byte, len = frame.len(), "dropping frame with unknown header");
            return None;
        };

        match header {
            FrameHeader::First => {
                if !self.buffer.is_empty() {
                    warn!(
                        abandoned = self.buffer.len(),
                        "overwriting incomplete reassembly buffer"
                    );
                }
                self.buffer.clear();
                self.buffer.extend_from_slice(payload);
                None
            },
            FrameHeader::Middle => {
                self.buffer.extend_from_slice(payload);
                None
            },
            FrameHeader::PlainEnd | FrameHeader::EncryptedEnd => {
                self.buffer.extend_from_slice(payload);
                let message = Bytes::from(std::mem::take(&mut self.buffer));
                Some((message, header == FrameHeader::EncryptedEnd))
            },
            FrameHeader::PlainSingle | FrameHeader::EncryptedSingle => Some((
                Bytes::copy_from_slice(payload),
                header == FrameHeader::EncryptedSingle,
            )),
        }
    }

    /// Bytes currently sitting in the partial-message buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn reassemble_all(frames: &[Vec<u8>]) -> Option<(Bytes, bool)> {
        let mut reassembler = Reassembler::new();
        let mut out = None;
        for frame in frames {
            if let Some(complete) = reassembler.push(frame) {
                assert!(out.is_none(), "message flushed more than once");
                out = Some(complete);
            }
        }
        out
    }

    #[test]
    fn single_fragment_plaintext() {
        let frames = fragment(b"hello", false);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0], 3);

        let (message, encrypted) = reassemble_all(&frames).unwrap();
        assert_eq!(&message[..], b"hello");
        assert!(!encrypted);
    }

    #[test]
    fn multi_fragment_headers() {
        // 40 bytes -> three fragments: first, middle, terminal
        let message = vec![0xAB; 40];
        let frames = fragment(&message, true);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0][0], 1);
        assert_eq!(frames[1][0], 0);
        assert_eq!(frames[2][0], 4);
        assert_eq!(frames[0].len(), 20);
        assert_eq!(frames[2].len(), 3);
    }

    #[test]
    fn first_middle_terminal_concatenates_as_encrypted() {
        let mut reassembler = Reassembler::new();
        assert!(reassembler.push(&[1, 0x01, 0x02]).is_none());
        assert!(reassembler.push(&[0, 0x03]).is_none());
        let (message, encrypted) = reassembler.push(&[4, 0x04]).unwrap();
        assert_eq!(&message[..], &[0x01, 0x02, 0x03, 0x04]);
        assert!(encrypted);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn empty_message_round_trips() {
        for encrypted in [false, true] {
            let frames = fragment(&[], encrypted);
            assert_eq!(frames.len(), 1);
            let (message, flag) = reassemble_all(&frames).unwrap();
            assert!(message.is_empty());
            assert_eq!(flag, encrypted);
        }
    }

    #[test]
    fn unknown_header_is_dropped() {
        let mut reassembler = Reassembler::new();
        assert!(reassembler.push(&[1, 0xAA]).is_none());
        assert!(reassembler.push(&[9, 0xBB]).is_none());
        // The buffered partial message is untouched by the bad frame.
        let (message, _) = reassembler.push(&[2, 0xCC]).unwrap();
        assert_eq!(&message[..], &[0xAA, 0xCC]);
    }

    #[test]
    fn new_first_fragment_abandons_stale_buffer() {
        let mut reassembler = Reassembler::new();
        assert!(reassembler.push(&[1, 0x11, 0x12]).is_none());
        // Terminal never arrives; a fresh message starts instead.
        assert!(reassembler.push(&[1, 0x21]).is_none());
        let (message, encrypted) = reassembler.push(&[2, 0x22]).unwrap();
        assert_eq!(&message[..], &[0x21, 0x22]);
        assert!(!encrypted);
    }

    #[test]
    fn single_fragment_bypasses_buffer() {
        let mut reassembler = Reassembler::new();
        assert!(reassembler.push(&[1, 0x31]).is_none());
        // An interleaved single-fragment push must not disturb the buffer.
        let (push, encrypted) = reassembler.push(&[5, 0x99]).unwrap();
        assert_eq!(&push[..], &[0x99]);
        assert!(encrypted);
        assert_eq!(reassembler.pending(), 1);
    }

    proptest! {
        #[test]
        fn fragment_reassemble_round_trip(
            message in proptest::collection::vec(any::<u8>(), 0..=500),
            encrypted in any::<bool>(),
        ) {
            let frames = fragment(&message, encrypted);
            for frame in &frames {
                prop_assert!(frame.len() <= 1 + MAX_CHUNK);
            }
            let (out, flag) = reassemble_all(&frames).unwrap();
            prop_assert_eq!(&out[..], &message[..]);
            prop_assert_eq!(flag, encrypted);
        }
    }
}
