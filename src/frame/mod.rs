//! WebSocket frames (RFC 6455 section 5.2) and their byte encoding.
//!
//! The codec works directly on async byte streams: [`read_frame`] pulls one
//! frame off an `AsyncRead`, [`write_frame`] pushes one unmasked server frame
//! into an `AsyncWrite`. Neither buffers beyond the frame in flight.

mod decoder;
mod encoder;

pub use decoder::{read_frame, read_frame_with_limit};
pub use encoder::{write_binary, write_close, write_frame, write_ping, write_pong, write_text};

use bytes::Bytes;

use crate::close::build_close_payload;
use crate::error::ProtocolError;

/// Largest payload a CLOSE, PING or PONG frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Largest close reason: control payload minus the 2-byte status code.
pub const MAX_CLOSE_REASON: usize = MAX_CONTROL_PAYLOAD - 2;

pub(crate) const FIN_BIT: u8 = 0x80;
pub(crate) const RSV_BITS: u8 = 0x70;
pub(crate) const OPCODE_BITS: u8 = 0x0F;
pub(crate) const MASK_BIT: u8 = 0x80;
pub(crate) const LENGTH_BITS: u8 = 0x7F;
pub(crate) const LENGTH_16: u8 = 126;
pub(crate) const LENGTH_64: u8 = 127;

/// Frame opcode (low 4 bits of the first header byte).
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Parse a 4-bit opcode; every value outside the six defined ones is invalid.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(ProtocolError::InvalidOpcode(other)),
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuation => "continuation",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of the wire protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// True if this frame completes a message.
    pub final_fragment: bool,
    pub opcode: Opcode,
    /// Unmasked payload.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(final_fragment: bool, opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            final_fragment,
            opcode,
            payload: payload.into(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(true, Opcode::Text, Bytes::copy_from_slice(text.as_bytes()))
    }

    pub fn binary(data: &[u8]) -> Self {
        Self::new(true, Opcode::Binary, Bytes::copy_from_slice(data))
    }

    /// CLOSE frame with a status code and optional reason of at most 123 bytes.
    pub fn close(code: u16, reason: Option<&str>) -> Result<Self, ProtocolError> {
        Ok(Self::new(true, Opcode::Close, build_close_payload(code, reason)?))
    }

    pub fn ping(payload: &[u8]) -> Self {
        Self::new(true, Opcode::Ping, Bytes::copy_from_slice(payload))
    }

    /// PONG frame; conventionally echoes the payload of the PING it answers.
    pub fn pong(payload: &[u8]) -> Self {
        Self::new(true, Opcode::Pong, Bytes::copy_from_slice(payload))
    }

    /// Control frames must be final and carry at most 125 bytes.
    pub(crate) fn check_control(&self) -> Result<(), ProtocolError> {
        if !self.opcode.is_control() {
            return Ok(());
        }
        if self.payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(ProtocolError::ControlFrameTooLarge(self.payload.len() as u64));
        }
        if !self.final_fragment {
            return Err(ProtocolError::FragmentedControlFrame);
        }
        Ok(())
    }
}

/// XOR `payload` in place with the 4-byte masking key. Applying it twice
/// restores the original bytes.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_values() {
        for (raw, op) in [
            (0x0, Opcode::Continuation),
            (0x1, Opcode::Text),
            (0x2, Opcode::Binary),
            (0x8, Opcode::Close),
            (0x9, Opcode::Ping),
            (0xA, Opcode::Pong),
        ] {
            assert_eq!(Opcode::from_u8(raw).unwrap(), op);
            assert_eq!(op as u8, raw);
        }
        for raw in (0x3..=0x7).chain(0xB..=0xF) {
            assert!(matches!(
                Opcode::from_u8(raw),
                Err(ProtocolError::InvalidOpcode(v)) if v == raw
            ));
        }
    }

    #[test]
    fn control_classification() {
        assert!(Opcode::Close.is_control());
        assert!(Opcode::Ping.is_control());
        assert!(Opcode::Pong.is_control());
        assert!(!Opcode::Text.is_control());
        assert!(!Opcode::Continuation.is_control());
    }

    #[test]
    fn mask_vector() {
        let key = [0x01, 0x02, 0x03, 0x04];
        let mut payload = [0x01, 0x02, 0x03, 0x04, 0x05];
        apply_mask(&mut payload, key);
        assert_eq!(payload, [0x00, 0x00, 0x00, 0x00, 0x04]);
        apply_mask(&mut payload, key);
        assert_eq!(payload, [0x01, 0x02, 0x03, 0x04, 0x05]);
    }

    #[test]
    fn close_frame_payload() {
        let frame = Frame::close(1000, Some("bye")).unwrap();
        assert!(frame.final_fragment);
        assert_eq!(frame.opcode, Opcode::Close);
        assert_eq!(&frame.payload[..], &[0x03, 0xE8, b'b', b'y', b'e']);
    }

    #[test]
    fn control_checks() {
        assert!(Frame::ping(&[0u8; 125]).check_control().is_ok());
        assert!(matches!(
            Frame::ping(&[0u8; 126]).check_control(),
            Err(ProtocolError::ControlFrameTooLarge(126))
        ));
        let fragmented = Frame::new(false, Opcode::Pong, Bytes::new());
        assert!(matches!(
            fragmented.check_control(),
            Err(ProtocolError::FragmentedControlFrame)
        ));
        // data frames are never limited here
        assert!(Frame::binary(&[0u8; 1000]).check_control().is_ok());
    }
}
