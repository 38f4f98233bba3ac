use std::time::Duration;

use thiserror::Error;

use crate::close::CloseCode;

/// Library result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the codec and the connection layer.
#[derive(Error, Debug)]
pub enum Error {
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),

    /// The socket is no longer alive; the connection must not be used again.
    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Close code to send to the peer before tearing the connection down,
    /// if any frame can still be sent.
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::Protocol(e) => e.close_code(),
            Self::ConnectionClosed => None,
        }
    }

    /// A write failed after it may have put part of a frame on the wire.
    /// Nothing more can be framed on that stream.
    pub(crate) fn breaks_stream(&self) -> bool {
        matches!(
            self,
            Self::Protocol(
                ProtocolError::Io { .. }
                    | ProtocolError::ShortWrite { .. }
                    | ProtocolError::Timeout(_)
            )
        )
    }
}

/// Malformed or non-conformant frame data, or an I/O failure that leaves the
/// byte stream unusable. Always fatal to the connection.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("reserved bits set: {0:#05b}")]
    ReservedBitsSet(u8),

    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    #[error("control frame payload too large: {0} bytes (max 125)")]
    ControlFrameTooLarge(u64),

    #[error("control frame must not be fragmented")]
    FragmentedControlFrame,

    #[error("close reason too long: {0} bytes (max 123)")]
    CloseReasonTooLong(usize),

    #[error("close payload of a single byte")]
    InvalidClosePayload,

    #[error("most significant bit of 64-bit payload length is set")]
    InvalidLength,

    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: u64, max: u64 },

    #[error("message of {len} bytes exceeds limit of {max}")]
    MessageTooBig { len: usize, max: usize },

    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,

    #[error("new data frame while a fragmented message is in progress")]
    UnfinishedMessage,

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    #[error("short write: expected {expected} bytes, wrote {actual}")]
    ShortWrite { expected: usize, actual: usize },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        source: std::io::Error,
    },

    #[error("timed out while {0}")]
    Timeout(&'static str),

    #[error("no pong received within {0:?}")]
    PongTimeout(Duration),
}

impl ProtocolError {
    pub(crate) fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Io { context, source }
    }

    /// Status code describing this failure in a CLOSE frame. `None` when the
    /// socket itself failed and nothing more can be written. A peer that
    /// stops mid-frame has violated framing, so a short read is 1002.
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::InvalidUtf8(_) => Some(CloseCode::InconsistentData),
            Self::FrameTooLarge { .. } | Self::MessageTooBig { .. } => {
                Some(CloseCode::MessageTooBig)
            }
            Self::PongTimeout(_) => Some(CloseCode::GoingAway),
            Self::ShortWrite { .. } | Self::Io { .. } | Self::Timeout(_) => None,
            _ => Some(CloseCode::ProtocolError),
        }
    }
}
