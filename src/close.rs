//! Close status codes and CLOSE frame payloads (RFC 6455 sections 5.5.1, 7.4).

use crate::error::ProtocolError;
use crate::frame::MAX_CLOSE_REASON;

/// Status code carried in the first two bytes of a CLOSE payload.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    Normal = 1000,
    GoingAway = 1001,
    ProtocolError = 1002,
    UnacceptableData = 1003,
    NoCode = 1005,
    ClosedAbnormally = 1006,
    InconsistentData = 1007,
    PolicyViolation = 1008,
    MessageTooBig = 1009,
    ExtensionNegotiationFailure = 1010,
    UnexpectedCondition = 1011,
    TlsHandshakeFailure = 1015,
}

impl CloseCode {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::ProtocolError),
            1003 => Some(Self::UnacceptableData),
            1005 => Some(Self::NoCode),
            1006 => Some(Self::ClosedAbnormally),
            1007 => Some(Self::InconsistentData),
            1008 => Some(Self::PolicyViolation),
            1009 => Some(Self::MessageTooBig),
            1010 => Some(Self::ExtensionNegotiationFailure),
            1011 => Some(Self::UnexpectedCondition),
            1015 => Some(Self::TlsHandshakeFailure),
            _ => None,
        }
    }

    /// Codes that only describe a local condition and must never appear on the wire.
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            Self::NoCode | Self::ClosedAbnormally | Self::TlsHandshakeFailure
        )
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code as u16
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::Normal => "normal closure",
            Self::GoingAway => "going away",
            Self::ProtocolError => "protocol error",
            Self::UnacceptableData => "unacceptable data",
            Self::NoCode => "no status code",
            Self::ClosedAbnormally => "closed abnormally",
            Self::InconsistentData => "inconsistent data",
            Self::PolicyViolation => "policy violation",
            Self::MessageTooBig => "message too big",
            Self::ExtensionNegotiationFailure => "extension negotiation failure",
            Self::UnexpectedCondition => "unexpected condition",
            Self::TlsHandshakeFailure => "TLS handshake failure",
        };
        write!(f, "{} ({})", msg, *self as u16)
    }
}

/// Build a CLOSE payload: 2-byte big-endian code followed by the reason.
pub fn build_close_payload(code: u16, reason: Option<&str>) -> Result<Vec<u8>, ProtocolError> {
    let reason = reason.unwrap_or_default().as_bytes();
    if reason.len() > MAX_CLOSE_REASON {
        return Err(ProtocolError::CloseReasonTooLong(reason.len()));
    }
    let mut payload = Vec::with_capacity(2 + reason.len());
    payload.extend_from_slice(&code.to_be_bytes());
    payload.extend_from_slice(reason);
    Ok(payload)
}

/// Split a received CLOSE payload into status code and optional reason.
///
/// An empty payload means the peer sent no code, reported as 1005.
pub fn parse_close_payload(payload: &[u8]) -> Result<(u16, Option<String>), ProtocolError> {
    match payload.len() {
        0 => Ok((CloseCode::NoCode.into(), None)),
        1 => Err(ProtocolError::InvalidClosePayload),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            let reason = &payload[2..];
            if reason.is_empty() {
                return Ok((code, None));
            }
            let reason = std::str::from_utf8(reason)
                .map_err(|_| ProtocolError::InvalidUtf8("close reason"))?;
            Ok((code, Some(reason.to_string())))
        }
    }
}
