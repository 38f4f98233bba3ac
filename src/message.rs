//! Application-level messages delivered to a [`MessageHandler`](crate::MessageHandler).

use std::sync::Arc;

use bytes::Bytes;

use crate::close::CloseCode;
use crate::connection::Connection;

/// A complete text message, reassembled from one or more frames.
#[derive(Clone, Debug)]
pub struct TextMessage {
    pub connection: Arc<Connection>,
    pub payload: String,
}

/// A complete binary message, reassembled from one or more frames.
#[derive(Clone, Debug)]
pub struct BinaryMessage {
    pub connection: Arc<Connection>,
    pub payload: Bytes,
}

/// A CLOSE frame received from the peer.
#[derive(Clone, Debug)]
pub struct CloseMessage {
    pub connection: Arc<Connection>,
    /// Raw status code; 1005 when the peer sent none.
    pub status_code: u16,
    /// Reason text, at most 123 bytes.
    pub message: Option<String>,
}

impl CloseMessage {
    /// Known status code, if the peer used one of the registered values.
    pub fn code(&self) -> Option<CloseCode> {
        CloseCode::from_code(self.status_code)
    }
}
