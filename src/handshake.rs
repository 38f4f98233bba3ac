//! Accept-key computation for the opening handshake (RFC 6455 section 4.2.2).
//!
//! The HTTP upgrade exchange itself belongs to the embedding server; it only
//! needs [`create_accept_header`] to fill in `Sec-WebSocket-Accept`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute the `Sec-WebSocket-Accept` value for a client's `Sec-WebSocket-Key`.
pub fn create_accept_header(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}
