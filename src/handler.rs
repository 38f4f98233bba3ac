//! Callbacks invoked on connection events.
//!
//! Every method has a no-op default; implement only the events you need.
//! Callbacks run on the connection's read task, so a slow callback delays
//! reading further frames from that peer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::Connection;
use crate::message::{BinaryMessage, CloseMessage, TextMessage};
use crate::Error;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Called once per connection, before any message callback.
    async fn on_connection_established(&self, _conn: &Arc<Connection>) {}

    async fn on_text_message(&self, _msg: TextMessage) {}

    async fn on_binary_message(&self, _msg: BinaryMessage) {}

    /// The peer sent CLOSE. The socket may still be writable: a final reply
    /// can be attempted through `msg.connection`, but later sends may fail.
    async fn on_close_message(&self, _msg: CloseMessage) {}

    /// Called once, after the socket has been shut down.
    async fn on_connection_closed(&self, _conn: &Connection) {}

    /// A failure the connection absorbed instead of returning to a caller:
    /// the courtesy CLOSE during [`Connection::close`], or the error that
    /// ended the read loop.
    async fn on_error(&self, _conn: &Connection, _error: &Error) {}
}

/// Handler that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandler;

#[async_trait]
impl MessageHandler for NoopHandler {}
