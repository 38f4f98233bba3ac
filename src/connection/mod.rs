//! One open WebSocket connection: serialized frame writes and the close protocol.
//!
//! The connection owns the write side of the socket. Every send takes the
//! write lock for the duration of one frame, so frames from concurrent
//! senders never interleave on the wire. The open/closing/closed state lives
//! under the same lock, which makes the liveness check and the write atomic
//! with respect to [`Connection::close`].

mod dispatch;
mod fragment;

pub use dispatch::serve;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::close::CloseCode;
use crate::config::Config;
use crate::error::{Error, ProtocolError};
use crate::frame::{write_frame, Frame};
use crate::handler::MessageHandler;
use crate::Result;

type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Process-unique connection identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl serde::Serialize for ConnectionId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Lifecycle of a connection as seen by senders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// No further frames can be sent, either because a CLOSE frame went out
    /// or because a failed write left a partial frame on the wire. Only
    /// teardown remains.
    Closing,
    /// The socket has been shut down and released.
    Closed,
}

enum Writer {
    Open(BoxedWriter),
    Closing(BoxedWriter),
    Closed,
}

impl Writer {
    fn state(&self) -> ConnectionState {
        match self {
            Self::Open(_) => ConnectionState::Open,
            Self::Closing(_) => ConnectionState::Closing,
            Self::Closed => ConnectionState::Closed,
        }
    }

    fn begin_closing(&mut self) {
        if let Self::Open(w) = std::mem::replace(self, Self::Closed) {
            *self = Self::Closing(w);
        }
    }
}

pub struct Connection {
    id: ConnectionId,
    writer: Mutex<Writer>,
    handler: Arc<dyn MessageHandler>,
    write_timeout: Option<Duration>,
    closed_tx: watch::Sender<bool>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap the write side of an upgraded socket.
    ///
    /// [`serve`] builds connections itself; this is for hosts that run their
    /// own read loop.
    pub fn new<W>(writer: W, handler: Arc<dyn MessageHandler>, config: &Config) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        let (closed_tx, _) = watch::channel(false);
        Self {
            id: ConnectionId::new(),
            writer: Mutex::new(Writer::Open(Box::pin(writer))),
            handler,
            write_timeout: config.write_timeout(),
            closed_tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn state(&self) -> ConnectionState {
        self.writer.lock().await.state()
    }

    /// Whether data frames can still be sent.
    pub async fn is_alive(&self) -> bool {
        self.state().await == ConnectionState::Open
    }

    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.send(&Frame::text(text)).await
    }

    pub async fn send_binary(&self, data: &[u8]) -> Result<()> {
        self.send(&Frame::binary(data)).await
    }

    pub async fn send_ping(&self, payload: &[u8]) -> Result<()> {
        self.send(&Frame::ping(payload)).await
    }

    pub async fn send_pong(&self, payload: &[u8]) -> Result<()> {
        self.send(&Frame::pong(payload)).await
    }

    /// Send a CLOSE frame. Afterwards the connection is `Closing` and accepts
    /// no further frames; call [`close`](Self::close) to tear it down.
    pub async fn send_close(&self, code: impl Into<u16>, reason: Option<&str>) -> Result<()> {
        let code = code.into();
        let mut writer = self.writer.lock().await;
        let Writer::Open(w) = &mut *writer else {
            return Err(Error::ConnectionClosed);
        };
        let frame = Frame::close(code, reason)?;
        let result = self.write(w, &frame).await;
        if result.is_ok() {
            writer.begin_closing();
        } else {
            self.abandon_on_failure(&mut writer, &result);
        }
        result
    }

    async fn send(&self, frame: &Frame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let Writer::Open(w) = &mut *writer else {
            return Err(Error::ConnectionClosed);
        };
        let result = self.write(w, frame).await;
        self.abandon_on_failure(&mut writer, &result);
        result
    }

    fn abandon_on_failure(&self, writer: &mut Writer, result: &Result<()>) {
        if let Err(e) = result {
            if e.breaks_stream() {
                tracing::warn!(id = %self.id, error = %e, "write failed, no further frames");
                writer.begin_closing();
            }
        }
    }

    /// Stop framing on this socket without sending a CLOSE frame, after the
    /// stream failed underneath the connection.
    pub(crate) async fn abandon(&self) {
        self.writer.lock().await.begin_closing();
    }

    async fn write(&self, w: &mut BoxedWriter, frame: &Frame) -> Result<()> {
        let write = write_frame(w, frame);
        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| ProtocolError::Timeout("writing frame"))??,
            None => write.await?,
        }
        tracing::debug!(
            opcode = %frame.opcode,
            len = frame.payload.len(),
            fin = frame.final_fragment,
            "frame sent"
        );
        Ok(())
    }

    /// Close the connection. Does nothing if it is already closed.
    ///
    /// An open connection first gets a NORMAL close frame; if that fails the
    /// error is logged and reported to [`MessageHandler::on_error`], and
    /// teardown continues. The socket is then shut down and released, the
    /// read loop is stopped, and [`MessageHandler::on_connection_closed`]
    /// runs exactly once.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let (mut w, failure) = match std::mem::replace(&mut *writer, Writer::Closed) {
            Writer::Closed => return,
            Writer::Closing(w) => (w, None),
            Writer::Open(mut w) => {
                let sent = match Frame::close(CloseCode::Normal.into(), None) {
                    Ok(frame) => self.write(&mut w, &frame).await,
                    Err(e) => Err(e.into()),
                };
                (w, sent.err())
            }
        };
        if let Err(e) = w.shutdown().await {
            tracing::debug!(id = %self.id, error = %e, "socket shutdown failed");
        }
        drop(w);
        drop(writer);
        self.closed_tx.send_replace(true);

        if let Some(e) = failure {
            tracing::warn!(id = %self.id, error = %e, "failed to send close frame");
            self.handler.on_error(self, &e).await;
        }
        tracing::info!(id = %self.id, "connection closed");
        self.handler.on_connection_closed(self).await;
    }

    /// Resolves once [`close`](Self::close) has released the socket.
    pub async fn closed(&self) {
        wait_closed(&mut self.closed_tx.subscribe()).await;
    }

    fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }
}

async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    // the sender lives as long as the connection, so this only ends on close
    let _ = rx.wait_for(|closed| *closed).await;
}
