//! Per-connection read loop: frames in, handler callbacks out.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::fragment::Reassembler;
use super::{wait_closed, Connection, ConnectionState};
use crate::close::{parse_close_payload, CloseCode};
use crate::config::Config;
use crate::error::{Error, ProtocolError};
use crate::frame::{read_frame_with_limit, Opcode, MAX_CLOSE_REASON};
use crate::handler::MessageHandler;
use crate::message::{BinaryMessage, CloseMessage, TextMessage};
use crate::Result;

/// Payload of the heartbeat PING still waiting for its PONG.
type PendingPing = Arc<Mutex<Option<[u8; 4]>>>;

/// Run a WebSocket connection over an already-upgraded stream until it ends.
///
/// Calls [`MessageHandler::on_connection_established`] first, then delivers
/// messages in arrival order. The connection is always closed before this
/// returns. Returns `Ok(())` when the peer went away or the close handshake
/// completed, or the error that forced the connection down. For protocol
/// violations a CLOSE frame with a matching status code has been attempted;
/// after a socket failure nothing more is written.
pub async fn serve<S>(stream: S, handler: Arc<dyn MessageHandler>, config: Config) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let conn = Arc::new(Connection::new(writer, Arc::clone(&handler), &config));
    let span = tracing::info_span!("websocket", id = %conn.id());
    let dispatcher = Dispatcher {
        conn,
        handler,
        reassembler: Reassembler::new(config.max_message_size),
        pending_ping: Arc::new(Mutex::new(None)),
        heartbeat: None,
        config,
    };
    dispatcher.run(BufReader::new(reader)).instrument(span).await
}

struct Dispatcher {
    conn: Arc<Connection>,
    handler: Arc<dyn MessageHandler>,
    reassembler: Reassembler,
    pending_ping: PendingPing,
    heartbeat: Option<JoinHandle<Error>>,
    config: Config,
}

impl Dispatcher {
    async fn run<R>(mut self, mut reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        tracing::info!("connection established");
        self.handler.on_connection_established(&self.conn).await;

        self.heartbeat = self.config.ping_interval().map(|interval| {
            tokio::spawn(
                heartbeat(
                    Arc::clone(&self.conn),
                    Arc::clone(&self.pending_ping),
                    interval,
                    self.config.pong_timeout(),
                )
                .in_current_span(),
            )
        });

        let result = match self.read_loop(&mut reader).await {
            Ok(()) | Err(Error::ConnectionClosed) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "closing connection after error");
                match e.close_code() {
                    Some(code) => {
                        let reason = close_reason(&e);
                        if let Err(send_err) = self.conn.send_close(code, Some(&reason)).await {
                            tracing::debug!(error = %send_err, "could not send error close frame");
                        }
                    }
                    None => self.conn.abandon().await,
                }
                self.handler.on_error(&self.conn, &e).await;
                Err(e)
            }
        };

        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
        self.conn.close().await;
        result
    }

    async fn read_loop<R>(&mut self, reader: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut closed = self.conn.subscribe_closed();
        loop {
            // Reads are only abandoned once the connection is closed, so a
            // partially read frame can never be resumed out of alignment.
            let frame = tokio::select! {
                biased;
                _ = wait_closed(&mut closed) => return Ok(()),
                e = heartbeat_failure(&mut self.heartbeat) => return Err(e),
                frame = read_frame_with_limit(reader, self.config.max_frame_size) => frame?,
            };
            tracing::debug!(
                opcode = %frame.opcode,
                len = frame.payload.len(),
                fin = frame.final_fragment,
                assembling = self.reassembler.is_assembling(),
                "frame received"
            );

            let Some((opcode, payload)) = self.reassembler.push(frame)? else {
                continue;
            };
            match opcode {
                Opcode::Text => {
                    let payload = String::from_utf8(Vec::from(payload))
                        .map_err(|_| ProtocolError::InvalidUtf8("text message"))?;
                    let msg = TextMessage {
                        connection: Arc::clone(&self.conn),
                        payload,
                    };
                    self.handler.on_text_message(msg).await;
                }
                Opcode::Binary => {
                    let msg = BinaryMessage {
                        connection: Arc::clone(&self.conn),
                        payload,
                    };
                    self.handler.on_binary_message(msg).await;
                }
                Opcode::Ping => {
                    if self.config.auto_pong {
                        // after our CLOSE went out, keep reading for the peer's reply
                        match self.conn.send_pong(&payload).await {
                            Ok(()) | Err(Error::ConnectionClosed) => {}
                            Err(e) => return Err(e),
                        }
                    }
                }
                Opcode::Pong => {
                    let mut pending = self.pending_ping.lock().await;
                    if pending.is_some_and(|expected| payload[..] == expected[..]) {
                        *pending = None;
                    }
                }
                Opcode::Close => {
                    let (status_code, message) = parse_close_payload(&payload)?;
                    tracing::info!(status_code, reason = ?message, "close received");
                    let msg = CloseMessage {
                        connection: Arc::clone(&self.conn),
                        status_code,
                        message,
                    };
                    self.handler.on_close_message(msg).await;
                    self.reply_close(status_code).await?;
                    return Ok(());
                }
                // the reassembler reports a finished message under its first opcode
                Opcode::Continuation => {}
            }
        }
    }

    /// Echo the peer's CLOSE unless the handler already answered it.
    async fn reply_close(&self, status_code: u16) -> Result<()> {
        if self.conn.state().await != ConnectionState::Open {
            return Ok(());
        }
        let reply = match CloseCode::from_code(status_code) {
            Some(code) if code.is_reserved() => CloseCode::Normal.into(),
            _ => status_code,
        };
        match self.conn.send_close(reply, None).await {
            Ok(()) | Err(Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Periodic PING with a random payload. Returns the error that should
/// end the connection: a missed PONG, or a failed PING write.
async fn heartbeat(
    conn: Arc<Connection>,
    pending: PendingPing,
    interval: Duration,
    pong_timeout: Duration,
) -> Error {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let payload: [u8; 4] = rand::random();
        *pending.lock().await = Some(payload);
        match conn.send_ping(&payload).await {
            Ok(()) => {}
            // closing: the close handshake decides how the connection ends
            Err(Error::ConnectionClosed) => return std::future::pending().await,
            Err(e) => return e,
        }
        tokio::time::sleep(pong_timeout).await;
        if pending.lock().await.is_some() {
            tracing::warn!(?pong_timeout, "peer stopped answering pings");
            return ProtocolError::PongTimeout(pong_timeout).into();
        }
    }
}

/// Resolves with the heartbeat's error; never resolves without a heartbeat.
async fn heartbeat_failure(task: &mut Option<JoinHandle<Error>>) -> Error {
    let Some(handle) = task.as_mut() else {
        return std::future::pending().await;
    };
    let joined = handle.await;
    *task = None;
    match joined {
        Ok(e) => e,
        Err(_) => std::future::pending().await,
    }
}

/// Error text cut to fit a CLOSE frame, on a character boundary.
fn close_reason(e: &Error) -> String {
    let mut reason = e.to_string();
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}
