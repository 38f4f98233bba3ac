//! Echo server: accepts TCP connections, performs a minimal upgrade exchange
//! and echoes every message back.
//!
//! Run with: `cargo run --example echo_server`, then point a client at
//! `ws://127.0.0.1:9001`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use websocket_core::{
    create_accept_header, serve, BinaryMessage, CloseMessage, Config, Connection, MessageHandler,
    TextMessage,
};

struct Echo;

#[async_trait]
impl MessageHandler for Echo {
    async fn on_connection_established(&self, conn: &Arc<Connection>) {
        println!("[{}] connected", conn.id());
    }

    async fn on_text_message(&self, msg: TextMessage) {
        println!("[{}] text: {}", msg.connection.id(), msg.payload);
        if let Err(e) = msg.connection.send_text(&msg.payload).await {
            println!("[{}] echo failed: {}", msg.connection.id(), e);
        }
    }

    async fn on_binary_message(&self, msg: BinaryMessage) {
        println!("[{}] binary: {} bytes", msg.connection.id(), msg.payload.len());
        if let Err(e) = msg.connection.send_binary(&msg.payload).await {
            println!("[{}] echo failed: {}", msg.connection.id(), e);
        }
    }

    async fn on_close_message(&self, msg: CloseMessage) {
        println!(
            "[{}] close: {} {:?}",
            msg.connection.id(),
            msg.status_code,
            msg.message
        );
    }

    async fn on_connection_closed(&self, conn: &Connection) {
        println!("[{}] closed", conn.id());
    }
}

/// Read the upgrade request headers and answer with `101 Switching Protocols`.
/// Request validation beyond the key is left out of this demo.
async fn upgrade(stream: TcpStream) -> anyhow::Result<TcpStream> {
    let mut reader = BufReader::new(stream);
    let mut key = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            anyhow::bail!("connection closed during handshake");
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("sec-websocket-key") {
                key = Some(value.trim().to_string());
            }
        }
    }
    let key = key.ok_or_else(|| anyhow::anyhow!("missing Sec-WebSocket-Key"))?;

    // the client sends no frames before it sees the 101, so nothing is left buffered
    let mut stream = reader.into_inner();
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        create_accept_header(&key)
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(stream)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let listener = TcpListener::bind("127.0.0.1:9001").await?;
    println!("Listening on ws://127.0.0.1:9001");

    let handler: Arc<dyn MessageHandler> = Arc::new(Echo);
    let config = Config::default().with_heartbeat(Duration::from_secs(30), Duration::from_secs(10));

    loop {
        let (stream, peer) = listener.accept().await?;
        let handler = Arc::clone(&handler);
        let config = config.clone();
        tokio::spawn(async move {
            let stream = match upgrade(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "handshake failed");
                    return;
                }
            };
            if let Err(e) = serve(stream, handler, config).await {
                tracing::info!(%peer, error = %e, "connection ended with error");
            }
        });
    }
}
