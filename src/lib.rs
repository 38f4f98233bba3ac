//! # websocket-core
//!
//! Server-side data plane of the WebSocket protocol (RFC 6455): turns an
//! upgraded bidirectional byte stream into typed messages and back.
//!
//! ## Features
//!
//! - Frame codec with all three payload length encodings and client unmasking
//! - Strict rejection of reserved bits, unknown opcodes and oversized control frames
//! - Fragmented message reassembly with interleaved control frames
//! - Connection with serialized sends and an idempotent close protocol
//! - Handler trait with no-op defaults for every connection event
//! - Optional PING/PONG heartbeat
//!
//! The HTTP upgrade itself stays with the host server; it only needs
//! [`create_accept_header`] for the `Sec-WebSocket-Accept` header.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use websocket_core::{serve, Config, MessageHandler, TextMessage};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl MessageHandler for Echo {
//!     async fn on_text_message(&self, msg: TextMessage) {
//!         let _ = msg.connection.send_text(&msg.payload).await;
//!     }
//! }
//!
//! // after writing `101 Switching Protocols` on `socket`:
//! serve(socket, Arc::new(Echo), Config::default()).await?;
//! ```

pub mod close;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod handshake;
pub mod message;

pub use close::CloseCode;
pub use config::Config;
pub use connection::{serve, Connection, ConnectionId, ConnectionState};
pub use error::{Error, ProtocolError, Result};
pub use frame::{read_frame, write_frame, Frame, Opcode};
pub use handler::{MessageHandler, NoopHandler};
pub use handshake::create_accept_header;
pub use message::{BinaryMessage, CloseMessage, TextMessage};
