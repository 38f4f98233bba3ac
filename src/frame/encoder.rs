//! Server-role frame writer. Frames are never masked on this path.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{Frame, FIN_BIT, LENGTH_16, LENGTH_64};
use crate::error::ProtocolError;

/// Write `buf` completely, reporting a write that accepts no bytes as a short write.
async fn write_fully<W>(w: &mut W, buf: &[u8], context: &'static str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0;
    while written < buf.len() {
        let n = w
            .write(&buf[written..])
            .await
            .map_err(ProtocolError::io(context))?;
        if n == 0 {
            return Err(ProtocolError::ShortWrite {
                expected: buf.len(),
                actual: written,
            });
        }
        written += n;
    }
    Ok(())
}

/// Encode the 2 to 10 byte header into `out`, returning its length.
fn encode_header(frame: &Frame, out: &mut [u8; 10]) -> usize {
    out[0] = if frame.final_fragment { FIN_BIT } else { 0 } | frame.opcode as u8;
    let len = frame.payload.len();
    if len < LENGTH_16 as usize {
        out[1] = len as u8;
        2
    } else if len <= u16::MAX as usize {
        out[1] = LENGTH_16;
        out[2..4].copy_from_slice(&(len as u16).to_be_bytes());
        4
    } else {
        out[1] = LENGTH_64;
        out[2..10].copy_from_slice(&(len as u64).to_be_bytes());
        10
    }
}

/// Write one frame: header, extended length, payload, then flush.
///
/// Invalid control frames (over 125 bytes or not final) are rejected before
/// any byte reaches the stream.
pub async fn write_frame<W>(w: &mut W, frame: &Frame) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    frame.check_control()?;

    let mut header = [0u8; 10];
    let header_len = encode_header(frame, &mut header);
    write_fully(w, &header[..header_len], "write frame header").await?;
    if !frame.payload.is_empty() {
        write_fully(w, &frame.payload, "write payload").await?;
    }
    w.flush().await.map_err(ProtocolError::io("flush frame"))
}

pub async fn write_text<W>(w: &mut W, text: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_frame(w, &Frame::text(text)).await
}

pub async fn write_binary<W>(w: &mut W, data: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_frame(w, &Frame::binary(data)).await
}

/// Write a CLOSE frame. A reason over 123 bytes fails before anything is written.
pub async fn write_close<W>(w: &mut W, code: u16, reason: Option<&str>) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = Frame::close(code, reason)?;
    write_frame(w, &frame).await
}

pub async fn write_ping<W>(w: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_frame(w, &Frame::ping(payload)).await
}

pub async fn write_pong<W>(w: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_frame(w, &Frame::pong(payload)).await
}
