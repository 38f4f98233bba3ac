//! Frame reader. Honors the mask bit on every inbound frame.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{
    apply_mask, Frame, Opcode, FIN_BIT, LENGTH_16, LENGTH_64, LENGTH_BITS, MASK_BIT,
    MAX_CONTROL_PAYLOAD, OPCODE_BITS, RSV_BITS,
};
use crate::error::{Error, ProtocolError};
use crate::Result;

/// Upper bound on the up-front allocation for a payload; the buffer grows
/// with the bytes that actually arrive.
const INITIAL_PAYLOAD_CAPACITY: u64 = 64 * 1024;

async fn read_array<R, const N: usize>(r: &mut R, context: &'static str) -> Result<[u8; N]>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; N];
    let mut filled = 0;
    while filled < N {
        let n = r
            .read(&mut buf[filled..])
            .await
            .map_err(ProtocolError::io(context))?;
        if n == 0 {
            return Err(ProtocolError::ShortRead {
                expected: N as u64,
                actual: filled as u64,
            }
            .into());
        }
        filled += n;
    }
    Ok(buf)
}

/// Read one frame with no payload limit beyond available memory.
pub async fn read_frame<R>(r: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    read_frame_with_limit(r, u64::MAX).await
}

/// Read one frame, rejecting payloads longer than `max_payload` before any
/// payload byte is read.
///
/// End of stream before the first header byte is reported as
/// [`Error::ConnectionClosed`]; end of stream anywhere inside a frame is a
/// [`ProtocolError::ShortRead`].
pub async fn read_frame_with_limit<R>(r: &mut R, max_payload: u64) -> Result<Frame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut first = [0u8; 1];
    let n = r
        .read(&mut first)
        .await
        .map_err(ProtocolError::io("read frame header"))?;
    if n == 0 {
        return Err(Error::ConnectionClosed);
    }
    let first = first[0];

    let rsv = first & RSV_BITS;
    if rsv != 0 {
        return Err(ProtocolError::ReservedBitsSet(rsv >> 4).into());
    }
    let final_fragment = first & FIN_BIT != 0;
    let opcode = Opcode::from_u8(first & OPCODE_BITS)?;

    let [second] = read_array::<_, 1>(r, "read frame header").await?;
    let masked = second & MASK_BIT != 0;

    let len = match second & LENGTH_BITS {
        LENGTH_16 => u16::from_be_bytes(read_array(r, "read 16-bit length").await?) as u64,
        LENGTH_64 => {
            let len = u64::from_be_bytes(read_array(r, "read 64-bit length").await?);
            if len >> 63 != 0 {
                return Err(ProtocolError::InvalidLength.into());
            }
            len
        }
        short => short as u64,
    };

    if opcode.is_control() {
        if len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(ProtocolError::ControlFrameTooLarge(len).into());
        }
        if !final_fragment {
            return Err(ProtocolError::FragmentedControlFrame.into());
        }
    }
    if len > max_payload {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: max_payload,
        }
        .into());
    }

    let mask_key = if masked {
        Some(read_array::<_, 4>(r, "read masking key").await?)
    } else {
        None
    };

    let mut payload = Vec::with_capacity(len.min(INITIAL_PAYLOAD_CAPACITY) as usize);
    let read = r
        .take(len)
        .read_to_end(&mut payload)
        .await
        .map_err(ProtocolError::io("read payload"))?;
    if read as u64 != len {
        return Err(ProtocolError::ShortRead {
            expected: len,
            actual: read as u64,
        }
        .into());
    }

    if let Some(key) = mask_key {
        apply_mask(&mut payload, key);
    }

    Ok(Frame {
        final_fragment,
        opcode,
        payload: Bytes::from(payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::write_frame;

    fn masked_frame(first: u8, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
        let mut out = vec![first];
        let len = payload.len();
        if len < 126 {
            out.push(0x80 | len as u8);
        } else if len <= 65535 {
            out.push(0x80 | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(0x80 | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
        out.extend_from_slice(&key);
        let mut masked = payload.to_vec();
        apply_mask(&mut masked, key);
        out.extend_from_slice(&masked);
        out
    }

    #[tokio::test]
    async fn masked_text_frame() {
        let bytes = masked_frame(0x81, b"hello", [0x37, 0xfa, 0x21, 0x3d]);
        let frame = read_frame(&mut &bytes[..]).await.unwrap();
        assert!(frame.final_fragment);
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(&frame.payload[..], b"hello");
    }

    #[tokio::test]
    async fn unmask_vector() {
        let bytes = [
            0x82, 0x85, 0x01, 0x02, 0x03, 0x04, 0x01, 0x02, 0x03, 0x04, 0x05,
        ];
        let frame = read_frame(&mut &bytes[..]).await.unwrap();
        assert_eq!(&frame.payload[..], &[0x00, 0x00, 0x00, 0x00, 0x04]);

        let mut again = frame.payload.to_vec();
        apply_mask(&mut again, [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(again, vec![0x01, 0x02, 0x03, 0x04, 0x05]);
    }

    #[tokio::test]
    async fn roundtrip_lengths() {
        for opcode in [Opcode::Text, Opcode::Binary] {
            for len in [0usize, 1, 125, 126, 127, 65535, 65536, 200000] {
                let payload: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();
                let frame = Frame::new(true, opcode, payload);
                let mut buf = Vec::new();
                write_frame(&mut buf, &frame).await.unwrap();
                let decoded = read_frame(&mut &buf[..]).await.unwrap();
                assert_eq!(decoded, frame, "opcode {} len {}", opcode, len);
            }
        }
    }

    #[tokio::test]
    async fn extended_length_branches() {
        let bytes = masked_frame(0x82, &[0xAB; 200], [0, 0, 0, 0]);
        assert_eq!(bytes[1] & 0x7F, 126);
        let frame = read_frame(&mut &bytes[..]).await.unwrap();
        assert_eq!(frame.payload.len(), 200);

        let bytes = masked_frame(0x82, &vec![0xCD; 70000], [9, 8, 7, 6]);
        assert_eq!(bytes[1] & 0x7F, 127);
        let frame = read_frame(&mut &bytes[..]).await.unwrap();
        assert_eq!(frame.payload.len(), 70000);
        assert!(frame.payload.iter().all(|b| *b == 0xCD));
    }

    #[tokio::test]
    async fn reserved_bits_rejected() {
        for first in [0xC1u8, 0xA1, 0x91, 0xF1] {
            let bytes = [first, 0x00];
            let err = read_frame(&mut &bytes[..]).await.unwrap_err();
            assert!(
                matches!(err, Error::Protocol(ProtocolError::ReservedBitsSet(_))),
                "first byte {:#x}: {}",
                first,
                err
            );
        }
    }

    #[tokio::test]
    async fn invalid_opcodes_rejected() {
        for opcode in (0x3u8..=0x7).chain(0xB..=0xF) {
            let bytes = [0x80 | opcode, 0x00];
            let err = read_frame(&mut &bytes[..]).await.unwrap_err();
            assert!(matches!(
                err,
                Error::Protocol(ProtocolError::InvalidOpcode(v)) if v == opcode
            ));
        }
    }

    #[tokio::test]
    async fn oversized_control_frame_rejected_before_payload() {
        // length 126 declared, no mask key or payload follows
        let bytes = [0x89, 0x80 | 126, 0x00, 0x7E];
        let err = read_frame(&mut &bytes[..]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ControlFrameTooLarge(126))
        ));
    }

    #[tokio::test]
    async fn fragmented_control_frame_rejected() {
        let bytes = [0x09, 0x00];
        let err = read_frame(&mut &bytes[..]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::FragmentedControlFrame)
        ));
    }

    #[tokio::test]
    async fn length_msb_rejected() {
        let mut bytes = vec![0x82, 127];
        bytes.extend_from_slice(&(1u64 << 63).to_be_bytes());
        let err = read_frame(&mut &bytes[..]).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::InvalidLength)));
    }

    #[tokio::test]
    async fn frame_limit_enforced() {
        let bytes = masked_frame(0x82, &[1u8; 300], [1, 2, 3, 4]);
        let err = read_frame_with_limit(&mut &bytes[..], 256)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::FrameTooLarge { len: 300, max: 256 })
        ));
    }

    #[tokio::test]
    async fn truncated_payload_is_short_read() {
        let mut bytes = masked_frame(0x81, b"hello", [1, 2, 3, 4]);
        bytes.truncate(bytes.len() - 2);
        let err = read_frame(&mut &bytes[..]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ShortRead {
                expected: 5,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn truncated_header_is_short_read() {
        let bytes = [0x81];
        let err = read_frame(&mut &bytes[..]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ShortRead {
                expected: 1,
                actual: 0
            })
        ));
    }

    #[tokio::test]
    async fn truncated_extended_length_counts_bytes_read() {
        let bytes = [0x82, 0x80 | 126, 0x01];
        let err = read_frame(&mut &bytes[..]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ShortRead {
                expected: 2,
                actual: 1
            })
        ));

        let bytes = [0x82, 0x80 | 5, 0xAA, 0xBB, 0xCC];
        let err = read_frame(&mut &bytes[..]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ShortRead {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn eof_at_frame_boundary_is_closed() {
        let bytes: [u8; 0] = [];
        let err = read_frame(&mut &bytes[..]).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn consecutive_frames_read_in_order() {
        let mut bytes = masked_frame(0x01, b"one", [1, 1, 1, 1]);
        bytes.extend(masked_frame(0x89, b"p", [2, 2, 2, 2]));
        bytes.extend(masked_frame(0x80, b"two", [3, 3, 3, 3]));
        let mut r = &bytes[..];

        let a = read_frame(&mut r).await.unwrap();
        assert_eq!((a.final_fragment, a.opcode), (false, Opcode::Text));
        let b = read_frame(&mut r).await.unwrap();
        assert_eq!(b.opcode, Opcode::Ping);
        let c = read_frame(&mut r).await.unwrap();
        assert_eq!((c.final_fragment, c.opcode), (true, Opcode::Continuation));
        assert_eq!(&c.payload[..], b"two");
        assert!(matches!(read_frame(&mut r).await, Err(Error::ConnectionClosed)));
    }
}
