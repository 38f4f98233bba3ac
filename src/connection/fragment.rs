//! Reassembly of fragmented messages (RFC 6455 section 5.4).
//!
//! A message is either one final TEXT/BINARY frame, or a non-final
//! TEXT/BINARY frame followed by CONTINUATION frames up to one with FIN set.
//! Control frames may arrive between fragments; they pass straight through
//! and leave the partial message untouched.

use bytes::{Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::frame::{Frame, Opcode};

pub(crate) struct Reassembler {
    /// Opcode of the first fragment while a message is in progress.
    opcode: Option<Opcode>,
    buffer: BytesMut,
    max_message_size: usize,
}

impl Reassembler {
    pub(crate) fn new(max_message_size: usize) -> Self {
        Self {
            opcode: None,
            buffer: BytesMut::new(),
            max_message_size,
        }
    }

    pub(crate) fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Feed one frame in arrival order. Returns a complete message (or a
    /// control frame) once one is available, `None` while fragments are
    /// still accumulating.
    pub(crate) fn push(&mut self, frame: Frame) -> Result<Option<(Opcode, Bytes)>, ProtocolError> {
        match (frame.opcode, self.opcode) {
            (Opcode::Close | Opcode::Ping | Opcode::Pong, _) => {
                Ok(Some((frame.opcode, frame.payload)))
            }
            (Opcode::Text | Opcode::Binary, Some(_)) => {
                self.reset();
                Err(ProtocolError::UnfinishedMessage)
            }
            (Opcode::Continuation, None) => Err(ProtocolError::UnexpectedContinuation),
            (Opcode::Text | Opcode::Binary, None) => {
                self.check_size(frame.payload.len())?;
                if frame.final_fragment {
                    return Ok(Some((frame.opcode, frame.payload)));
                }
                self.opcode = Some(frame.opcode);
                self.buffer.extend_from_slice(&frame.payload);
                Ok(None)
            }
            (Opcode::Continuation, Some(opcode)) => {
                self.check_size(self.buffer.len() + frame.payload.len())?;
                self.buffer.extend_from_slice(&frame.payload);
                if !frame.final_fragment {
                    return Ok(None);
                }
                self.opcode = None;
                Ok(Some((opcode, self.buffer.split().freeze())))
            }
        }
    }

    fn check_size(&mut self, len: usize) -> Result<(), ProtocolError> {
        if len > self.max_message_size {
            self.reset();
            return Err(ProtocolError::MessageTooBig {
                len,
                max: self.max_message_size,
            });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.opcode = None;
        self.buffer.clear();
    }
}
