//! Inbound frame routing.
//!
//! The [`Dispatcher`] sees every decoded frame exactly once, in arrival order,
//! and turns it into a [`Route`]: application data, or a control event for the
//! [`StateMachine`](crate::state::StateMachine). Anything that breaks the
//! protocol comes back as an error and is fatal for the connection.
//!
//! Fragmented messages are reassembled here. Control frames may arrive between
//! the fragments of a message and are routed immediately.

use bytes::{Bytes, BytesMut};

use crate::{
    Result, Role, Utf8Policy, WebSocketError,
    close::CloseFrame,
    frame::{Frame, OpCode},
};

/// Where an inbound frame goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A complete text message.
    Text(String),
    /// A complete binary message.
    Binary(Bytes),
    /// The peer started or answered the close handshake.
    Close(CloseFrame),
    /// The peer expects a pong with this payload.
    Ping(Bytes),
    /// Liveness signal, no protocol action.
    Pong(Bytes),
    /// A fragment was buffered; the message is not complete yet.
    Buffered,
}

/// Validates and routes inbound frames for one connection.
#[derive(Debug)]
pub struct Dispatcher {
    role: Role,
    utf8: Utf8Policy,
    max_read_buffer: usize,
    fragment: Option<(OpCode, BytesMut)>,
}

impl Dispatcher {
    pub fn new(role: Role, utf8: Utf8Policy, max_read_buffer: usize) -> Self {
        Self {
            role,
            utf8,
            max_read_buffer,
            fragment: None,
        }
    }

    /// Routes one inbound frame.
    ///
    /// # Errors
    /// - [`WebSocketError::UnmaskedFrame`] / [`WebSocketError::UnexpectedMask`] if the
    ///   frame breaks the peer's masking rule
    /// - [`WebSocketError::InvalidOpCode`] for a reserved opcode
    /// - [`WebSocketError::InvalidCloseFrame`] for a one-byte close payload
    /// - [`WebSocketError::InvalidFragment`] / [`WebSocketError::InvalidContinuationFrame`]
    ///   for out-of-sequence fragments
    /// - [`WebSocketError::FrameTooLarge`] when a reassembled message exceeds the read buffer
    /// - [`WebSocketError::InvalidUTF8`] for a text message under [`Utf8Policy::Strict`]
    pub fn route(&mut self, frame: Frame) -> Result<Route> {
        self.role.check_inbound(&frame)?;

        let (opcode, fin, payload) = frame.into_parts();
        match opcode {
            OpCode::Ping => Ok(Route::Ping(payload)),
            OpCode::Pong => Ok(Route::Pong(payload)),
            OpCode::Close => CloseFrame::parse(&payload).map(Route::Close),
            OpCode::Text | OpCode::Binary => {
                if self.fragment.is_some() {
                    return Err(WebSocketError::InvalidFragment);
                }
                if fin {
                    return self.message(opcode, payload);
                }
                if payload.len() > self.max_read_buffer {
                    return Err(WebSocketError::FrameTooLarge);
                }
                self.fragment = Some((opcode, BytesMut::from(&payload[..])));
                Ok(Route::Buffered)
            }
            OpCode::Continuation => {
                let Some((opcode, mut buf)) = self.fragment.take() else {
                    return Err(WebSocketError::InvalidContinuationFrame);
                };
                if buf.len() + payload.len() > self.max_read_buffer {
                    return Err(WebSocketError::FrameTooLarge);
                }
                buf.extend_from_slice(&payload);

                if fin {
                    self.message(opcode, buf.freeze())
                } else {
                    self.fragment = Some((opcode, buf));
                    Ok(Route::Buffered)
                }
            }
            OpCode::UnknownNonControl(code) | OpCode::UnknownControl(code) => {
                Err(WebSocketError::InvalidOpCode(code))
            }
        }
    }

    fn message(&self, opcode: OpCode, payload: Bytes) -> Result<Route> {
        if opcode != OpCode::Text {
            return Ok(Route::Binary(payload));
        }

        let text = match self.utf8 {
            Utf8Policy::Strict => simdutf8::basic::from_utf8(&payload)
                .map_err(|_| WebSocketError::InvalidUTF8)?
                .to_owned(),
            Utf8Policy::Lossy => String::from_utf8_lossy(&payload).into_owned(),
        };
        Ok(Route::Text(text))
    }
}
