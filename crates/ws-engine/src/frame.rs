//! # Frame
//!
//! WebSocket frames as defined in [RFC 6455 Section 5.2](https://datatracker.ietf.org/doc/html/rfc6455#section-5.2).
//!
//! ### Frame Binary Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |         (16 or 64 bits)       |
//! |N|V|V|V|       |S|             |                               |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |        Extended payload length continued, if payload len == 127|
//! +---------------------------------------------------------------+
//! |                               |   Masking-key, if MASK set to 1|
//! +-------------------------------+-------------------------------+
//! |     Masking-key (continued)       |          Payload Data      |
//! +-----------------------------------+ - - - - - - - - - - - - - -+
//! :                     Payload Data continued ...                :
//! +---------------------------------------------------------------+
//! ```
//!
//! A [`Frame`] always holds its payload in unmasked form. The masking key, when
//! present, records that the frame travels masked on the wire: the
//! [codec](crate::codec) applies it on encode and removes it on decode.
//!
//! ```rust
//! use hpx_ws_engine::{close::CloseCode, frame::Frame};
//!
//! let text = Frame::text("Hello, WebSocket!");
//! let binary = Frame::binary(vec![1, 2, 3, 4]);
//! let ping = Frame::ping("Ping payload");
//! let close = Frame::close(CloseCode::Normal, b"Normal closure");
//!
//! // Fragmented message
//! let first = Frame::text("Hello, ").with_fin(false);
//! let last = Frame::continuation("World!");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::{WebSocketError, close::CloseCode};

/// A 32-bit masking key, kept in wire byte order.
pub type MaskKey = [u8; 4];

/// Largest possible frame header: 2 + 8 (extended length) + 4 (mask).
pub const MAX_HEAD_SIZE: usize = 14;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// WebSocket operation code (OpCode) that determines the semantic meaning and handling of a frame.
///
/// The numeric values are defined in [RFC 6455, Section 11.8](https://datatracker.ietf.org/doc/html/rfc6455#section-11.8).
/// Reserved values are not rejected while decoding; they are labelled
/// [`OpCode::UnknownNonControl`] (0x3-0x7) or [`OpCode::UnknownControl`] (0xB-0xF)
/// and it is up to the [dispatcher](crate::dispatch) to treat them as a violation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// Reserved non-control opcode, 0x3-0x7.
    UnknownNonControl(u8),
    /// Reserved control opcode, 0xB-0xF.
    UnknownControl(u8),
}

impl OpCode {
    /// Returns `true` if the `OpCode` represents a control frame.
    ///
    /// Control frames cannot be fragmented and carry at most 125 bytes of payload.
    /// Reserved control opcodes (0xB-0xF) count as control frames.
    pub fn is_control(&self) -> bool {
        matches!(
            *self,
            OpCode::Close | OpCode::Ping | OpCode::Pong | OpCode::UnknownControl(_)
        )
    }
}

impl From<u8> for OpCode {
    /// Interprets the low four bits of `value` as an opcode.
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            code @ 0x3..=0x7 => Self::UnknownNonControl(code),
            code => Self::UnknownControl(code),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(val: OpCode) -> Self {
        match val {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::UnknownNonControl(code) | OpCode::UnknownControl(code) => code & 0x0F,
        }
    }
}

/// A single WebSocket frame.
///
/// # Fields
/// - `fin`: Final fragment flag. When `true`, this frame completes a message.
/// - `opcode`: Frame type.
/// - `mask`: Masking key, present iff the frame travels masked.
/// - `payload`: Unmasked frame payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub(crate) fin: bool,
    pub(crate) opcode: OpCode,
    pub(crate) mask: Option<MaskKey>,
    pub(crate) payload: Bytes,
}

impl Frame {
    /// Low-level constructor with full control over every field.
    pub fn new(fin: bool, opcode: OpCode, mask: Option<MaskKey>, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            mask,
            payload: payload.into(),
        }
    }

    /// Creates a text frame with the given payload.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, None, payload)
    }

    /// Creates a binary frame with the given payload.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, None, payload)
    }

    /// Creates a ping frame with the given payload.
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, None, payload)
    }

    /// Creates a pong frame with the given payload.
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, None, payload)
    }

    /// Creates a continuation frame with the given payload.
    ///
    /// The first fragment of a message is a Text or Binary frame with `fin`
    /// cleared, followed by continuation frames; the last one has `fin` set.
    ///
    /// ```rust
    /// use hpx_ws_engine::frame::Frame;
    ///
    /// let first = Frame::text("Hello, ").with_fin(false);
    /// let middle = Frame::continuation("World").with_fin(false);
    /// let last = Frame::continuation("!");
    /// ```
    pub fn continuation(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Continuation, None, payload)
    }

    /// Creates a close frame with a close code and reason.
    ///
    /// ```rust
    /// use hpx_ws_engine::{close::CloseCode, frame::Frame};
    ///
    /// let frame = Frame::close(CloseCode::Normal, b"Goodbye");
    /// assert_eq!(frame.close_code(), Some(CloseCode::Normal));
    /// ```
    pub fn close(code: CloseCode, reason: impl AsRef<[u8]>) -> Self {
        let reason: &[u8] = reason.as_ref();
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.put_u16(u16::from(code));
        payload.put_slice(reason);

        Self::new(true, OpCode::Close, None, payload.freeze())
    }

    /// Creates a close frame with a raw payload; empty for a close without code.
    pub fn close_raw(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Close, None, payload)
    }

    /// Sets the fin flag and returns self for method chaining.
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Sets a masking key (builder pattern).
    pub fn with_mask(mut self, mask: MaskKey) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Sets or clears the masking key.
    #[inline(always)]
    pub fn set_mask(&mut self, mask: Option<MaskKey>) {
        self.mask = mask;
    }

    /// Returns the masking key, if the frame is masked on the wire.
    #[inline(always)]
    pub fn mask(&self) -> Option<MaskKey> {
        self.mask
    }

    #[inline(always)]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    #[inline(always)]
    pub fn is_fin(&self) -> bool {
        self.fin
    }

    /// Returns a reference to the unmasked payload.
    #[inline(always)]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consumes the frame and returns its opcode, fin flag and payload.
    #[inline(always)]
    pub fn into_parts(self) -> (OpCode, bool, Bytes) {
        (self.opcode, self.fin, self.payload)
    }

    /// Extracts the raw close code from a Close frame's payload.
    ///
    /// Returns `None` if the payload is too short to contain one.
    pub fn close_code(&self) -> Option<CloseCode> {
        let code = u16::from_be_bytes(self.payload.get(0..2)?.try_into().ok()?);
        Some(CloseCode::from(code))
    }

    /// Extracts the close reason from a Close frame's payload.
    ///
    /// # Returns
    /// - `Ok(Some(&str))` containing the reason if present
    /// - `Ok(None)` if the payload carries no reason
    /// - `Err(WebSocketError::InvalidUTF8)` if the reason is not valid UTF-8
    pub fn close_reason(&self) -> Result<Option<&str>, WebSocketError> {
        match self.payload.get(2..) {
            None | Some([]) => Ok(None),
            Some(reason) => simdutf8::basic::from_utf8(reason)
                .map(Some)
                .map_err(|_| WebSocketError::InvalidUTF8),
        }
    }

    /// Writes the frame header (up to and including the masking key) into `dst`.
    #[inline]
    pub(crate) fn write_head(&self, dst: &mut BytesMut) {
        let first_byte = (self.fin as u8) << 7 | u8::from(self.opcode);
        let mask_bit = if self.mask.is_some() { 0x80 } else { 0 };

        let len = self.payload.len();
        dst.put_u8(first_byte);
        if len < 126 {
            dst.put_u8(len as u8 | mask_bit);
        } else if len < 65536 {
            dst.put_u8(126 | mask_bit);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(127 | mask_bit);
            dst.put_u64(len as u64);
        }

        if let Some(mask) = self.mask {
            dst.put_slice(&mask);
        }
    }
}
