//! # codec
//!
//! WebSocket frame encoding and decoding.
//!
//! This is the **lowest layer** of the engine. It turns raw bytes into [`Frame`]s
//! and back, following the wire layout of RFC 6455 Section 5.2:
//! - **Header parsing**: FIN, RSV1-3, [`OpCode`], mask bit
//! - **Payload length**: 7-bit, 16-bit and 64-bit forms
//! - **Masking/unmasking**: the payload of a decoded frame is always unmasked,
//!   and an encoded frame is masked with the key it carries
//!
//! ## What the Codec Does NOT Handle
//!
//! - **Masking policy**: whether a frame *should* be masked depends on the
//!   [`Role`](crate::Role) and is checked by the [`Dispatcher`](crate::dispatch::Dispatcher)
//!   on the way in and by the [`MaskKeyProvider`](crate::key::MaskKeyProvider) on the way out
//! - **Reserved opcodes**: labelled, not rejected
//! - **Fragment assembly** and **UTF-8 validation**: dispatcher
//! - **Ping/Pong/Close**: [`StateMachine`](crate::state::StateMachine)
//!
//! ## Components
//!
//! - [`decode`]: stateless parse of one frame from the front of a buffer
//! - [`encode`]: serialization of one frame onto the end of a buffer
//! - [`Decoder`] / [`Encoder`] / [`Codec`]: `tokio_util` adapters used with
//!   `FramedRead` / `FramedWrite`

use bytes::{Buf, BytesMut};
use tokio_util::codec;

use crate::{
    MAX_PAYLOAD_READ, Result, WebSocketError,
    frame::{Frame, MAX_CONTROL_PAYLOAD, MAX_HEAD_SIZE, MaskKey, OpCode},
    mask::apply_mask,
};

/// Outcome of a successful [`decode`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame was removed from the front of the buffer.
    Frame(Frame),
    /// The buffer is missing at least this many bytes. Nothing was consumed.
    NeedMoreData(usize),
}

/// Parses one frame from the front of `src`.
///
/// The buffer is left untouched unless a whole frame is available, in which
/// case exactly that frame's bytes are consumed. The returned frame carries its
/// masking key (if any) and an unmasked payload.
///
/// # Errors
/// - [`WebSocketError::ReservedBitsNotZero`] if RSV1-3 are set
/// - [`WebSocketError::ControlFrameFragmented`] for a control frame without FIN
/// - [`WebSocketError::ControlFrameTooLarge`] for a control payload above 125 bytes
/// - [`WebSocketError::FrameTooLarge`] when the declared length exceeds `max_payload`
///
/// ```rust
/// use bytes::BytesMut;
/// use hpx_ws_engine::codec::{Decoded, decode};
///
/// let mut buf = BytesMut::from(&[0x81, 0x05, 0x48, 0x65][..]);
/// assert_eq!(decode(&mut buf, 1024).unwrap(), Decoded::NeedMoreData(3));
/// assert_eq!(buf.len(), 4);
///
/// buf.extend_from_slice(b"llo");
/// let Decoded::Frame(frame) = decode(&mut buf, 1024).unwrap() else {
///     unreachable!()
/// };
/// assert_eq!(frame.payload().as_ref(), b"Hello");
/// assert!(buf.is_empty());
/// ```
pub fn decode(src: &mut BytesMut, max_payload: usize) -> Result<Decoded> {
    let [b0, b1, ..] = src[..] else {
        return Ok(Decoded::NeedMoreData(2 - src.len()));
    };

    if b0 & 0b0111_0000 != 0 {
        return Err(WebSocketError::ReservedBitsNotZero);
    }

    let fin = b0 & 0b1000_0000 != 0;
    let opcode = OpCode::from(b0 & 0b0000_1111);
    let masked = b1 & 0b1000_0000 != 0;
    let length_code = b1 & 0x7F;

    let extra = match length_code {
        126 => 2,
        127 => 8,
        _ => 0,
    };
    let header_size = 2 + extra + if masked { 4 } else { 0 };
    if src.len() < header_size {
        return Ok(Decoded::NeedMoreData(header_size - src.len()));
    }

    let payload_len = match extra {
        0 => u64::from(length_code),
        2 => u64::from(u16::from_be_bytes([src[2], src[3]])),
        _ => {
            let mut len = [0u8; 8];
            len.copy_from_slice(&src[2..10]);
            u64::from_be_bytes(len)
        }
    };

    if opcode.is_control() {
        if !fin {
            return Err(WebSocketError::ControlFrameFragmented);
        }
        if payload_len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(WebSocketError::ControlFrameTooLarge);
        }
    }

    let payload_len = match usize::try_from(payload_len) {
        Ok(len) if len <= max_payload => len,
        _ => return Err(WebSocketError::FrameTooLarge),
    };

    let mask: Option<MaskKey> = masked.then(|| {
        let at = 2 + extra;
        [src[at], src[at + 1], src[at + 2], src[at + 3]]
    });

    let total = header_size
        .checked_add(payload_len)
        .ok_or(WebSocketError::FrameTooLarge)?;
    if src.len() < total {
        return Ok(Decoded::NeedMoreData(total - src.len()));
    }

    src.advance(header_size);
    let mut payload = src.split_to(payload_len);
    if let Some(mask) = mask {
        apply_mask(&mut payload, mask);
    }

    Ok(Decoded::Frame(Frame::new(
        fin,
        opcode,
        mask,
        payload.freeze(),
    )))
}

/// Serializes `frame` onto the end of `dst`.
///
/// When the frame carries a masking key the mask bit is set, the key is
/// written after the length and the payload copy is masked with it. The
/// frame's own payload is not modified.
pub fn encode(frame: &Frame, dst: &mut BytesMut) {
    dst.reserve(MAX_HEAD_SIZE + frame.payload.len());

    frame.write_head(dst);

    let index = dst.len();
    dst.extend_from_slice(&frame.payload);

    if let Some(mask) = frame.mask {
        apply_mask(&mut dst[index..], mask);
    }
}

/// A combined codec that provides both encoding and decoding of WebSocket frames.
///
/// Useful with `tokio_util::codec::Framed` when one object drives both
/// directions, as test peers do.
pub struct Codec {
    decoder: Decoder,
    encoder: Encoder,
}

impl Codec {
    /// Creates a codec whose decoder rejects payloads above `max_payload_size`.
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            decoder: Decoder::new(max_payload_size),
            encoder: Encoder,
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_READ)
    }
}

impl From<(Decoder, Encoder)> for Codec {
    fn from((decoder, encoder): (Decoder, Encoder)) -> Self {
        Self { decoder, encoder }
    }
}

impl codec::Decoder for Codec {
    type Item = <Decoder as codec::Decoder>::Item;
    type Error = <Decoder as codec::Decoder>::Error;

    #[inline]
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.decoder.decode(src)
    }
}

impl codec::Encoder<Frame> for Codec {
    type Error = <Encoder as codec::Encoder<Frame>>::Error;

    #[inline]
    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        self.encoder.encode(item, dst)
    }
}

/// A decoder for WebSocket frames.
///
/// Wraps [`decode`] with a payload ceiling. When a frame is incomplete it
/// reserves the missing capacity so the next read can fill it in one go.
#[derive(Debug, Clone)]
pub struct Decoder {
    /// Maximum allowed size for a frame payload.
    max_payload_size: usize,
}

impl Decoder {
    /// Creates a new `Decoder` limiting payloads to `max_payload_size` bytes.
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }
}

impl codec::Decoder for Decoder {
    type Item = Frame;
    type Error = WebSocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match decode(src, self.max_payload_size)? {
            Decoded::Frame(frame) => Ok(Some(frame)),
            Decoded::NeedMoreData(missing) => {
                src.reserve(missing);
                Ok(None)
            }
        }
    }
}

/// WebSocket frame encoder.
///
/// Role-agnostic: the caller decides whether a frame carries a mask key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder;

impl codec::Encoder<Frame> for Encoder {
    type Error = WebSocketError;

    #[inline(always)]
    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        encode(&frame, dst);
        Ok(())
    }
}
