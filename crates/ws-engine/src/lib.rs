//! # hpx-ws-engine
//!
//! RFC 6455 WebSocket connection engine. It interprets and emits frames over an
//! already-upgraded byte stream, enforces the masking rules of each [`Role`],
//! drives the ping/pong/close state machine and reports what happens on the
//! connection through a [`Handler`].
//!
//! TCP/TLS setup and the HTTP upgrade handshake are not part of this crate: a
//! [`Connection`] starts from any `AsyncRead + AsyncWrite` stream once the
//! upgrade has succeeded.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │ Application (Handler callbacks / Sender)       │
//! └────────────────┬───────────────────────────────┘
//!                  │
//! ┌────────────────▼───────────────────────────────┐
//! │ Connection                                     │
//! │ • read loop, one inbound frame at a time       │
//! │ • single writer behind a mutex                 │
//! └───────┬────────────────────────┬───────────────┘
//!         │                        │
//! ┌───────▼──────────┐    ┌────────▼──────────────┐
//! │ Dispatcher       │    │ StateMachine          │
//! │ • frame routing  │    │ • Open → CloseSent /  │
//! │ • UTF-8, frags   │    │   CloseReceived →     │
//! │                  │    │   Closed              │
//! └───────┬──────────┘    └────────┬──────────────┘
//!         │                        │
//! ┌───────▼────────────────────────▼───────────────┐
//! │ Codec + MaskKeyProvider                        │
//! │ • header parsing, payload (un)masking          │
//! └────────────────┬───────────────────────────────┘
//!                  │
//!        Upgraded byte stream (TCP/TLS/…)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hpx_ws_engine::{Connection, Handler, Role, Sender, async_trait};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Handler for Echo {
//!     async fn on_text(&mut self, ws: &Sender, text: String) {
//!         let _ = ws.send_text(text).await;
//!     }
//! }
//!
//! async fn serve(stream: tokio::net::TcpStream) -> hpx_ws_engine::Result<()> {
//!     // `stream` has already been through the HTTP upgrade.
//!     let (conn, _sender) = Connection::builder(Role::Server).build(stream, Echo);
//!     conn.run().await
//! }
//! ```

pub mod close;
pub mod codec;
pub mod connection;
pub mod dispatch;
pub mod frame;
pub mod handler;
pub mod key;
pub mod mask;
mod options;
mod role;
pub mod state;

use std::sync::Arc;

pub use async_trait::async_trait;
pub use close::{CloseCode, CloseFrame};
pub use connection::{Connection, ConnectionBuilder, ConnectionId, Sender};
pub use frame::{Frame, MaskKey, OpCode};
pub use handler::{Event, EventChannel, Handler};
pub use options::{MAX_PAYLOAD_READ, MAX_READ_BUFFER, Options, Utf8Policy};
pub use role::Role;
pub use state::CloseState;
use thiserror::Error;

/// Result type for WebSocket operations.
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// Errors that can occur while running a WebSocket connection.
#[derive(Error, Debug, Clone)]
pub enum WebSocketError {
    /// Reserved bits in frame header are not zero.
    #[error("Reserved bits are not zero")]
    ReservedBitsNotZero,

    /// Control frame is fragmented.
    #[error("Control frame must not be fragmented")]
    ControlFrameFragmented,

    /// Control frame payload exceeds 125 bytes.
    #[error("Control frame too large")]
    ControlFrameTooLarge,

    /// Frame or assembled message payload exceeds configured maximum.
    #[error("Frame too large")]
    FrameTooLarge,

    /// A server received a frame without a masking key.
    #[error("Received unmasked frame from client")]
    UnmaskedFrame,

    /// A client received a frame carrying a masking key.
    #[error("Received masked frame from server")]
    UnexpectedMask,

    /// Reserved opcode.
    #[error("Invalid opcode (byte={0})")]
    InvalidOpCode(u8),

    /// Close frame has invalid format.
    #[error("Invalid close frame")]
    InvalidCloseFrame,

    /// Close code may not be sent on the wire.
    #[error("Invalid close code")]
    InvalidCloseCode,

    /// Payload contains invalid UTF-8.
    #[error("Invalid UTF-8")]
    InvalidUTF8,

    /// New data frame while a fragmented message is still open.
    #[error("Invalid fragment")]
    InvalidFragment,

    /// Continuation frame without initial frame.
    #[error("Invalid continuation frame")]
    InvalidContinuationFrame,

    /// Connection has been closed.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// No masking key could be drawn from the random source.
    #[error("Random source unavailable: {0}")]
    RandomUnavailable(String),

    /// I/O error from the underlying byte stream.
    #[error(transparent)]
    IoError(Arc<std::io::Error>),
}

impl From<std::io::Error> for WebSocketError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(Arc::new(err))
    }
}

impl WebSocketError {
    /// Returns `true` if this is a protocol-level error (RFC 6455 violation).
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::ReservedBitsNotZero
                | Self::ControlFrameFragmented
                | Self::ControlFrameTooLarge
                | Self::FrameTooLarge
                | Self::UnmaskedFrame
                | Self::UnexpectedMask
                | Self::InvalidOpCode(_)
                | Self::InvalidCloseFrame
                | Self::InvalidUTF8
                | Self::InvalidFragment
                | Self::InvalidContinuationFrame
        )
    }

    /// Returns `true` if the connection is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }

    /// Returns `true` if this wraps an I/O error.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::IoError(_))
    }

    /// Returns the underlying I/O error, if any.
    pub fn as_io_error(&self) -> Option<&std::io::Error> {
        match self {
            Self::IoError(e) => Some(e),
            _ => None,
        }
    }

    /// The close code sent to the peer when this error ends the connection.
    ///
    /// Returns `None` for errors that are not protocol violations.
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::FrameTooLarge => Some(CloseCode::Size),
            Self::InvalidUTF8 => Some(CloseCode::Invalid),
            err if err.is_protocol_error() => Some(CloseCode::Protocol),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_classification() {
        assert!(WebSocketError::UnmaskedFrame.is_protocol_error());
        assert!(WebSocketError::InvalidOpCode(0x3).is_protocol_error());
        assert!(!WebSocketError::ConnectionClosed.is_protocol_error());
        assert!(!WebSocketError::RandomUnavailable("exhausted".into()).is_protocol_error());

        let io = WebSocketError::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(io.is_io_error());
        assert!(!io.is_protocol_error());
        assert_eq!(
            io.as_io_error().map(|e| e.kind()),
            Some(std::io::ErrorKind::BrokenPipe)
        );
    }

    #[test]
    fn test_close_code_mapping() {
        assert_eq!(
            WebSocketError::ReservedBitsNotZero.close_code(),
            Some(CloseCode::Protocol)
        );
        assert_eq!(
            WebSocketError::FrameTooLarge.close_code(),
            Some(CloseCode::Size)
        );
        assert_eq!(
            WebSocketError::InvalidUTF8.close_code(),
            Some(CloseCode::Invalid)
        );
        assert_eq!(WebSocketError::ConnectionClosed.close_code(), None);
    }
}
