//! Close handshake state machine ([RFC 6455 Section 7](https://datatracker.ietf.org/doc/html/rfc6455#section-7)).
//!
//! ```text
//!            local close(code)             remote close (ack)
//!   Open ─────────────────────▶ CloseSent ───────────────────▶ Closed
//!    │                                                          ▲
//!    │ remote close            echo flushed                     │
//!    └──────────────▶ CloseReceived ────────────────────────────┘
//!    │                                                          ▲
//!    └── local close(None) / violation / transport failure ─────┘
//! ```
//!
//! The machine performs no I/O. Every transition returns the frame, if any,
//! the connection has to write next; the connection owns the transport and
//! reports back through [`StateMachine::finish`] once it is shut down.

use bytes::Bytes;
use tracing::debug;

use crate::{
    WebSocketError,
    close::{CloseCode, CloseFrame},
    frame::Frame,
};

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CloseState {
    #[default]
    Open,
    /// We sent a close frame and wait for the peer's.
    CloseSent,
    /// The peer sent a close frame and our echo is being written.
    CloseReceived,
    Closed,
}

impl CloseState {
    #[inline]
    pub fn is_open(self) -> bool {
        self == CloseState::Open
    }

    #[inline]
    pub fn is_closed(self) -> bool {
        self == CloseState::Closed
    }
}

/// What to do after the application asked to close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalClose {
    /// Write this close frame, then keep reading until the peer answers.
    SendClose(Frame),
    /// No code was given: shut the transport down right away.
    Shutdown,
    /// Closing has already started or finished.
    Ignore,
}

/// What to do after a close frame arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteClose {
    /// The peer acknowledged our close frame; shut the transport down.
    Acknowledged,
    /// Write this echo, call [`StateMachine::finish`], then shut the transport down.
    Echo(Frame),
    /// The connection is already past the handshake.
    Ignore,
}

/// Tracks [`CloseState`] and decides which control frames to emit.
#[derive(Debug, Default)]
pub struct StateMachine {
    state: CloseState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> CloseState {
        self.state
    }

    /// Data frames and close requests are only legal while `Open`.
    #[inline]
    pub fn can_send(&self) -> bool {
        self.state.is_open()
    }

    /// Pings are allowed until `Closed`, or only while `Open` when `strict`.
    #[inline]
    pub fn can_ping(&self, strict: bool) -> bool {
        if strict {
            self.state.is_open()
        } else {
            !self.state.is_closed()
        }
    }

    /// The application asked to close the connection.
    ///
    /// With a code, a close frame is produced and the state becomes
    /// `CloseSent`. Without one the state becomes `Closed` immediately. In any
    /// state other than `Open` this is a no-op.
    pub fn local_close(&mut self, code: Option<CloseCode>, reason: &str) -> LocalClose {
        if !self.state.is_open() {
            return LocalClose::Ignore;
        }

        match code {
            Some(code) => {
                debug!(%code, "close handshake initiated");
                self.state = CloseState::CloseSent;
                LocalClose::SendClose(Frame::close(code, reason))
            }
            None => {
                debug!("closing without handshake");
                self.state = CloseState::Closed;
                LocalClose::Shutdown
            }
        }
    }

    /// A close frame arrived from the peer.
    pub fn remote_close(&mut self, close: &CloseFrame) -> RemoteClose {
        match self.state {
            CloseState::CloseSent => {
                debug!(code = ?close.code, "close handshake acknowledged");
                self.state = CloseState::Closed;
                RemoteClose::Acknowledged
            }
            CloseState::Open => {
                debug!(code = ?close.code, "close handshake received");
                self.state = CloseState::CloseReceived;
                let echo = match close.code {
                    Some(code) => Frame::close(code, b""),
                    None => Frame::close_raw(Bytes::new()),
                };
                RemoteClose::Echo(echo)
            }
            CloseState::CloseReceived | CloseState::Closed => RemoteClose::Ignore,
        }
    }

    /// A ping arrived from the peer. Returns the pong to send, unless `Closed`.
    ///
    /// The state is unchanged.
    pub fn ping(&self, payload: Bytes) -> Option<Frame> {
        (!self.state.is_closed()).then(|| Frame::pong(payload))
    }

    /// The peer broke the protocol.
    ///
    /// The connection ends in `Closed`. A close frame carrying the error's
    /// close code is produced only if none has been sent yet.
    pub fn violation(&mut self, err: &WebSocketError) -> Option<Frame> {
        let frame = match (self.state, err.close_code()) {
            (CloseState::Open, Some(code)) => Some(Frame::close(code, err.to_string())),
            _ => None,
        };
        self.state = CloseState::Closed;
        frame
    }

    /// The transport is gone or has been shut down.
    pub fn finish(&mut self) {
        self.state = CloseState::Closed;
    }
}
