// This code is sourced primarily from the tungstenite-rs library, which can be found at:
// https://github.com/snapview/tungstenite-rs/blob/42b8797e8b7f39efb7d9322dc8af3e9089db4f7d/src/protocol/frame/coding.rs#L117
//
// Original contributions by:
// Copyright (c) 2017 Alexey Galakhov
// Copyright (c) 2016 Jason Housley
// Licensed under both MIT and Apache 2.0 licenses
//
// Modifications made by:
// Copyright 2023 Divy Srivastava <dj.srivastava23@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// You may obtain a copy of the License at:
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is provided "AS IS", WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
// either express or implied. See the License for specific language governing permissions and limitations.
//

//! Close codes and close frame payloads ([RFC 6455 Section 7.4](https://datatracker.ietf.org/doc/html/rfc6455#section-7.4)).
//!
//! A close frame payload is either empty, or a big-endian `u16` status code
//! optionally followed by a UTF-8 reason.

use self::CloseCode::*;
use crate::{Result, WebSocketError};

/// Status codes representing the reasons why an endpoint is closing the WebSocket connection.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub enum CloseCode {
    /// Normal closure; the purpose for which the connection was established has been fulfilled.
    Normal,
    /// The endpoint is "going away", such as a server shutting down or a page being left.
    Away,
    /// The endpoint is terminating the connection due to a protocol error.
    Protocol,
    /// The endpoint received a type of data it cannot accept.
    Unsupported,
    /// No status code was present. Must not be sent on the wire.
    Status,
    /// The connection was closed without a close frame. Must not be sent on the wire.
    Abnormal,
    /// Message data was inconsistent with its type, e.g. non-UTF-8 data in a text message.
    Invalid,
    /// Generic policy violation.
    Policy,
    /// The message is too big to process.
    Size,
    /// The client expected the server to negotiate an extension it did not.
    Extension,
    /// The server encountered an unexpected condition.
    Error,
    /// The server is restarting.
    Restart,
    /// The server is overloaded; try again later.
    Again,
    #[doc(hidden)]
    /// TLS handshake failure. Must not be sent on the wire.
    Tls,
    #[doc(hidden)]
    /// Reserved for future versions of the protocol (1016-2999).
    Reserved(u16),
    #[doc(hidden)]
    /// Registered with IANA by libraries and frameworks (3000-3999).
    Iana(u16),
    #[doc(hidden)]
    /// Private use by applications (4000-4999).
    Library(u16),
    #[doc(hidden)]
    /// Outside of any range defined by the protocol.
    Bad(u16),
}

impl CloseCode {
    /// Check if this CloseCode may be carried by a close frame.
    pub fn is_allowed(self) -> bool {
        !matches!(self, Bad(_) | Reserved(_) | Status | Abnormal | Tls)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> CloseCode {
        match code {
            1000 => Normal,
            1001 => Away,
            1002 => Protocol,
            1003 => Unsupported,
            1005 => Status,
            1006 => Abnormal,
            1007 => Invalid,
            1008 => Policy,
            1009 => Size,
            1010 => Extension,
            1011 => Error,
            1012 => Restart,
            1013 => Again,
            1015 => Tls,
            1016..=2999 => Reserved(code),
            3000..=3999 => Iana(code),
            4000..=4999 => Library(code),
            _ => Bad(code),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        match code {
            Normal => 1000,
            Away => 1001,
            Protocol => 1002,
            Unsupported => 1003,
            Status => 1005,
            Abnormal => 1006,
            Invalid => 1007,
            Policy => 1008,
            Size => 1009,
            Extension => 1010,
            Error => 1011,
            Restart => 1012,
            Again => 1013,
            Tls => 1015,
            Reserved(code) => code,
            Iana(code) => code,
            Library(code) => code,
            Bad(code) => code,
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u16::from(*self))
    }
}

/// The decoded payload of a received close frame.
///
/// `code` is `None` when the peer sent no code, or sent one that may not
/// appear on the wire (see [`CloseCode::is_allowed`]). `reason` is `None`
/// when absent, empty or not valid UTF-8.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: Option<CloseCode>,
    pub reason: Option<String>,
}

impl CloseFrame {
    /// Parses a close frame payload.
    ///
    /// # Errors
    /// A payload of exactly one byte cannot hold a status code and yields
    /// [`WebSocketError::InvalidCloseFrame`].
    pub fn parse(payload: &[u8]) -> Result<CloseFrame> {
        match payload {
            [] => Ok(CloseFrame::default()),
            [_] => Err(WebSocketError::InvalidCloseFrame),
            [hi, lo, reason @ ..] => {
                let code = CloseCode::from(u16::from_be_bytes([*hi, *lo]));
                let reason = simdutf8::basic::from_utf8(reason)
                    .ok()
                    .filter(|reason| !reason.is_empty())
                    .map(str::to_owned);

                Ok(CloseFrame {
                    code: code.is_allowed().then_some(code),
                    reason,
                })
            }
        }
    }
}
