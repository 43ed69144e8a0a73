use crate::{Result, WebSocketError, frame::Frame};

/// The role the WebSocket stream is taking.
///
/// When a server role is taken the frames will not be masked, unlike
/// the client role, in which every frame is masked with a fresh key.
/// The role is fixed for the lifetime of a connection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    /// Whether frames written by this endpoint carry a masking key.
    #[inline]
    pub fn masks_outbound(self) -> bool {
        self == Role::Client
    }

    /// Checks that an inbound frame follows the peer's masking rule.
    ///
    /// A server only accepts masked frames; a client only accepts unmasked ones.
    pub(crate) fn check_inbound(self, frame: &Frame) -> Result<()> {
        match (self, frame.mask().is_some()) {
            (Role::Server, false) => Err(WebSocketError::UnmaskedFrame),
            (Role::Client, true) => Err(WebSocketError::UnexpectedMask),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_masking_rules() {
        let masked = Frame::text("hi").with_mask([1, 2, 3, 4]);
        let unmasked = Frame::text("hi");

        assert!(Role::Server.check_inbound(&masked).is_ok());
        assert!(matches!(
            Role::Server.check_inbound(&unmasked),
            Err(WebSocketError::UnmaskedFrame)
        ));

        assert!(Role::Client.check_inbound(&unmasked).is_ok());
        assert!(matches!(
            Role::Client.check_inbound(&masked),
            Err(WebSocketError::UnexpectedMask)
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Role::Server.to_string(), "server");
        assert_eq!(Role::Client.to_string(), "client");
        assert!(Role::Client.masks_outbound());
        assert!(!Role::Server.masks_outbound());
    }
}
