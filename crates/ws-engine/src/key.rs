//! Masking key generation.
//!
//! Every client frame is masked with a key that is drawn fresh from a
//! cryptographically secure source ([RFC 6455 Section 5.3](https://datatracker.ietf.org/doc/html/rfc6455#section-5.3)).
//! The source is injected through [`KeySource`] so tests can pin the key.

use rand::{TryRngCore, rngs::OsRng};

use crate::{Result, Role, WebSocketError, frame::MaskKey};

/// A source of 32-bit masking keys.
pub trait KeySource: Send + 'static {
    /// Produces the next key.
    ///
    /// # Errors
    /// [`WebSocketError::RandomUnavailable`] if no key can be produced.
    fn next(&mut self) -> Result<MaskKey>;
}

/// Draws keys from the operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsKeySource;

impl KeySource for OsKeySource {
    fn next(&mut self) -> Result<MaskKey> {
        let mut key = [0u8; 4];
        OsRng
            .try_fill_bytes(&mut key)
            .map_err(|e| WebSocketError::RandomUnavailable(e.to_string()))?;
        Ok(key)
    }
}

/// Always yields the same key. Only suitable for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedKeySource(pub MaskKey);

impl KeySource for FixedKeySource {
    fn next(&mut self) -> Result<MaskKey> {
        Ok(self.0)
    }
}

/// Hands out masking keys according to the connection role.
pub struct MaskKeyProvider {
    source: Box<dyn KeySource>,
}

impl MaskKeyProvider {
    pub fn new(source: impl KeySource) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// A provider backed by [`OsKeySource`].
    pub fn os() -> Self {
        Self::new(OsKeySource)
    }

    /// Returns a fresh key for a client and `None` for a server.
    ///
    /// The source is not consulted for a server.
    pub fn next_key(&mut self, role: Role) -> Result<Option<MaskKey>> {
        if role.masks_outbound() {
            self.source.next().map(Some)
        } else {
            Ok(None)
        }
    }
}

impl Default for MaskKeyProvider {
    fn default() -> Self {
        Self::os()
    }
}

impl std::fmt::Debug for MaskKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskKeyProvider").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    struct Exhausted;

    impl KeySource for Exhausted {
        fn next(&mut self) -> Result<MaskKey> {
            Err(WebSocketError::RandomUnavailable("entropy exhausted".into()))
        }
    }

    #[test]
    fn test_server_has_no_key() {
        let mut provider = MaskKeyProvider::new(Exhausted);
        assert!(matches!(provider.next_key(Role::Server), Ok(None)));
    }

    #[test]
    fn test_fixed_source() {
        let mut provider = MaskKeyProvider::new(FixedKeySource([9, 8, 7, 6]));
        assert_eq!(provider.next_key(Role::Client).unwrap(), Some([9, 8, 7, 6]));
        assert_eq!(provider.next_key(Role::Client).unwrap(), Some([9, 8, 7, 6]));
    }

    #[test]
    fn test_os_keys_are_fresh() {
        let mut provider = MaskKeyProvider::default();
        let keys: HashSet<MaskKey> = (0..64)
            .map(|_| provider.next_key(Role::Client).unwrap().unwrap())
            .collect();
        // 64 draws from 2^32 values; a collision is vanishingly unlikely
        assert!(keys.len() >= 63);
    }

    #[test]
    fn test_failing_source() {
        let mut provider = MaskKeyProvider::new(Exhausted);
        assert!(matches!(
            provider.next_key(Role::Client),
            Err(WebSocketError::RandomUnavailable(_))
        ));
    }
}
