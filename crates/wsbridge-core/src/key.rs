//! Cluster encryption key and the seam through which it is obtained.
//!
//! Routing tokens are encrypted with a 256-bit key shared by every node in a
//! cluster.  The rendezvous engine never reads configuration or secret stores
//! directly; it asks an [`EncryptionKeyProvider`].  The provider is called on
//! every token mint and decode, so implementations must answer from memory
//! (cache anything fetched from a remote secret store).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::BridgeError;

/// A 256-bit symmetric key, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; EncryptionKey::LEN]);

impl EncryptionKey {
    /// Key length in bytes.
    pub const LEN: usize = 32;

    /// Wraps raw key material.
    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a standard (padded) base64 string holding exactly 32 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::KeyUnavailable`] when the text is not base64 or
    /// does not decode to 32 bytes.
    pub fn from_base64(text: &str) -> Result<Self, BridgeError> {
        let mut decoded = STANDARD
            .decode(text.trim())
            .map_err(|e| BridgeError::KeyUnavailable(format!("key is not valid base64: {e}")))?;
        let result = <[u8; Self::LEN]>::try_from(decoded.as_slice())
            .map(Self)
            .map_err(|_| {
                BridgeError::KeyUnavailable(format!(
                    "key must be {} bytes, got {}",
                    Self::LEN,
                    decoded.len()
                ))
            });
        decoded.zeroize();
        result
    }

    /// Draws a fresh key from the operating system's CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Standard base64 form, suitable for configuration files.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Source of the cluster encryption key.
#[async_trait]
pub trait EncryptionKeyProvider: Send + Sync {
    /// Returns the current cluster key.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::KeyUnavailable`] if the key cannot be produced.
    async fn encryption_key(&self) -> Result<EncryptionKey, BridgeError>;
}

/// Provider for a key fixed at startup (configuration file, CLI, environment).
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    key: EncryptionKey,
}

impl StaticKeyProvider {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl EncryptionKeyProvider for StaticKeyProvider {
    async fn encryption_key(&self) -> Result<EncryptionKey, BridgeError> {
        Ok(self.key.clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_round_trip_preserves_key() {
        let key = EncryptionKey::generate();
        let parsed = EncryptionKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn test_from_base64_rejects_short_key() {
        // 16 bytes is an AES-128 key, not the 256-bit cluster key.
        let short = STANDARD.encode([7u8; 16]);
        let result = EncryptionKey::from_base64(&short);
        assert!(matches!(result, Err(BridgeError::KeyUnavailable(_))));
    }

    #[test]
    fn test_from_base64_rejects_garbage() {
        let result = EncryptionKey::from_base64("not base64 at all!");
        assert!(matches!(result, Err(BridgeError::KeyUnavailable(_))));
    }

    #[test]
    fn test_from_base64_ignores_surrounding_whitespace() {
        let key = EncryptionKey::from_bytes([3u8; 32]);
        let text = format!("  {}\n", key.to_base64());
        assert_eq!(EncryptionKey::from_base64(&text).unwrap(), key);
    }

    #[test]
    fn test_debug_output_redacts_key_material() {
        let key = EncryptionKey::from_bytes([0xAB; 32]);
        let debug = format!("{key:?}");
        assert!(!debug.contains("171"), "key bytes must not appear in Debug");
        assert!(debug.contains("redacted"));
    }

    #[tokio::test]
    async fn test_static_provider_returns_configured_key() {
        let key = EncryptionKey::from_bytes([9u8; 32]);
        let provider = StaticKeyProvider::new(key.clone());
        assert_eq!(provider.encryption_key().await.unwrap(), key);
    }
}
