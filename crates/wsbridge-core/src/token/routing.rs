//! Routing tokens: the owning node's URI, encrypted under the cluster key.
//!
//! # Wire layout
//!
//! ```text
//! base64url( IV[16] || AES-256-GCM(key, IV, UTF-8(node URI)) || tag[16] )
//! ```
//!
//! The IV is the size of one AES block and is drawn fresh for every token, so
//! two tokens for the same node never share ciphertext.  An observer cannot
//! tell which node (or whether the same node) holds a bridge, and the random
//! IV doubles as the token's uniqueness.
//!
//! GCM authenticates the ciphertext: flipping any byte of a token makes
//! decoding fail instead of yielding a different URI.  Every decode failure
//! (bad base64, short input, wrong key, tampering, non-UTF-8 plaintext) maps to
//! the same [`BridgeError::InvalidToken`].

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

use crate::error::BridgeError;
use crate::key::EncryptionKey;

/// IV length in bytes (one AES block).
pub const ROUTING_IV_LEN: usize = 16;

/// Length of the GCM authentication tag appended to the ciphertext.
const TAG_LEN: usize = 16;

/// AES-256-GCM with a block-sized (128-bit) IV.
type RoutingCipher = AesGcm<Aes256, U16>;

fn cipher(key: &EncryptionKey) -> Result<RoutingCipher, BridgeError> {
    RoutingCipher::new_from_slice(key.as_bytes())
        .map_err(|e| BridgeError::KeyUnavailable(format!("invalid key length: {e}")))
}

/// Encrypts `node_uri` into a new routing token.
///
/// # Errors
///
/// Returns [`BridgeError::KeyUnavailable`] if the cipher cannot be built or
/// encryption fails.
///
/// # Example
///
/// ```rust
/// use wsbridge_core::key::EncryptionKey;
/// use wsbridge_core::token::{decode_routing_token, encode_routing_token};
///
/// let key = EncryptionKey::generate();
/// let token = encode_routing_token(&key, "ws://10.1.2.3:8080/").unwrap();
/// assert_eq!(decode_routing_token(&key, &token).unwrap(), "ws://10.1.2.3:8080/");
/// ```
pub fn encode_routing_token(key: &EncryptionKey, node_uri: &str) -> Result<String, BridgeError> {
    let mut iv = [0u8; ROUTING_IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher(key)?
        .encrypt(Nonce::<U16>::from_slice(&iv), node_uri.as_bytes())
        .map_err(|_| BridgeError::KeyUnavailable("routing token encryption failed".into()))?;

    let mut bytes = Vec::with_capacity(ROUTING_IV_LEN + ciphertext.len());
    bytes.extend_from_slice(&iv);
    bytes.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Recovers the node URI from a routing token.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidToken`] for any malformed, truncated,
/// tampered or foreign token; [`BridgeError::KeyUnavailable`] only if the
/// cipher itself cannot be built.
pub fn decode_routing_token(key: &EncryptionKey, token: &str) -> Result<String, BridgeError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| BridgeError::InvalidToken)?;
    if bytes.len() < ROUTING_IV_LEN + TAG_LEN {
        return Err(BridgeError::InvalidToken);
    }

    let (iv, ciphertext) = bytes.split_at(ROUTING_IV_LEN);
    let plaintext = cipher(key)?
        .decrypt(Nonce::<U16>::from_slice(iv), ciphertext)
        .map_err(|_| BridgeError::InvalidToken)?;

    String::from_utf8(plaintext).map_err(|_| BridgeError::InvalidToken)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const NODE: &str = "ws://10.1.2.3:8080/";

    #[test]
    fn test_round_trip_returns_node_uri() {
        let key = EncryptionKey::generate();
        let token = encode_routing_token(&key, NODE).unwrap();
        assert_eq!(decode_routing_token(&key, &token).unwrap(), NODE);
    }

    #[test]
    fn test_same_uri_twice_gives_different_tokens() {
        let key = EncryptionKey::generate();
        let a = encode_routing_token(&key, NODE).unwrap();
        let b = encode_routing_token(&key, NODE).unwrap();
        assert_ne!(a, b, "IV must be fresh for every token");
    }

    #[test]
    fn test_token_length_matches_layout() {
        let key = EncryptionKey::generate();
        let token = encode_routing_token(&key, NODE).unwrap();
        let raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        assert_eq!(raw.len(), ROUTING_IV_LEN + NODE.len() + TAG_LEN);
    }

    #[test]
    fn test_wrong_key_is_invalid_token() {
        let token = encode_routing_token(&EncryptionKey::generate(), NODE).unwrap();
        let result = decode_routing_token(&EncryptionKey::generate(), &token);
        assert!(matches!(result, Err(BridgeError::InvalidToken)));
    }

    #[test]
    fn test_truncated_token_is_invalid_token() {
        let key = EncryptionKey::generate();
        let token = encode_routing_token(&key, NODE).unwrap();
        let result = decode_routing_token(&key, &token[..10]);
        assert!(matches!(result, Err(BridgeError::InvalidToken)));
    }

    #[test]
    fn test_non_base64_is_invalid_token() {
        let key = EncryptionKey::generate();
        let result = decode_routing_token(&key, "!!not*a*token!!");
        assert!(matches!(result, Err(BridgeError::InvalidToken)));
    }

    #[test]
    fn test_random_token_is_invalid_routing_token() {
        // A single-node token presented to a multi-node broker.
        let key = EncryptionKey::generate();
        let token = crate::token::RandomTokenGenerator::default().generate();
        let result = decode_routing_token(&key, &token);
        assert!(matches!(result, Err(BridgeError::InvalidToken)));
    }
}
