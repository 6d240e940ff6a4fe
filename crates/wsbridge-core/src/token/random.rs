//! Random bridge tokens for single-node deployments.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

use crate::error::BridgeError;

/// Number of random bytes in a default token (27 base64url characters).
pub const DEFAULT_TOKEN_SIZE: usize = 20;

/// Mints tokens from the operating system's CSPRNG.
///
/// # Example
///
/// ```rust
/// use wsbridge_core::token::RandomTokenGenerator;
///
/// let generator = RandomTokenGenerator::default();
/// let token = generator.generate();
/// assert_eq!(token.len(), 27);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RandomTokenGenerator {
    size: usize,
}

impl RandomTokenGenerator {
    /// Creates a generator producing `size` random bytes per token.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidTokenSize`] when `size` is zero.
    pub fn new(size: usize) -> Result<Self, BridgeError> {
        if size == 0 {
            return Err(BridgeError::InvalidTokenSize(size));
        }
        Ok(Self { size })
    }

    /// Number of random bytes behind each token.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Mints a new token.
    pub fn generate(&self) -> String {
        let mut bytes = vec![0u8; self.size];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl Default for RandomTokenGenerator {
    fn default() -> Self {
        Self {
            size: DEFAULT_TOKEN_SIZE,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
