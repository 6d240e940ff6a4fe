//! API-key check for `/bridge/connect`.

use subtle::ConstantTimeEq;

/// Validates the `X-Api-Key` header against the configured keys.
///
/// Comparison is constant-time per key.  An empty key list rejects every
/// caller, so a broker started without keys cannot be used as an open relay.
#[derive(Clone, Default)]
pub struct ApiKeyValidator {
    keys: Vec<String>,
}

impl ApiKeyValidator {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys: keys.into_iter().filter(|key| !key.is_empty()).collect(),
        }
    }

    /// Returns `true` if `presented` matches one of the configured keys.
    pub fn is_valid(&self, presented: Option<&str>) -> bool {
        let Some(presented) = presented.map(str::trim).filter(|key| !key.is_empty()) else {
            return false;
        };
        self.keys
            .iter()
            .fold(false, |found, key| {
                found | bool::from(key.as_bytes().ct_eq(presented.as_bytes()))
            })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for ApiKeyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyValidator")
            .field("keys", &self.keys.len())
            .finish()
    }
}
