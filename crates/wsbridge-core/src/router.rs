//! NodeRouter: this node's identity and the owner lookup for routing tokens.
//!
//! Used only in multi-node mode.  The router mints routing tokens that encode
//! [`current_node_uri`](NodeRouter::current_node_uri) and decodes foreign
//! tokens back to the URI of the node that minted them.  It holds no table;
//! all routing information lives in the token itself.

use std::sync::Arc;

use url::Url;

use crate::error::BridgeError;
use crate::key::EncryptionKeyProvider;
use crate::token::{decode_routing_token, encode_routing_token};

pub struct NodeRouter {
    node_uri: Url,
    keys: Arc<dyn EncryptionKeyProvider>,
}

impl NodeRouter {
    /// `node_uri` is this process's externally reachable identity, resolved
    /// once at startup.
    pub fn new(node_uri: Url, keys: Arc<dyn EncryptionKeyProvider>) -> Self {
        Self { node_uri, keys }
    }

    pub fn current_node_uri(&self) -> &Url {
        &self.node_uri
    }

    /// Mints a routing token that decodes to this node.
    pub async fn create_token(&self) -> Result<String, BridgeError> {
        let key = self.keys.encryption_key().await?;
        encode_routing_token(&key, self.node_uri.as_str())
    }

    /// Decodes the URI of the node that minted `token`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidToken`] if the token does not decrypt under the
    /// cluster key or its payload is not a URI.
    pub async fn resolve_owner(&self, token: &str) -> Result<Url, BridgeError> {
        let key = self.keys.encryption_key().await?;
        let owner = decode_routing_token(&key, token)?;
        Url::parse(&owner).map_err(|_| BridgeError::InvalidToken)
    }

    /// Returns `true` if `uri` names this node.
    pub fn is_self(&self, uri: &Url) -> bool {
        *uri == self.node_uri
    }
}

impl std::fmt::Debug for NodeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRouter")
            .field("node_uri", &self.node_uri.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{EncryptionKey, StaticKeyProvider};

    fn router(uri: &str, key: &EncryptionKey) -> NodeRouter {
        NodeRouter::new(
            Url::parse(uri).unwrap(),
            Arc::new(StaticKeyProvider::new(key.clone())),
        )
    }

    #[tokio::test]
    async fn test_token_resolves_to_minting_node() {
        // Arrange
        let key = EncryptionKey::generate();
        let node_x = router("ws://10.0.0.1:8080", &key);
        let node_y = router("ws://10.0.0.2:8080", &key);

        // Act
        let token = node_x.create_token().await.unwrap();
        let owner = node_y.resolve_owner(&token).await.unwrap();

        // Assert
        assert_eq!(owner, *node_x.current_node_uri());
        assert!(!node_y.is_self(&owner));
        assert!(node_x.is_self(&owner));
    }

    #[tokio::test]
    async fn test_foreign_cluster_token_is_invalid() {
        let node_x = router("ws://10.0.0.1:8080", &EncryptionKey::generate());
        let node_y = router("ws://10.0.0.2:8080", &EncryptionKey::generate());

        let token = node_x.create_token().await.unwrap();
        let result = node_y.resolve_owner(&token).await;

        assert!(matches!(result, Err(BridgeError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_non_uri_payload_is_invalid() {
        let key = EncryptionKey::generate();
        let token = encode_routing_token(&key, "not a uri").unwrap();
        let node = router("ws://10.0.0.1:8080", &key);

        let result = node.resolve_owner(&token).await;

        assert!(matches!(result, Err(BridgeError::InvalidToken)));
    }
}
