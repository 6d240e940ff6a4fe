//! StreamBridge: the public rendezvous contract, one variant per deployment mode.
//!
//! # Modes
//!
//! | Mode       | Tokens                 | `accept` on a miss                  |
//! |------------|------------------------|-------------------------------------|
//! | SingleNode | 20 random bytes        | `UnknownToken`                      |
//! | MultiNode  | encrypted node URI     | decode owner, forward to that peer  |
//!
//! The mode is chosen once at startup ([`StreamBridge::single_node`] or
//! [`StreamBridge::multi_node`]) and never changes for the process lifetime.
//! Both modes keep bridges in a local [`BridgeRegistry`]; the requester always
//! waits on the node that minted its token.
//!
//! # Caller contract
//!
//! Whoever calls [`request_bridge`](StreamBridge::request_bridge) must call
//! [`cancel`](StreamBridge::cancel) exactly when its exchange ends, whatever
//! the outcome.  `cancel` is the only way a bridge leaves the table.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{BridgeError, Rejected};
use crate::proxy::ForwardingProxy;
use crate::registry::BridgeRegistry;
use crate::router::NodeRouter;
use crate::token::RandomTokenGenerator;

/// Single-node composition: the registry and a random token source.
pub struct SingleNodeBridge<S> {
    registry: BridgeRegistry<S>,
    tokens: RandomTokenGenerator,
}

/// Multi-node composition: the registry, the router and the forwarding proxy.
pub struct MultiNodeBridge<S> {
    registry: BridgeRegistry<S>,
    router: NodeRouter,
    proxy: Arc<dyn ForwardingProxy<S>>,
}

/// The rendezvous engine, in the mode chosen at startup.
///
/// Requesters register and wait here; devices accept here.  Multi-node mode
/// additionally forwards devices whose token belongs to another node.
pub enum StreamBridge<S> {
    SingleNode(SingleNodeBridge<S>),
    MultiNode(MultiNodeBridge<S>),
}

impl<S: Send + 'static> StreamBridge<S> {
    pub fn single_node(tokens: RandomTokenGenerator) -> Self {
        Self::SingleNode(SingleNodeBridge {
            registry: BridgeRegistry::new(),
            tokens,
        })
    }

    pub fn multi_node(router: NodeRouter, proxy: Arc<dyn ForwardingProxy<S>>) -> Self {
        Self::MultiNode(MultiNodeBridge {
            registry: BridgeRegistry::new(),
            router,
            proxy,
        })
    }

    /// Registers `requester` as a new pending bridge and returns its token.
    pub async fn request_bridge(&self, requester: S) -> Result<String, Rejected<S>> {
        let token = match self {
            Self::SingleNode(bridge) => bridge.tokens.generate(),
            Self::MultiNode(bridge) => match bridge.router.create_token().await {
                Ok(token) => token,
                Err(e) => return Err(Rejected::new(e, requester)),
            },
        };

        self.registry().insert(token.clone(), requester)?;
        Ok(token)
    }

    /// Suspends until the device stream for `token` arrives or `cancel` fires.
    ///
    /// Always local: the requester waits on the node that minted the token.
    pub async fn wait_for_device_stream(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<S, BridgeError> {
        self.registry().wait_for_device_stream(token, cancel).await
    }

    /// Hands `device` to the bridge for `token` and returns the stream the
    /// device side should write into.
    ///
    /// In multi-node mode a token unknown to this node is decoded and, if it
    /// belongs to a peer, forwarded there.
    pub async fn accept(&self, token: &str, device: S) -> Result<S, Rejected<S>> {
        match self {
            Self::SingleNode(bridge) => bridge.registry.accept(token, device),
            Self::MultiNode(bridge) => bridge.accept(token, device).await,
        }
    }

    /// Removes the bridge for `token`.  Idempotent and local-only.
    pub fn cancel(&self, token: &str) {
        self.registry().cancel(token);
    }

    /// Number of bridges currently registered on this node.
    pub fn pending(&self) -> usize {
        self.registry().len()
    }

    /// Returns `true` if this bridge routes tokens across nodes.
    pub fn is_multi_node(&self) -> bool {
        matches!(self, Self::MultiNode(_))
    }

    fn registry(&self) -> &BridgeRegistry<S> {
        match self {
            Self::SingleNode(bridge) => &bridge.registry,
            Self::MultiNode(bridge) => &bridge.registry,
        }
    }
}

impl<S: Send + 'static> MultiNodeBridge<S> {
    async fn accept(&self, token: &str, device: S) -> Result<S, Rejected<S>> {
        let device = match self.registry.accept(token, device) {
            Ok(requester) => return Ok(requester),
            Err(rejected) if matches!(rejected.error(), BridgeError::UnknownToken) => {
                rejected.into_parts().1
            }
            Err(rejected) => return Err(rejected),
        };

        let owner = match self.router.resolve_owner(token).await {
            Ok(owner) => owner,
            Err(BridgeError::KeyUnavailable(reason)) => {
                return Err(Rejected::new(BridgeError::KeyUnavailable(reason), device))
            }
            Err(_) => return Err(Rejected::new(BridgeError::InvalidToken, device)),
        };

        // A token minted here but absent from the table is stale.  Never loop
        // back to ourselves.
        if self.router.is_self(&owner) {
            warn!("bridge {token}: minted by this node but no longer pending");
            return Err(Rejected::new(BridgeError::InvalidToken, device));
        }

        debug!("bridge {token}: forwarding accept to {owner}");
        self.proxy.accept_on_peer(token, &owner, device).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
