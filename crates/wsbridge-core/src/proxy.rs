//! ForwardingProxy: the seam used when a device's accept lands on the wrong node.
//!
//! The multi-node [`StreamBridge`](crate::StreamBridge) calls
//! [`accept_on_peer`](ForwardingProxy::accept_on_peer) after decoding the token
//! to a peer's URI.  An implementation dials the peer's accept endpoint, starts
//! a background relay that owns the outbound connection, and returns a stream
//! that stands in for the requester's stream held on the peer.  The caller
//! cannot tell the difference: bytes it writes reach the requester via the
//! extra hop.
//!
//! The WebSocket implementation lives in the server crate; tests use fakes.

use async_trait::async_trait;
use url::Url;

use crate::error::Rejected;

#[async_trait]
pub trait ForwardingProxy<S>: Send + Sync {
    /// Dials `peer`'s accept endpoint for `token` and relays through it.
    ///
    /// # Errors
    ///
    /// [`BridgeError::PeerUnreachable`](crate::BridgeError::PeerUnreachable)
    /// if the peer cannot be reached, with `device` handed back.
    async fn accept_on_peer(&self, token: &str, peer: &Url, device: S) -> Result<S, Rejected<S>>;
}
