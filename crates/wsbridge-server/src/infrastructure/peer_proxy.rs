//! Forwarding a device to the node that owns its bridge.
//!
//! The device's socket stays on this node.  We dial the owner's
//! `/bridge/accept` with the same token and splice the two sockets:
//!
//! ```text
//! device ──(device reader)──► serve_device ──► outbound writer ──► owner
//! device ◄──(device writer)── spawned relay ◄── outbound reader ◄── owner
//! ```
//!
//! The outbound writer is returned as "the requester's stream", so the
//! device session copies into it exactly as it would locally.  The owner's
//! close status is mirrored onto the device socket, so a device forwarded to
//! a node that no longer holds the bridge still sees `4404`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, warn};
use url::Url;
use wsbridge_core::transport::relay;
use wsbridge_core::{split_ws, BridgeError, ForwardingProxy, Rejected, WsWriter};

use crate::domain::accept_url;

/// Upper bound on dialing a peer and completing its handshake.
pub const PEER_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`ForwardingProxy`] over outbound WebSocket connections.
#[derive(Debug, Clone, Copy)]
pub struct WsForwardingProxy {
    connect_timeout: Duration,
}

impl Default for WsForwardingProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl WsForwardingProxy {
    pub fn new() -> Self {
        Self {
            connect_timeout: PEER_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl ForwardingProxy<WsWriter> for WsForwardingProxy {
    async fn accept_on_peer(
        &self,
        token: &str,
        peer: &Url,
        device: WsWriter,
    ) -> Result<WsWriter, Rejected<WsWriter>> {
        let target = accept_url(peer, token);
        debug!("forwarding bridge token '{token}' to {peer}");

        let connect = tokio::time::timeout(self.connect_timeout, connect_async(target.as_str()));
        let reason = match connect.await {
            Ok(Ok((socket, _response))) => return Ok(splice(token, socket, device)),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no handshake within {:?}", self.connect_timeout),
        };
        warn!("peer {peer} unreachable for bridge token '{token}': {reason}");
        Err(Rejected::new(
            BridgeError::PeerUnreachable {
                peer: peer.to_string(),
                reason,
            },
            device,
        ))
    }
}

/// Relays the owner's socket onto the device in the background and returns
/// the owner-bound writer.
fn splice<T>(token: &str, socket: WebSocketStream<T>, device: WsWriter) -> WsWriter
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (reader, writer) = split_ws(socket);
    let token = token.to_string();
    tokio::spawn(async move {
        match relay(reader, device).await {
            Ok(bytes) => debug!("forwarded bridge '{token}' closed after {bytes} bytes to device"),
            Err(e) => debug!("forwarded bridge '{token}' failed: {e}"),
        }
    });
    writer
}

// ── Tests ─────────────────────────────────────────────────────────────────────
