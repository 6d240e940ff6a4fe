//! # wsbridge-core
//!
//! The rendezvous and routing engine of the WebSocket bridge broker.
//!
//! # How a tunnel is made (for newcomers)
//!
//! A *requester* wants a byte stream to a *device* that cannot be dialed (it
//! sits behind NAT and only makes outbound connections).  Both dial the
//! broker instead:
//!
//! ```text
//!  requester ──connect──► broker                       device
//!                          │ request_bridge → token
//!                          │ notify(device, accept URL) ───►│
//!                          │ wait_for_device_stream         │
//!                          │◄──────────── accept(token) ────┘
//!                          ▼
//!              bytes flow both ways until either side closes
//! ```
//!
//! This crate holds everything between "a socket arrived" and "bytes flow":
//!
//! - **`token`**     – opaque bridge tokens: 20 random bytes for a single node,
//!   or an encrypted node URI for a cluster (`IV || AES-256-GCM(uri)`).
//! - **`registry`**  – the table of pending bridges with one-shot rendezvous
//!   semantics.
//! - **`router`**    – this node's identity and "which node owns this token?".
//! - **`proxy`**     – the seam for forwarding an accept to the owning node.
//! - **`bridge`**    – the [`StreamBridge`] facade, one variant per deployment
//!   mode, selected once at startup.
//! - **`transport`** – WebSocket byte adapters and the 4 KiB copy loops.
//! - **`key`**       – the cluster encryption key and its provider seam.
//! - **`error`**     – [`BridgeError`] and [`Rejected`].
//!
//! The crate knows nothing about HTTP routes, API keys or how devices are
//! notified; those live in `wsbridge-server`.

pub mod bridge;
pub mod error;
pub mod key;
pub mod proxy;
pub mod registry;
pub mod router;
pub mod token;
pub mod transport;

pub use bridge::StreamBridge;
pub use error::{BridgeError, Rejected};
pub use key::{EncryptionKey, EncryptionKeyProvider, StaticKeyProvider};
pub use proxy::ForwardingProxy;
pub use registry::BridgeRegistry;
pub use router::NodeRouter;
pub use token::{decode_routing_token, encode_routing_token, RandomTokenGenerator};
pub use transport::{split_ws, CloseStatus, WsCloser, WsReader, WsWriter};
