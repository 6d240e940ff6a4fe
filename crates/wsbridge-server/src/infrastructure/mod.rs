//! Infrastructure layer: everything that touches the network.
//!
//! - **`ws_server`**  – TCP accept loop, WebSocket handshake and routing.
//! - **`peer_proxy`** – forwards a device to the node that owns its bridge.
//! - **`notifier`**   – webhook and logging device notifiers.
//! - **`broker`**     – assembles a [`BrokerContext`](crate::application::BrokerContext)
//!   from a validated [`ServerConfig`](crate::domain::ServerConfig).
//!
//! Configuration parsing is done in `main.rs`; the use cases live in
//! `application`.

pub mod broker;
pub mod notifier;
pub mod peer_proxy;
pub mod ws_server;

pub use broker::build_context;
pub use notifier::{LoggingNotifier, WebhookNotifier};
pub use peer_proxy::WsForwardingProxy;
pub use ws_server::{run_server, serve};
