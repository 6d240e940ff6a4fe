//! Application layer: the broker's use cases.
//!
//! - **`api_key`**  – who may request a tunnel.
//! - **`notifier`** – the seam through which a device is told to dial in.
//! - **`session`**  – the requester and device flows around the
//!   [`StreamBridge`](wsbridge_core::StreamBridge): request, notify, wait,
//!   relay, and always cancel.
//!
//! Everything here works on already-upgraded sockets (split into
//! [`WsReader`](wsbridge_core::WsReader)/[`WsWriter`](wsbridge_core::WsWriter))
//! and on traits; the accept loop and the concrete notifiers live in
//! `infrastructure`.

pub mod api_key;
pub mod notifier;
pub mod session;

pub use api_key::ApiKeyValidator;
pub use notifier::{NotifyError, RequestBridgeNotifier};
pub use session::{serve_device, serve_requester, BrokerContext, SessionError};
