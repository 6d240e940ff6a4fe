//! wsbridge-server library crate.
//!
//! The broker that pairs a requester with a device behind NAT.  Both sides
//! dial in over WebSocket; the broker splices the two sockets together.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Requester ──ws──► /bridge/connect          /bridge/accept ◄──ws── Device
//!                         │                        │
//! [wsbridge-server]       ▼                        ▼
//!   ├── domain/           config, routes, notification payload
//!   ├── application/      api key check, notifier seam, session flows
//!   └── infrastructure/
//!         ├── ws_server/  accept loop and handshake routing (tokio-tungstenite)
//!         ├── peer_proxy/ forwarding to the owning node (multi-node mode)
//!         ├── notifier/   webhook (reqwest) and logging notifiers
//!         └── broker/     ServerConfig → BrokerContext
//!                         │
//!                         ▼
//!                  [wsbridge-core] StreamBridge, tokens, registry, pumps
//! ```
//!
//! # Layer rules
//!
//! - `domain` performs no I/O.
//! - `application` depends on `domain` and `wsbridge-core`, and on traits for
//!   anything external.
//! - `infrastructure` depends on all other layers plus the network crates.

/// Domain layer: configuration and wire vocabulary.
pub mod domain;

/// Application layer: session flows and seams.
pub mod application;

/// Infrastructure layer: accept loop, forwarding, notifiers.
pub mod infrastructure;
