//! Domain layer: configuration, node identity and the broker's wire vocabulary.
//!
//! Nothing in here performs I/O.  Environment variables and files are read by
//! the binary and handed in as plain values.

pub mod config;
pub mod messages;
pub mod node;

pub use config::{BridgeMode, ConfigError, ServerConfig, Settings};
pub use messages::{accept_url, BridgeRequestData, Route, RouteError, API_KEY_HEADER};
pub use node::resolve_node_uri;
