//! wsbridge-client library entry point.
//!
//! Both ends of a tunnel dial the broker:
//!
//! 1. The *requester* opens `/bridge/connect?deviceId=..` with its API key
//!    ([`BridgeClient::tunnel`]).  The broker notifies the device and holds
//!    the socket until the device arrives.
//! 2. The *device* receives an accept URL through its notification channel
//!    and opens it ([`BridgeAcceptor::accept`]).
//! 3. From then on, every binary frame one side sends is delivered to the
//!    other.  [`wsbridge_core::transport::bridge`] splices either socket onto
//!    a local TCP connection.

pub mod client;
pub mod error;

pub use client::{BridgeAcceptor, BridgeClient, BridgeStream, API_KEY_HEADER, DEFAULT_CONNECT_TIMEOUT};
pub use error::ClientError;
