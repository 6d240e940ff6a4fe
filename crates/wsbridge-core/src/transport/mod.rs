//! StreamConnector: moving bytes between WebSockets and plain byte streams.
//!
//! Bridges never inspect message framing.  A WebSocket is viewed as a byte
//! stream: every binary (or text) frame's payload is appended to the read side,
//! every write becomes one binary frame.
//!
//! - [`ws`]        – `AsyncRead`/`AsyncWrite` adapters over the two halves of a
//!   WebSocket, plus close-status handling.
//! - [`connector`] – the 4 KiB copy loops: one-way [`pump`](connector::pump),
//!   one-way-then-close [`relay`](connector::relay), and the full-duplex
//!   first-to-finish [`bridge`](connector::bridge).

pub mod connector;
pub mod ws;

pub use connector::{bridge, pump, relay, CHUNK_SIZE};
pub use ws::{split_ws, CloseStatus, WsCloser, WsReader, WsWriter};
