//! Bridge token codecs.
//!
//! A bridge token is an opaque, URL-safe string that names exactly one
//! pending bridge.  Two strategies exist:
//!
//! - [`RandomTokenGenerator`] – random bytes, base64url.  Carries no
//!   information; used when a single node holds every bridge.
//! - [`routing`] – `IV || AES-256-GCM(key, IV, node URI)`, base64url.  Lets any
//!   node in a cluster find the node holding the requester's stream without a
//!   shared registry.
//!
//! Both encodings use the URL-safe base64 alphabet without `=` padding, so a
//! token can be dropped into a query string as-is.

pub mod random;
pub mod routing;

pub use random::{RandomTokenGenerator, DEFAULT_TOKEN_SIZE};
pub use routing::{decode_routing_token, encode_routing_token, ROUTING_IV_LEN};
