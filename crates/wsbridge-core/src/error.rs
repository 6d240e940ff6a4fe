//! Error taxonomy for bridge operations.
//!
//! Every operation on the rendezvous engine reports failure through
//! [`BridgeError`].  "Not found", "duplicate" and "canceled" are ordinary
//! outcomes of a bridge's lifecycle, so they are distinct variants here rather
//! than panics or stringly-typed errors.  Cancellation in particular is never
//! conflated with a transport failure.
//!
//! # Returning ownership on failure
//!
//! Several operations take ownership of a stream (the requester's or the
//! device's write half).  When such an operation fails, the caller still needs
//! the stream so it can close the underlying socket with a meaningful status.
//! [`Rejected`] carries the error *and* the stream back, the same way
//! `std::sync::mpsc::SendError<T>` hands back the value that could not be sent.

use std::fmt;

use thiserror::Error;

/// Errors produced by the bridge registry, token codecs, router and pumps.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No pending bridge exists for the token (never requested, or already
    /// canceled).
    #[error("unknown bridge token")]
    UnknownToken,

    /// A pending bridge already exists for a freshly minted token.
    ///
    /// With 20 random bytes or a random 16-byte IV this cannot happen under a
    /// working random source; it signals a broken configuration.
    #[error("duplicate bridge token")]
    DuplicateToken,

    /// The device side of this bridge has already been accepted.
    #[error("bridge has already been accepted")]
    AlreadyAccepted,

    /// The wait for the device stream was aborted, either by the waiter's own
    /// cancellation signal or because the bridge itself was canceled.
    #[error("operation canceled")]
    OperationCanceled,

    /// A routing token could not be decoded (malformed, truncated, tampered,
    /// encrypted under another key), or it decodes to this node but the bridge
    /// is not held here.
    ///
    /// All of these cases share one variant so a caller cannot tell a
    /// malformed token from a foreign one.
    #[error("invalid bridge token")]
    InvalidToken,

    /// The node owning the bridge could not be reached for forwarding.
    #[error("peer node {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    /// An I/O error while moving bytes across a bridge.
    #[error("transport failure: {0}")]
    TransportFailure(#[from] std::io::Error),

    /// The cluster encryption key could not be obtained or is malformed.
    #[error("encryption key unavailable: {0}")]
    KeyUnavailable(String),

    /// A random token size of zero bytes was requested.
    #[error("token size must be at least one byte, got {0}")]
    InvalidTokenSize(usize),
}

/// A failed operation that hands back the stream it was given.
///
/// ```rust
/// use wsbridge_core::{BridgeError, Rejected};
///
/// let rejected = Rejected::new(BridgeError::UnknownToken, "device-stream");
/// assert!(matches!(rejected.error(), BridgeError::UnknownToken));
/// let (_error, stream) = rejected.into_parts();
/// assert_eq!(stream, "device-stream");
/// ```
pub struct Rejected<S> {
    error: BridgeError,
    stream: S,
}

impl<S> Rejected<S> {
    /// Pairs an error with the stream that the failed operation received.
    pub fn new(error: BridgeError, stream: S) -> Self {
        Self { error, stream }
    }

    /// The reason the operation failed.
    pub fn error(&self) -> &BridgeError {
        &self.error
    }

    /// Discards the stream and keeps only the error.
    pub fn into_error(self) -> BridgeError {
        self.error
    }

    /// Splits into the error and the returned stream.
    pub fn into_parts(self) -> (BridgeError, S) {
        (self.error, self.stream)
    }
}

// Streams are rarely `Debug`; only the error is shown.
impl<S> fmt::Debug for Rejected<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<S> fmt::Display for Rejected<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<S> std::error::Error for Rejected<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
