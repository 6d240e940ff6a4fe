//! BridgeRegistry: the in-memory table of pending bridges.
//!
//! Each entry is one [`PendingBridge`]: the requester's stream, a one-shot slot
//! for the device's stream, and the bridge's lifecycle state.
//!
//! # Bridge lifecycle
//!
//! ```text
//!             insert                accept
//!  (none) ───────────► Pending ───────────► Established
//!                         │                      │
//!                         │ cancel               │ cancel
//!                         ▼                      ▼
//!                      Canceled ◄────────────────┘   (entry removed)
//! ```
//!
//! - `insert` is the only way in; a token that is already present is refused.
//! - `accept` moves `Pending → Established` exactly once.  The device stream is
//!   handed to the waiter through a one-shot channel and the requester stream
//!   is returned to the caller.  A second `accept` observes `Established` and
//!   fails with [`BridgeError::AlreadyAccepted`].
//! - `cancel` is the only way out.  Neither `accept` nor a completed wait
//!   removes the entry; the session that created the bridge always cancels it
//!   when it ends, whatever the outcome.
//!
//! # Concurrency
//!
//! The table lock is held only for the map operation itself (insert, clone of
//! the entry's `Arc`, remove).  State transitions happen under the entry's own
//! lock, so unrelated bridges never contend beyond a map lookup, and two racing
//! `accept` calls on the same token are serialized: one wins, the other sees
//! `Established`.
//!
//! The registry is generic over the stream type `S` so the rendezvous logic can
//! be exercised with plain values in tests.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{BridgeError, Rejected};

/// Lifecycle state of one bridge.
enum Slot<S> {
    /// Waiting for the device.  Owns the requester's stream and the sending
    /// side of the device-stream slot.
    Pending {
        requester: S,
        device_tx: oneshot::Sender<S>,
    },
    /// The device has been accepted; both streams have changed hands.
    Established,
    /// Removed from the table by `cancel`.
    Canceled,
}

/// Server-side state for exactly one bridge token.
struct PendingBridge<S> {
    slot: Mutex<Slot<S>>,
    /// Receiving side of the device-stream slot.  Behind an async mutex so an
    /// aborted wait leaves the receiver in place for a later wait.
    device_rx: tokio::sync::Mutex<Option<oneshot::Receiver<S>>>,
}

/// Concurrent table of pending bridges keyed by bridge token.
pub struct BridgeRegistry<S> {
    bridges: RwLock<HashMap<String, Arc<PendingBridge<S>>>>,
}

impl<S: Send + 'static> BridgeRegistry<S> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            bridges: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new pending bridge holding `requester` under `token`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DuplicateToken`] (with the stream handed back) if
    /// a bridge with this token already exists.
    pub fn insert(&self, token: String, requester: S) -> Result<(), Rejected<S>> {
        let (device_tx, device_rx) = oneshot::channel();
        let mut bridges = self.bridges.write();
        match bridges.entry(token) {
            Entry::Occupied(_) => Err(Rejected::new(BridgeError::DuplicateToken, requester)),
            Entry::Vacant(vacant) => {
                debug!("bridge {} pending", vacant.key());
                vacant.insert(Arc::new(PendingBridge {
                    slot: Mutex::new(Slot::Pending {
                        requester,
                        device_tx,
                    }),
                    device_rx: tokio::sync::Mutex::new(Some(device_rx)),
                }));
                Ok(())
            }
        }
    }

    /// Suspends until the device stream for `token` arrives.
    ///
    /// Firing `cancel` aborts only this wait; the bridge stays registered until
    /// [`cancel`](Self::cancel) is called.  Exactly one waiter per bridge is
    /// expected; concurrent waiters are served one after another.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UnknownToken`] if no bridge exists for `token`.
    /// - [`BridgeError::OperationCanceled`] if `cancel` fires or the bridge is
    ///   canceled while waiting.
    /// - [`BridgeError::AlreadyAccepted`] if the device stream was already
    ///   handed to an earlier waiter.
    pub async fn wait_for_device_stream(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<S, BridgeError> {
        let bridge = self.lookup(token).ok_or(BridgeError::UnknownToken)?;
        let mut receiver = bridge.device_rx.lock().await;

        let outcome = match receiver.as_mut() {
            None => return Err(BridgeError::AlreadyAccepted),
            Some(device_rx) => tokio::select! {
                biased;
                received = device_rx => Some(received),
                _ = cancel.cancelled() => None,
            },
        };

        match outcome {
            Some(Ok(device)) => {
                *receiver = None;
                debug!("bridge {token}: device stream delivered to requester");
                Ok(device)
            }
            // The sender was dropped: the bridge was canceled.
            Some(Err(_)) => {
                *receiver = None;
                Err(BridgeError::OperationCanceled)
            }
            None => {
                debug!("bridge {token}: wait aborted by caller");
                Err(BridgeError::OperationCanceled)
            }
        }
    }

    /// Completes the rendezvous: stores `device` for the waiter and returns
    /// the requester's stream.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UnknownToken`] if no bridge exists (or it was canceled).
    /// - [`BridgeError::AlreadyAccepted`] if the bridge was already accepted.
    ///
    /// The device stream is handed back inside the [`Rejected`] in both cases.
    pub fn accept(&self, token: &str, device: S) -> Result<S, Rejected<S>> {
        let Some(bridge) = self.lookup(token) else {
            return Err(Rejected::new(BridgeError::UnknownToken, device));
        };

        let mut slot = bridge.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Established) {
            Slot::Pending {
                requester,
                device_tx,
            } => match device_tx.send(device) {
                Ok(()) => {
                    debug!("bridge {token} established");
                    Ok(requester)
                }
                // The receiver lives as long as the entry, so this only happens
                // if the bridge is being torn down concurrently.
                Err(device) => Err(Rejected::new(BridgeError::OperationCanceled, device)),
            },
            Slot::Established => Err(Rejected::new(BridgeError::AlreadyAccepted, device)),
            Slot::Canceled => {
                *slot = Slot::Canceled;
                Err(Rejected::new(BridgeError::UnknownToken, device))
            }
        }
    }

    /// Removes the bridge and wakes any waiter with
    /// [`BridgeError::OperationCanceled`].
    ///
    /// Idempotent: unknown or already-canceled tokens are ignored.
    pub fn cancel(&self, token: &str) {
        let Some(bridge) = self.bridges.write().remove(token) else {
            return;
        };

        // Dropping the previous state releases the requester stream and the
        // device sender, which resolves a pending wait.
        let previous = std::mem::replace(&mut *bridge.slot.lock(), Slot::Canceled);
        drop(previous);
        debug!("bridge {token} canceled");
    }

    /// Returns `true` if a bridge is registered under `token`.
    pub fn contains(&self, token: &str) -> bool {
        self.bridges.read().contains_key(token)
    }

    /// Number of registered bridges.
    pub fn len(&self) -> usize {
        self.bridges.read().len()
    }

    /// Returns `true` when no bridges are registered.
    pub fn is_empty(&self) -> bool {
        self.bridges.read().is_empty()
    }

    fn lookup(&self, token: &str) -> Option<Arc<PendingBridge<S>>> {
        self.bridges.read().get(token).cloned()
    }
}

impl<S: Send + 'static> Default for BridgeRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
