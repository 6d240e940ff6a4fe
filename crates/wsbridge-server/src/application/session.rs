//! Requester and device sessions.
//!
//! # Requester (`/bridge/connect`)
//!
//! 1. Hand the requester's writer to the bridge, get a token.
//! 2. Notify the device with the accept URL.
//! 3. Wait for the device (bounded by the accept timeout, shutdown and the
//!    requester hanging up).
//! 4. Relay requester → device until the requester closes.
//!
//! # Device (`/bridge/accept`)
//!
//! 1. Hand the device's writer to the bridge, get the requester's writer.
//! 2. Relay device → requester until the device closes.
//!
//! Each side copies one direction; together they form the tunnel.  Whatever
//! happens, each session closes its own socket with a status describing the
//! outcome and cancels the bridge on the way out.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use wsbridge_core::transport::relay;
use wsbridge_core::{BridgeError, CloseStatus, StreamBridge, WsCloser, WsReader, WsWriter};

use super::api_key::ApiKeyValidator;
use super::notifier::{NotifyError, RequestBridgeNotifier};
use crate::domain::{accept_url, BridgeRequestData};

/// Shared state for every session on this broker.
pub struct BrokerContext {
    pub bridge: StreamBridge<WsWriter>,
    pub notifier: Arc<dyn RequestBridgeNotifier>,
    pub api_keys: ApiKeyValidator,
    pub external_url: Url,
    pub accept_timeout: Duration,
    /// Fired on broker shutdown; aborts every pending wait.
    pub shutdown: CancellationToken,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("device '{0}' refused the bridge")]
    DeviceRefused(String),

    #[error("device did not connect within {0:?}")]
    AcceptTimeout(Duration),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("requester disconnected before the device connected")]
    RequesterDisconnected,
}

impl SessionError {
    /// Close status for the socket of the session that failed.
    pub fn close_status(&self) -> CloseStatus {
        match self {
            SessionError::Bridge(e) => CloseStatus::for_error(e),
            SessionError::DeviceRefused(_) => CloseStatus::DEVICE_REFUSED,
            SessionError::AcceptTimeout(_) => CloseStatus::WAIT_TIMEOUT,
            SessionError::Notify(_) => CloseStatus::EXCEPTION,
            SessionError::RequesterDisconnected => CloseStatus::GOING_AWAY,
        }
    }
}

/// Runs a requester session to completion.  Returns the bytes relayed from
/// the requester to the device.
pub async fn serve_requester(
    ctx: &BrokerContext,
    device_id: &str,
    request_data: Option<String>,
    reader: WsReader,
    writer: WsWriter,
) -> Result<u64, SessionError> {
    let own = writer.closer();

    let token = match ctx.bridge.request_bridge(writer).await {
        Ok(token) => token,
        Err(rejected) => {
            let error = SessionError::from(rejected.into_error());
            warn!("bridge to device '{device_id}' could not be registered: {error}");
            close_quietly(&own, error.close_status()).await;
            return Err(error);
        }
    };
    debug!("bridge to device '{device_id}' has token '{token}'");

    let result = requester_exchange(ctx, &token, device_id, request_data, reader).await;

    match &result {
        Ok(_) => {
            close_quietly(&own, CloseStatus::OK).await;
            debug!("bridge to device '{device_id}' with token '{token}' is closed");
        }
        Err(e) => {
            warn!("bridge to device '{device_id}' with token '{token}' terminated: {e}");
            close_quietly(&own, e.close_status()).await;
        }
    }
    ctx.bridge.cancel(&token);
    result
}

async fn requester_exchange(
    ctx: &BrokerContext,
    token: &str,
    device_id: &str,
    request_data: Option<String>,
    mut reader: WsReader,
) -> Result<u64, SessionError> {
    let request = BridgeRequestData {
        accept_url: accept_url(&ctx.external_url, token).to_string(),
        request_data,
    };
    if !ctx.notifier.request_bridge(device_id, &request).await? {
        return Err(SessionError::DeviceRefused(device_id.to_string()));
    }
    debug!("bridge with token '{token}' accepted by device '{device_id}', waiting for it to connect");

    let waiting = ctx.shutdown.child_token();
    let wait = async {
        tokio::select! {
            device = ctx.bridge.wait_for_device_stream(token, &waiting) => {
                device.map_err(SessionError::from)
            }
            () = requester_hangup(&mut reader) => {
                waiting.cancel();
                Err(SessionError::RequesterDisconnected)
            }
        }
    };
    let device = tokio::time::timeout(ctx.accept_timeout, wait)
        .await
        .map_err(|_| SessionError::AcceptTimeout(ctx.accept_timeout))??;
    debug!("bridge with token '{token}' established");

    Ok(relay(reader, device).await?)
}

/// Resolves once the requester's socket has ended.
///
/// A payload sent before the device arrived stays buffered in `reader` for the
/// relay; from then on a hangup is left for the relay to notice.
async fn requester_hangup(reader: &mut WsReader) {
    match reader.ready().await {
        Ok(true) => std::future::pending().await,
        Ok(false) => debug!("requester hung up while waiting for the device"),
        Err(e) => debug!("requester socket failed while waiting for the device: {e}"),
    }
}

/// Runs a device session to completion.  Returns the bytes relayed from the
/// device to the requester.
pub async fn serve_device(
    ctx: &BrokerContext,
    token: &str,
    reader: WsReader,
    writer: WsWriter,
) -> Result<u64, SessionError> {
    let own = writer.closer();
    debug!("bridge token '{token}' received from device");

    let result = match ctx.bridge.accept(token, writer).await {
        Ok(requester) => {
            debug!("bridge token '{token}' accepted");
            relay(reader, requester).await.map_err(SessionError::from)
        }
        Err(rejected) => Err(SessionError::from(rejected.into_error())),
    };

    match &result {
        Ok(_) => {
            close_quietly(&own, CloseStatus::OK).await;
            debug!("bridge with token '{token}' is closed");
        }
        Err(e) => {
            warn!("bridge with token '{token}' terminated on device side: {e}");
            close_quietly(&own, e.close_status()).await;
        }
    }
    ctx.bridge.cancel(token);
    result
}

async fn close_quietly(closer: &WsCloser, status: CloseStatus) {
    if let Err(e) = closer.close(status).await {
        debug!("closing socket failed: {e}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
