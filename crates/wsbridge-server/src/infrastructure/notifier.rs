//! Concrete device notifiers.
//!
//! [`WebhookNotifier`] POSTs the bridge request to an HTTP endpoint that knows
//! how to reach the device (push service, device management API, ...).
//! [`LoggingNotifier`] accepts everything and only logs the accept URL; it is
//! the default when no webhook is configured.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::application::{NotifyError, RequestBridgeNotifier};
use crate::domain::BridgeRequestData;

/// Upper bound for one webhook call, including the response.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Notifies devices through `POST {base}/{deviceId}` with a JSON body
/// `{"acceptUrl": .., "requestData": ..}`.  Any 2xx answer means the device
/// accepted.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    base: Url,
}

impl WebhookNotifier {
    pub fn new(base: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base)
    }

    pub fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    /// Endpoint for one device; the id is percent-encoded as a path segment.
    pub fn device_url(&self, device_id: &str) -> Result<Url, NotifyError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| NotifyError::Transport(format!("webhook URL {} cannot take a path", self.base)))?
            .pop_if_empty()
            .push(device_id);
        Ok(url)
    }
}

#[async_trait]
impl RequestBridgeNotifier for WebhookNotifier {
    async fn request_bridge(
        &self,
        device_id: &str,
        request: &BridgeRequestData,
    ) -> Result<bool, NotifyError> {
        let url = self.device_url(device_id)?;
        debug!("notifying device '{device_id}' via {url}");

        let response = self
            .client
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(request)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else {
            warn!("webhook declined bridge request for device '{device_id}': HTTP {status}");
            Ok(false)
        }
    }
}

/// Accepts every request; the accept URL is written to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl RequestBridgeNotifier for LoggingNotifier {
    async fn request_bridge(
        &self,
        device_id: &str,
        request: &BridgeRequestData,
    ) -> Result<bool, NotifyError> {
        info!(
            "bridge requested for device '{device_id}': accept at {}",
            request.accept_url
        );
        Ok(true)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
