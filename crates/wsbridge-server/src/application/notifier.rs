//! RequestBridgeNotifier: telling a device to dial in.
//!
//! The broker does not care how the device is reached, only whether it
//! acknowledged.  The webhook and logging implementations live in
//! `infrastructure::notifier`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::BridgeRequestData;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The notification channel could not be used at all.
    #[error("device notification failed: {0}")]
    Transport(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestBridgeNotifier: Send + Sync {
    /// Sends `request` (accept URL plus the requester's data) to `device_id`.
    ///
    /// Returns `Ok(false)` if the device (or its channel) declined.
    async fn request_bridge(
        &self,
        device_id: &str,
        request: &BridgeRequestData,
    ) -> Result<bool, NotifyError>;
}
