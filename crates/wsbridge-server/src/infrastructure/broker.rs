//! Wiring: validated configuration in, broker context out.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use wsbridge_core::{BridgeError, NodeRouter, RandomTokenGenerator, StaticKeyProvider, StreamBridge};

use super::notifier::{LoggingNotifier, WebhookNotifier};
use super::peer_proxy::WsForwardingProxy;
use crate::application::{ApiKeyValidator, BrokerContext, RequestBridgeNotifier};
use crate::domain::{BridgeMode, ServerConfig};

/// Builds the shared broker state for `config`.
///
/// The deployment mode is fixed here for the lifetime of the process.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidTokenSize`] for a zero token size.
pub fn build_context(
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> Result<BrokerContext, BridgeError> {
    let bridge = match &config.mode {
        BridgeMode::SingleNode => {
            info!("single-node mode, {}-byte random tokens", config.token_size);
            StreamBridge::single_node(RandomTokenGenerator::new(config.token_size)?)
        }
        BridgeMode::MultiNode { node_uri, key } => {
            info!("multi-node mode, this node is {node_uri}");
            let keys = Arc::new(StaticKeyProvider::new(key.clone()));
            StreamBridge::multi_node(
                NodeRouter::new(node_uri.clone(), keys),
                Arc::new(WsForwardingProxy::new()),
            )
        }
    };

    let notifier: Arc<dyn RequestBridgeNotifier> = match &config.webhook_url {
        Some(url) => {
            info!("device notifications go to webhook {url}");
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => {
            info!("no webhook configured; bridge requests are only logged");
            Arc::new(LoggingNotifier)
        }
    };

    let api_keys = ApiKeyValidator::new(config.api_keys.clone());
    if api_keys.is_empty() {
        tracing::warn!("no API keys configured; every /bridge/connect will be rejected");
    }

    Ok(BrokerContext {
        bridge,
        notifier,
        api_keys,
        external_url: config.external_url.clone(),
        accept_timeout: config.accept_timeout,
        shutdown,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
