//! Requester and device connections to the broker.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::error::ClientError;

/// Header carrying the requester's API key.
pub const API_KEY_HEADER: &str = "X-Api-Key";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A connected tunnel end.
pub type BridgeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Requests tunnels to devices.
#[derive(Clone)]
pub struct BridgeClient {
    broker_url: Url,
    api_key: String,
    connect_timeout: Duration,
}

impl BridgeClient {
    /// `broker_url` is the broker's ws:// or wss:// base URL.
    pub fn new(broker_url: Url, api_key: impl Into<String>) -> Result<Self, ClientError> {
        require_ws_scheme(&broker_url)?;
        Ok(Self {
            broker_url,
            api_key: api_key.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Bounds the handshake.  The broker upgrades the socket straight away
    /// and waits for the device afterwards, so this does not need to cover
    /// the broker's accept timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `{broker}/bridge/connect?deviceId=..[&requestData=..]`
    pub fn connect_url(&self, device_id: &str, request_data: Option<&str>) -> Url {
        let mut url = self.broker_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}/bridge/connect"));
        {
            let mut query = url.query_pairs_mut();
            query.clear().append_pair("deviceId", device_id);
            if let Some(data) = request_data {
                query.append_pair("requestData", data);
            }
        }
        url
    }

    /// Opens a tunnel to `device_id`.
    ///
    /// The returned socket carries the device's bytes once the device has
    /// accepted; if it never does, the broker closes the socket with 4403 or
    /// 4408.
    pub async fn tunnel(
        &self,
        device_id: &str,
        request_data: Option<&str>,
    ) -> Result<BridgeStream, ClientError> {
        let url = self.connect_url(device_id, request_data);
        let mut request = url.as_str().into_client_request()?;
        let key = HeaderValue::from_str(&self.api_key).map_err(|_| ClientError::InvalidApiKey)?;
        request.headers_mut().insert(API_KEY_HEADER, key);

        debug!("requesting tunnel to device '{device_id}' via {}", self.broker_url);
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| ClientError::Timeout(self.connect_timeout))?
            .map_err(ClientError::from_handshake)?;
        Ok(ws)
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("broker_url", &self.broker_url.as_str())
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// Answers bridge requests on the device side.
#[derive(Debug, Clone)]
pub struct BridgeAcceptor {
    connect_timeout: Duration,
}

impl Default for BridgeAcceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeAcceptor {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Dials the accept URL from a bridge notification.
    ///
    /// A stale or foreign token is not a handshake error: the socket opens
    /// and is closed by the broker with 4404.
    pub async fn accept(&self, accept_url: &Url) -> Result<BridgeStream, ClientError> {
        require_ws_scheme(accept_url)?;
        debug!("accepting bridge at {}", accept_url.path());
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(accept_url.as_str()))
            .await
            .map_err(|_| ClientError::Timeout(self.connect_timeout))?
            .map_err(ClientError::from_handshake)?;
        Ok(ws)
    }
}

fn require_ws_scheme(url: &Url) -> Result<(), ClientError> {
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ClientError::InvalidUrl(format!(
            "scheme must be ws or wss, got '{other}'"
        ))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
