use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid broker URL: {0}")]
    InvalidUrl(String),

    /// The API key contains bytes that are not allowed in an HTTP header.
    #[error("API key is not a valid header value")]
    InvalidApiKey,

    /// The broker answered the upgrade with an HTTP error (401, 400, 404).
    #[error("broker rejected the connection with HTTP {status}")]
    Rejected { status: u16 },

    #[error("connecting to the broker timed out after {0:?}")]
    Timeout(Duration),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

impl ClientError {
    /// Maps a failed handshake, keeping HTTP rejections distinguishable.
    pub(crate) fn from_handshake(error: tungstenite::Error) -> Self {
        match error {
            tungstenite::Error::Http(response) => ClientError::Rejected {
                status: response.status().as_u16(),
            },
            other => ClientError::WebSocket(other),
        }
    }
}
