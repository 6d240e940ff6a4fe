//! The broker's wire vocabulary: routes, query parameters and the device
//! notification payload.
//!
//! | Endpoint                                        | Caller    | Auth        |
//! |-------------------------------------------------|-----------|-------------|
//! | `GET /bridge/connect?deviceId=..&requestData=..`| requester | `X-Api-Key` |
//! | `GET /bridge/accept?bridgeToken=..`             | device    | the token   |
//!
//! Both are WebSocket upgrades.  Paths are matched case-insensitively.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;
use url::Url;

/// Header carrying the requester's API key.
pub const API_KEY_HEADER: &str = "X-Api-Key";

pub const CONNECT_PATH: &str = "/bridge/connect";
pub const ACCEPT_PATH: &str = "/bridge/accept";

/// A parsed upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A requester asks for a tunnel to `device_id`.
    Connect {
        device_id: String,
        request_data: Option<String>,
    },
    /// A device answers a notification.
    Accept { bridge_token: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no such endpoint: {0}")]
    NotFound(String),
    #[error("missing query parameter '{0}'")]
    MissingParameter(&'static str),
}

impl Route {
    /// Parses a request target such as `/bridge/accept?bridgeToken=abc`.
    pub fn parse(path_and_query: &str) -> Result<Self, RouteError> {
        let (path, query) = path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""));
        let normalized = path.trim_end_matches('/');

        if normalized.eq_ignore_ascii_case(CONNECT_PATH) {
            let device_id = query_param(query, "deviceId")
                .filter(|id| !id.is_empty())
                .ok_or(RouteError::MissingParameter("deviceId"))?;
            Ok(Route::Connect {
                device_id,
                request_data: query_param(query, "requestData"),
            })
        } else if normalized.eq_ignore_ascii_case(ACCEPT_PATH) {
            let bridge_token = query_param(query, "bridgeToken")
                .filter(|token| !token.is_empty())
                .ok_or(RouteError::MissingParameter("bridgeToken"))?;
            Ok(Route::Accept { bridge_token })
        } else {
            Err(RouteError::NotFound(path.to_string()))
        }
    }

    /// Returns `true` for routes that require an API key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Route::Connect { .. })
    }
}

/// First value of `name` in a URL-encoded query string.
fn query_param(query: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Builds the URL a device dials to accept `token`:
/// `{external_url}/bridge/accept?bridgeToken={token}`.
pub fn accept_url(external_url: &Url, token: &str) -> Url {
    let mut url = external_url.clone();
    let base_path = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base_path}{ACCEPT_PATH}"));
    url.query_pairs_mut()
        .clear()
        .append_pair("bridgeToken", token);
    url
}

/// JSON body sent to a device's notification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequestData {
    pub accept_url: String,
    pub request_data: Option<String>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connect_with_request_data() {
        let route = Route::parse("/bridge/connect?deviceId=dev%2F1&requestData=port%3D22").unwrap();
        assert_eq!(
            route,
            Route::Connect {
                device_id: "dev/1".to_string(),
                request_data: Some("port=22".to_string()),
            }
        );
        assert!(route.requires_api_key());
    }

    #[test]
    fn test_parse_connect_without_request_data() {
        let route = Route::parse("/bridge/connect?deviceId=abc").unwrap();
        assert!(matches!(route, Route::Connect { request_data: None, .. }));
    }

    #[test]
    fn test_parse_connect_requires_device_id() {
        assert_eq!(
            Route::parse("/bridge/connect?requestData=x"),
            Err(RouteError::MissingParameter("deviceId"))
        );
        assert_eq!(
            Route::parse("/bridge/connect?deviceId="),
            Err(RouteError::MissingParameter("deviceId"))
        );
    }

    #[test]
    fn test_parse_accept_is_case_insensitive() {
        let route = Route::parse("/Bridge/Accept/?bridgeToken=tok_-123").unwrap();
        assert_eq!(
            route,
            Route::Accept {
                bridge_token: "tok_-123".to_string()
            }
        );
        assert!(!route.requires_api_key());
    }

    #[test]
    fn test_parse_accept_requires_token() {
        assert_eq!(
            Route::parse("/bridge/accept"),
            Err(RouteError::MissingParameter("bridgeToken"))
        );
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        assert!(matches!(
            Route::parse("/bridge/connectSigned?deviceId=x"),
            Err(RouteError::NotFound(_))
        ));
    }

    #[test]
    fn test_accept_url_keeps_base_path_and_encodes_token() {
        // Arrange
        let external = Url::parse("wss://bridge.example.com/tunnels").unwrap();

        // Act
        let url = accept_url(&external, "a+b/c");

        // Assert
        assert_eq!(
            url.as_str(),
            "wss://bridge.example.com/tunnels/bridge/accept?bridgeToken=a%2Bb%2Fc"
        );
    }

    #[test]
    fn test_accept_url_round_trips_through_route_parsing() {
        let external = Url::parse("ws://localhost:8080").unwrap();
        let url = accept_url(&external, "Zm9v_YmFy-");

        let target = format!("{}?{}", url.path(), url.query().unwrap_or(""));

        assert_eq!(
            Route::parse(&target).unwrap(),
            Route::Accept {
                bridge_token: "Zm9v_YmFy-".to_string()
            }
        );
    }

    #[test]
    fn test_notification_payload_uses_camel_case() {
        let payload = BridgeRequestData {
            accept_url: "ws://x/bridge/accept?bridgeToken=t".to_string(),
            request_data: Some("hello".to_string()),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["acceptUrl"], "ws://x/bridge/accept?bridgeToken=t");
        assert_eq!(json["requestData"], "hello");
    }
}
