//! NodeIdentity: the externally reachable URI of this broker process.
//!
//! Peers dial this URI to forward a device's accept to the node holding the
//! requester.  It is resolved once at startup and never changes.

use std::net::IpAddr;

use url::Url;

use super::config::ConfigError;

/// Environment variable consulted for this node's IP when no explicit node URI
/// is configured.
pub const DEFAULT_LOCAL_IP_VARIABLE: &str = "LOCAL_IP";

/// IP used when the local IP variable is unset.
pub const DEFAULT_LOCAL_IP: &str = "127.0.0.1";

/// Resolves this node's URI.
///
/// An explicit URI wins.  Otherwise the URI is `ws://{local_ip}:{port}`, with
/// `local_ip` being the value of the local IP variable (already looked up by
/// the caller) or [`DEFAULT_LOCAL_IP`].
///
/// # Errors
///
/// [`ConfigError::InvalidValue`] if the explicit URI or the resulting URI does
/// not parse, or the explicit URI is not `ws`/`wss`.
pub fn resolve_node_uri(
    explicit: Option<&str>,
    local_ip: Option<&str>,
    port: u16,
) -> Result<Url, ConfigError> {
    if let Some(explicit) = explicit {
        let uri = Url::parse(explicit).map_err(|e| ConfigError::invalid("node_uri", e))?;
        if !matches!(uri.scheme(), "ws" | "wss") {
            return Err(ConfigError::invalid(
                "node_uri",
                format!("scheme must be ws or wss, got '{}'", uri.scheme()),
            ));
        }
        return Ok(uri);
    }

    let ip = local_ip
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(DEFAULT_LOCAL_IP);
    // IPv6 literals need brackets in a URI authority.
    let host = match ip.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{v6}]"),
        _ => ip.to_string(),
    };
    Url::parse(&format!("ws://{host}:{port}")).map_err(|e| ConfigError::invalid("local_ip", e))
}
