//! WebSocket bridge broker entry point.
//!
//! Pairs requesters with devices that cannot accept inbound connections.
//!
//! # Usage
//!
//! ```text
//! wsbridge-server [OPTIONS]
//!
//! Options:
//!   --bind <ADDR>               Listen address [default: 0.0.0.0:8080]
//!   --external-url <URL>        ws(s) URL devices use to reach this broker
//!   --api-key <KEY>             Accepted requester key (repeatable)
//!   --webhook-url <URL>         Device notification endpoint
//!   --accept-timeout <SECS>     How long a requester waits for the device
//!   --token-size <BYTES>        Random token length (single-node mode)
//!   --encryption-key <BASE64>   Cluster key; enables multi-node mode
//!   --local-ip-variable <NAME>  Variable holding this node's IP [default: LOCAL_IP]
//!   --node-uri <URL>            Explicit ws URL of this node
//!   --config <FILE>             TOML settings file
//!   --debug                     Debug logging unless RUST_LOG is set
//! ```
//!
//! # Environment variable overrides
//!
//! Every option can also be set with a `WSBRIDGE_*` variable.  CLI args take
//! precedence, then environment, then the TOML file, then built-in defaults.
//!
//! | Variable                    | Description                          |
//! |-----------------------------|--------------------------------------|
//! | `WSBRIDGE_BIND`             | Listen address                       |
//! | `WSBRIDGE_EXTERNAL_URL`     | Public ws(s) URL                     |
//! | `WSBRIDGE_API_KEYS`         | Comma-separated requester keys       |
//! | `WSBRIDGE_WEBHOOK_URL`      | Device notification endpoint         |
//! | `WSBRIDGE_ACCEPT_TIMEOUT`   | Device wait in seconds               |
//! | `WSBRIDGE_TOKEN_SIZE`       | Random token length in bytes         |
//! | `WSBRIDGE_ENCRYPTION_KEY`   | Cluster key (base64, 32 bytes)       |
//! | `WSBRIDGE_LOCAL_IP_VARIABLE`| Name of the node IP variable         |
//! | `WSBRIDGE_NODE_URI`         | Explicit node URL                    |
//! | `WSBRIDGE_CONFIG`           | TOML settings file                   |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wsbridge_server::domain::{BridgeMode, ServerConfig, Settings};
use wsbridge_server::infrastructure::{build_context, run_server};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket bridge broker.
#[derive(Debug, Parser)]
#[command(
    name = "wsbridge-server",
    about = "Rendezvous broker that bridges requesters to devices over WebSocket",
    version
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "WSBRIDGE_BIND")]
    bind: Option<SocketAddr>,

    /// Public ws:// or wss:// URL of this broker, used to build accept URLs.
    #[arg(long, env = "WSBRIDGE_EXTERNAL_URL")]
    external_url: Option<String>,

    /// API key accepted on /bridge/connect.
    #[arg(long = "api-key", env = "WSBRIDGE_API_KEYS", value_delimiter = ',')]
    api_keys: Vec<String>,

    /// Endpoint that receives `POST {url}/{deviceId}` bridge requests.
    #[arg(long, env = "WSBRIDGE_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Seconds a requester waits for the device to connect.
    #[arg(long = "accept-timeout", env = "WSBRIDGE_ACCEPT_TIMEOUT")]
    accept_timeout_secs: Option<u64>,

    /// Random bridge token length in bytes (single-node mode).
    #[arg(long, env = "WSBRIDGE_TOKEN_SIZE")]
    token_size: Option<usize>,

    /// Base64 256-bit cluster key.  Its presence selects multi-node mode.
    #[arg(long, env = "WSBRIDGE_ENCRYPTION_KEY", hide_env_values = true)]
    encryption_key: Option<String>,

    /// Environment variable that holds this node's IP address.
    #[arg(long, env = "WSBRIDGE_LOCAL_IP_VARIABLE")]
    local_ip_variable: Option<String>,

    /// Explicit ws:// URL peers use to reach this node.
    #[arg(long, env = "WSBRIDGE_NODE_URI")]
    node_uri: Option<String>,

    /// TOML settings file.
    #[arg(long, env = "WSBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Default the log level to debug instead of info.
    #[arg(long)]
    debug: bool,
}

impl Cli {
    /// Settings given on the command line or in the environment.
    fn to_settings(&self) -> Settings {
        Settings {
            bind: self.bind,
            external_url: self.external_url.clone(),
            api_keys: (!self.api_keys.is_empty()).then(|| self.api_keys.clone()),
            webhook_url: self.webhook_url.clone(),
            accept_timeout_secs: self.accept_timeout_secs,
            token_size: self.token_size,
            encryption_key: self.encryption_key.clone(),
            node_uri: self.node_uri.clone(),
            local_ip_variable: self.local_ip_variable.clone(),
        }
    }

    /// Merges CLI settings over the optional file and validates the result.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let file = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        let settings = self.to_settings().or(file);
        ServerConfig::from_settings(settings, |name| std::env::var(name).ok())
            .context("invalid broker configuration")
    }
}

fn default_log_level(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_level(cli.debug))),
        )
        .init();

    let config = cli.into_server_config()?;
    info!(
        "WebSocket bridge starting: bind={}, external={}, timeout={:?}",
        config.bind_addr, config.external_url, config.accept_timeout
    );
    if let BridgeMode::MultiNode { node_uri, .. } = &config.mode {
        info!("node URI resolved to {node_uri}");
    }

    let shutdown = CancellationToken::new();
    let ctx = Arc::new(build_context(&config, shutdown.clone()).context("failed to build broker")?);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                shutdown.cancel();
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_server(ctx, config.bind_addr).await?;

    info!("WebSocket bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
