//! wsbridge-client entry point.
//!
//! # Usage
//!
//! ```text
//! # Requester: expose a remote device's service on a local port
//! wsbridge-client tunnel --broker ws://broker:8080 --api-key KEY \
//!     --device-id rack-7 --request-data ssh --listen 127.0.0.1:2222
//!
//! # Device: answer an accept URL by connecting it to a local service
//! wsbridge-client accept --url 'ws://broker:8080/bridge/accept?bridgeToken=..' \
//!     --target 127.0.0.1:22
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::{TcpListener, TcpStream};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use wsbridge_client::{BridgeAcceptor, BridgeClient};
use wsbridge_core::transport::bridge;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "wsbridge-client",
    about = "Requester and device ends of a WebSocket bridge",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Default the log level to debug instead of info.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Request a tunnel to a device and serve it on a local port.
    Tunnel {
        /// Broker base URL (ws:// or wss://).
        #[arg(long, env = "WSBRIDGE_BROKER_URL")]
        broker: Url,

        /// API key sent as X-Api-Key.
        #[arg(long, env = "WSBRIDGE_API_KEY", hide_env_values = true)]
        api_key: String,

        #[arg(long)]
        device_id: String,

        /// Opaque data passed to the device with the request.
        #[arg(long)]
        request_data: Option<String>,

        /// Local address; the first connection on it is bridged.
        #[arg(long)]
        listen: SocketAddr,

        /// Seconds to wait for the broker to answer.
        #[arg(long, default_value_t = 90)]
        connect_timeout: u64,
    },

    /// Accept a bridge and connect it to a local TCP service.
    Accept {
        /// Accept URL received in the bridge notification.
        #[arg(long)]
        url: Url,

        /// Local service to expose through the bridge.
        #[arg(long)]
        target: SocketAddr,
    },
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn run_tunnel(
    client: BridgeClient,
    device_id: &str,
    request_data: Option<&str>,
    listen: SocketAddr,
) -> anyhow::Result<u64> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!("waiting for a local connection on {listen}");
    let (local, peer_addr) = listener.accept().await.context("local accept failed")?;
    info!("local connection from {peer_addr}, requesting tunnel to '{device_id}'");

    let ws = client
        .tunnel(device_id, request_data)
        .await
        .with_context(|| format!("tunnel to device '{device_id}' failed"))?;
    info!("tunnel to '{device_id}' established");

    Ok(bridge(ws, local).await?)
}

async fn run_accept(url: &Url, target: SocketAddr) -> anyhow::Result<u64> {
    let local = TcpStream::connect(target)
        .await
        .with_context(|| format!("failed to connect to target {target}"))?;
    let ws = BridgeAcceptor::new()
        .accept(url)
        .await
        .context("failed to accept bridge")?;
    info!("bridge accepted, relaying to {target}");

    Ok(bridge(ws, local).await?)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let bytes = match cli.command {
        Command::Tunnel {
            broker,
            api_key,
            device_id,
            request_data,
            listen,
            connect_timeout,
        } => {
            let client = BridgeClient::new(broker, api_key)?
                .with_connect_timeout(Duration::from_secs(connect_timeout));
            run_tunnel(client, &device_id, request_data.as_deref(), listen).await?
        }
        Command::Accept { url, target } => run_accept(&url, target).await?,
    };

    info!("bridge closed after {bytes} bytes");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
