//! WebSocket server: accept loop, handshake routing and per-session tasks.
//!
//! 1. Bind a TCP listener.
//! 2. For each connection, run the WebSocket upgrade with a header callback
//!    that parses the route and checks the API key.  Bad requests are
//!    answered with a plain HTTP status (401, 400, 404) and never upgraded.
//! 3. Split the socket and hand it to the requester or device session.
//!
//! Each connection runs in its own Tokio task under a `session` span with a
//! fresh UUID, so interleaved log lines can be told apart.  The loop exits
//! when the broker's shutdown token fires; running sessions see the same
//! token through their pending waits.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;
use wsbridge_core::split_ws;

use crate::application::{serve_device, serve_requester, ApiKeyValidator, BrokerContext};
use crate::domain::{Route, RouteError, API_KEY_HEADER};

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `bind_addr` and serves until `ctx.shutdown` fires.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(ctx: Arc<BrokerContext>, bind_addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind bridge listener on {bind_addr}"))?;

    info!("bridge broker listening on {bind_addr}");
    serve(listener, ctx).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, ctx: Arc<BrokerContext>) {
    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => {
                info!("shutdown requested; stopping accept loop");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    debug!("new connection from {peer_addr}");
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        handle_connection(stream, peer_addr, ctx).await;
                    });
                }
                Err(e) => error!("accept error: {e}"),
            }
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, ctx: Arc<BrokerContext>) {
    let mut route = None;
    let handshake = accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            route = Some(authorize(request, &ctx.api_keys)?);
            Ok(response)
        },
    )
    .await;

    let ws = match handshake {
        Ok(ws) => ws,
        Err(e) => {
            debug!("handshake with {peer_addr} failed: {e}");
            return;
        }
    };
    let Some(route) = route else {
        return;
    };

    let (reader, writer) = split_ws(ws);
    let span = info_span!("session", id = %Uuid::new_v4(), peer = %peer_addr);
    async move {
        let outcome = match route {
            Route::Connect {
                device_id,
                request_data,
            } => {
                info!("requester connected for device '{device_id}'");
                serve_requester(&ctx, &device_id, request_data, reader, writer).await
            }
            Route::Accept { bridge_token } => {
                info!("device connected");
                serve_device(&ctx, &bridge_token, reader, writer).await
            }
        };
        match outcome {
            Ok(bytes) => info!("session closed after relaying {bytes} bytes"),
            Err(e) => info!("session closed: {e}"),
        }
    }
    .instrument(span)
    .await;
}

/// Decides whether an upgrade request may proceed, and where to.
fn authorize(request: &Request, api_keys: &ApiKeyValidator) -> Result<Route, ErrorResponse> {
    let uri = request.uri();
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    let route = Route::parse(target).map_err(|e| {
        let status = match e {
            RouteError::NotFound(_) => StatusCode::NOT_FOUND,
            RouteError::MissingParameter(_) => StatusCode::BAD_REQUEST,
        };
        debug!("rejecting upgrade for '{}': {e}", uri.path());
        reject(status, e.to_string())
    })?;

    if route.requires_api_key() {
        let presented = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());
        if !api_keys.is_valid(presented) {
            warn!("rejecting bridge request with missing or invalid API key");
            return Err(reject(StatusCode::UNAUTHORIZED, "invalid API key".to_string()));
        }
    }
    Ok(route)
}

fn reject(status: StatusCode, message: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message));
    *response.status_mut() = status;
    response
}

// ── Tests ─────────────────────────────────────────────────────────────────────
