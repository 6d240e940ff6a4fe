//! Byte-stream adapters over a split WebSocket.
//!
//! [`split_ws`] turns a `WebSocketStream` into a [`WsReader`] (`AsyncRead`) and
//! a [`WsWriter`] (`AsyncWrite`).  The halves are independently owned so they
//! can travel separately: a participant's handler keeps its reader while its
//! writer is handed to the bridge and ends up with the other participant.
//!
//! A [`WsCloser`] shares the writer's sink.  It lets the handler that gave its
//! writer away still close its own socket with a meaningful status.  Only the
//! first close (from the writer or any closer) sends a Close frame; later ones
//! are no-ops.

use std::borrow::Cow;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures_util::future::poll_fn;
use futures_util::{Sink, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::error::BridgeError;

type MessageStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;
type MessageSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

// ── Close status ──────────────────────────────────────────────────────────────

/// The status code and reason sent in a WebSocket Close frame.
///
/// Clients tell success from failure by the code alone:
///
/// | Code | Meaning                                   |
/// |------|-------------------------------------------|
/// | 1000 | tunnel finished normally                  |
/// | 1001 | broker shutting down / wait canceled      |
/// | 1011 | I/O error while bridging                  |
/// | 4403 | device refused the notification           |
/// | 4404 | unknown or invalid bridge token           |
/// | 4408 | device did not connect in time            |
/// | 4409 | bridge already accepted                   |
/// | 4502 | owning node unreachable                   |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseStatus {
    code: u16,
    reason: Cow<'static, str>,
}

impl CloseStatus {
    pub const OK: Self = Self::fixed(1000, "ok");
    pub const GOING_AWAY: Self = Self::fixed(1001, "canceled");
    pub const EXCEPTION: Self = Self::fixed(1011, "exception");
    pub const DEVICE_REFUSED: Self = Self::fixed(4403, "device refused");
    pub const UNKNOWN_TOKEN: Self = Self::fixed(4404, "unknown bridge token");
    pub const WAIT_TIMEOUT: Self = Self::fixed(4408, "device did not connect");
    pub const ALREADY_ACCEPTED: Self = Self::fixed(4409, "bridge already accepted");
    pub const PEER_UNREACHABLE: Self = Self::fixed(4502, "peer node unreachable");

    const fn fixed(code: u16, reason: &'static str) -> Self {
        Self {
            code,
            reason: Cow::Borrowed(reason),
        }
    }

    pub fn new(code: u16, reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// The close status a socket should get when a bridge operation fails.
    pub fn for_error(error: &BridgeError) -> Self {
        match error {
            BridgeError::UnknownToken | BridgeError::InvalidToken => Self::UNKNOWN_TOKEN,
            BridgeError::AlreadyAccepted => Self::ALREADY_ACCEPTED,
            BridgeError::OperationCanceled => Self::GOING_AWAY,
            BridgeError::PeerUnreachable { .. } => Self::PEER_UNREACHABLE,
            BridgeError::DuplicateToken
            | BridgeError::TransportFailure(_)
            | BridgeError::KeyUnavailable(_)
            | BridgeError::InvalidTokenSize(_) => Self::EXCEPTION,
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns `true` for 1000 (normal closure).
    pub fn is_normal(&self) -> bool {
        self.code == Self::OK.code
    }

    fn to_frame(&self) -> CloseFrame<'static> {
        CloseFrame {
            code: CloseCode::from(self.code),
            reason: self.reason.clone(),
        }
    }

    fn from_frame(frame: &CloseFrame<'_>) -> Self {
        Self::new(u16::from(frame.code), frame.reason.clone().into_owned())
    }
}

impl std::fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

// ── Split ─────────────────────────────────────────────────────────────────────

/// Splits a WebSocket into independently owned byte-stream halves.
pub fn split_ws<T>(ws: WebSocketStream<T>) -> (WsReader, WsWriter)
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split::<Message>();
    (WsReader::new(Box::pin(stream)), WsWriter::new(Box::pin(sink)))
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// `AsyncRead` over the incoming half of a WebSocket.
///
/// Binary and text payloads are concatenated.  Ping/pong frames are skipped
/// (tungstenite answers pings itself).  A Close frame, the end of the stream
/// or a closed connection all read as EOF; the Close frame's status is kept
/// for [`close_status`](Self::close_status).
pub struct WsReader {
    inner: MessageStream,
    buffered: Vec<u8>,
    position: usize,
    finished: bool,
    close_status: Option<CloseStatus>,
}

impl WsReader {
    fn new(inner: MessageStream) -> Self {
        Self {
            inner,
            buffered: Vec::new(),
            position: 0,
            finished: false,
            close_status: None,
        }
    }

    /// The status the remote end sent in its Close frame, once EOF was reached.
    pub fn close_status(&self) -> Option<&CloseStatus> {
        self.close_status.as_ref()
    }

    /// Waits until a payload is buffered or the stream has ended, consuming
    /// nothing.  Returns `false` at EOF.
    pub async fn ready(&mut self) -> io::Result<bool> {
        poll_fn(|cx| self.poll_fill(cx)).await
    }

    fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<bool>> {
        loop {
            if self.position < self.buffered.len() {
                return Poll::Ready(Ok(true));
            }
            if self.finished {
                return Poll::Ready(Ok(false));
            }

            match ready!(self.inner.as_mut().poll_next(cx)) {
                Some(Ok(Message::Binary(data))) => {
                    self.buffered = data;
                    self.position = 0;
                }
                Some(Ok(Message::Text(text))) => {
                    self.buffered = text.into_bytes();
                    self.position = 0;
                }
                Some(Ok(Message::Close(frame))) => {
                    self.close_status = frame.as_ref().map(CloseStatus::from_frame);
                    self.finished = true;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    self.finished = true;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Poll::Ready(Err(io::Error::other(e)));
                }
            }
        }
    }
}

impl AsyncRead for WsReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if ready!(this.poll_fill(cx))? {
            let available = &this.buffered[this.position..];
            let n = available.len().min(buf.remaining());
            buf.put_slice(&available[..n]);
            this.position += n;
        }
        Poll::Ready(Ok(()))
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

struct SinkState {
    sink: MessageSink,
    close_sent: bool,
}

type SharedSink = Arc<Mutex<SinkState>>;

fn closed_is_ok(error: WsError) -> io::Result<()> {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => Ok(()),
        other => Err(io::Error::other(other)),
    }
}

/// Queues a Close frame (once per socket) and drives the sink's close.
///
/// The lock is held only for the duration of one poll.
fn poll_close_with(
    shared: &SharedSink,
    cx: &mut Context<'_>,
    status: &CloseStatus,
) -> Poll<io::Result<()>> {
    let mut state = shared.lock();
    if !state.close_sent {
        if let Err(e) = ready!(state.sink.as_mut().poll_ready(cx)) {
            state.close_sent = true;
            return Poll::Ready(closed_is_ok(e));
        }
        state.close_sent = true;
        let close = Message::Close(Some(status.to_frame()));
        if let Err(e) = state.sink.as_mut().start_send(close) {
            return Poll::Ready(closed_is_ok(e));
        }
    }
    state
        .sink
        .as_mut()
        .poll_close(cx)
        .map(|result| result.or_else(closed_is_ok))
}

/// `AsyncWrite` over the outgoing half of a WebSocket.
///
/// Every `write` becomes one binary frame.  `shutdown` closes the socket with
/// [`CloseStatus::OK`]; use [`close`](Self::close) for any other status.
pub struct WsWriter {
    shared: SharedSink,
}

impl WsWriter {
    fn new(sink: MessageSink) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SinkState {
                sink,
                close_sent: false,
            })),
        }
    }

    /// A handle that can close this writer's socket after the writer itself
    /// has been handed away.
    pub fn closer(&self) -> WsCloser {
        WsCloser {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Closes the socket with `status`.  No-op if a Close was already sent.
    pub async fn close(&mut self, status: CloseStatus) -> io::Result<()> {
        poll_fn(|cx| poll_close_with(&self.shared, cx, &status)).await
    }
}

impl AsyncWrite for WsWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.shared.lock();
        if state.close_sent {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        ready!(state.sink.as_mut().poll_ready(cx)).map_err(io::Error::other)?;
        state
            .sink
            .as_mut()
            .start_send(Message::Binary(buf.to_vec()))
            .map_err(io::Error::other)?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut state = self.shared.lock();
        state
            .sink
            .as_mut()
            .poll_flush(cx)
            .map(|result| result.or_else(closed_is_ok))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        poll_close_with(&self.shared, cx, &CloseStatus::OK)
    }
}

/// Closes a socket whose [`WsWriter`] lives elsewhere.
#[derive(Clone)]
pub struct WsCloser {
    shared: SharedSink,
}

impl WsCloser {
    /// Closes the socket with `status`.  No-op if a Close was already sent.
    pub async fn close(&self, status: CloseStatus) -> io::Result<()> {
        poll_fn(|cx| poll_close_with(&self.shared, cx, &status)).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::SinkExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio_tungstenite::tungstenite::protocol::Role;

    /// Two WebSocket endpoints over an in-memory pipe, no handshake.
    async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
        (client, server)
    }

    #[test]
    fn test_error_to_close_status_mapping() {
        assert_eq!(
            CloseStatus::for_error(&BridgeError::InvalidToken),
            CloseStatus::UNKNOWN_TOKEN
        );
        assert_eq!(
            CloseStatus::for_error(&BridgeError::UnknownToken).code(),
            4404
        );
        assert_eq!(
            CloseStatus::for_error(&BridgeError::AlreadyAccepted).code(),
            4409
        );
        assert_eq!(
            CloseStatus::for_error(&BridgeError::DuplicateToken),
            CloseStatus::EXCEPTION
        );
    }

    #[test]
    fn test_only_1000_is_normal() {
        assert!(CloseStatus::OK.is_normal());
        assert!(!CloseStatus::EXCEPTION.is_normal());
        assert!(!CloseStatus::new(1000 + 1, "going away").is_normal());
    }

    #[tokio::test]
    async fn test_reader_concatenates_binary_and_text_frames() {
        // Arrange
        let (mut client, server) = ws_pair().await;
        let (mut reader, _writer) = split_ws(server);
        client.send(Message::Binary(b"hello ".to_vec())).await.unwrap();
        client.send(Message::Ping(vec![1])).await.unwrap();
        client.send(Message::Text("world".to_string())).await.unwrap();
        client.close(None).await.unwrap();

        // Act
        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();

        // Assert
        assert_eq!(received, b"hello world");
    }

    #[tokio::test]
    async fn test_reader_records_close_status() {
        let (mut client, server) = ws_pair().await;
        let (mut reader, _writer) = split_ws(server);
        client
            .close(Some(CloseStatus::WAIT_TIMEOUT.to_frame()))
            .await
            .unwrap();

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();

        assert!(received.is_empty());
        assert_eq!(reader.close_status(), Some(&CloseStatus::WAIT_TIMEOUT));
    }

    #[tokio::test]
    async fn test_ready_buffers_payload_without_consuming_it() {
        // Arrange
        let (mut client, server) = ws_pair().await;
        let (mut reader, _writer) = split_ws(server);
        client.send(Message::Binary(b"early".to_vec())).await.unwrap();
        client.close(None).await.unwrap();

        // Act
        let has_data = reader.ready().await.unwrap();
        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();

        // Assert
        assert!(has_data);
        assert_eq!(received, b"early");
        assert!(!reader.ready().await.unwrap());
    }

    #[tokio::test]
    async fn test_ready_reports_eof_when_peer_closes() {
        let (mut client, server) = ws_pair().await;
        let (mut reader, _writer) = split_ws(server);
        client.close(None).await.unwrap();

        assert!(!reader.ready().await.unwrap());
    }

    #[tokio::test]
    async fn test_writer_sends_binary_frames() {
        let (mut client, server) = ws_pair().await;
        let (_reader, mut writer) = split_ws(server);

        writer.write_all(b"payload").await.unwrap();
        writer.flush().await.unwrap();

        let message = client.next().await.unwrap().unwrap();
        assert_eq!(message, Message::Binary(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_closer_sends_status_once() {
        // Arrange
        let (mut client, server) = ws_pair().await;
        let (_reader, writer) = split_ws(server);
        let closer = writer.closer();

        // Act: the first close wins, the second is ignored
        closer.close(CloseStatus::DEVICE_REFUSED).await.unwrap();
        closer.close(CloseStatus::OK).await.unwrap();

        // Assert
        match client.next().await.unwrap().unwrap() {
            Message::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 4403);
                assert_eq!(frame.reason, "device refused");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_after_close_is_broken_pipe() {
        let (_client, server) = ws_pair().await;
        let (_reader, mut writer) = split_ws(server);
        writer.close(CloseStatus::OK).await.unwrap();

        let err = writer.write_all(b"late").await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
