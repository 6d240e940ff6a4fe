//! Copy loops between byte streams.
//!
//! Three shapes, all with a fixed 4 KiB buffer:
//!
//! - [`pump`]   – copy one direction until EOF.
//! - [`relay`]  – pump a WebSocket reader into a WebSocket writer, then close
//!   the writer with a status that reflects how the read side ended.
//! - [`bridge`] – full duplex between a WebSocket and any byte stream; the
//!   first direction to finish ends the whole bridge.
//!
//! None of these retry.  A tunnel has no resumable offset, so a broken tunnel
//! is torn down and reported.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::transport::ws::{split_ws, CloseStatus, WsReader, WsWriter};

/// Copy buffer size for every pump.
pub const CHUNK_SIZE: usize = 4096;

/// Copies `reader` into `writer` until `reader` reaches EOF.
///
/// Each chunk is flushed as soon as it is written so interactive traffic is
/// not held back.  Returns the number of bytes copied.
pub async fn pump<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            writer.flush().await?;
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
    }
}

/// Pumps `reader` into `writer`, then closes `writer`'s socket.
///
/// The close status mirrors the one the reader's remote end sent (so a
/// rejection on a far node reaches the near client unchanged), falls back to
/// [`CloseStatus::OK`] on a bare EOF, and is [`CloseStatus::EXCEPTION`] if the
/// copy failed.
pub async fn relay(mut reader: WsReader, mut writer: WsWriter) -> Result<u64, BridgeError> {
    let result = pump(&mut reader, &mut writer).await;

    let status = match &result {
        Ok(_) => reader.close_status().cloned().unwrap_or(CloseStatus::OK),
        Err(e) => {
            debug!("relay stopped: {e}");
            CloseStatus::EXCEPTION
        }
    };
    if let Err(e) = writer.close(status).await {
        debug!("relay: closing peer socket failed: {e}");
    }

    result.map_err(BridgeError::from)
}

/// Runs a full-duplex bridge between `ws` and `stream` until either direction
/// finishes.
///
/// On a clean finish the socket is closed with 1000; if either copy loop
/// failed, with 1011.  `stream` is shut down and dropped in both cases.
pub async fn bridge<T, S>(ws: WebSocketStream<T>, stream: S) -> Result<u64, BridgeError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_reader, mut ws_writer) = split_ws(ws);
    let (mut stream_reader, mut stream_writer) = tokio::io::split(stream);

    let result = tokio::select! {
        r = pump(&mut ws_reader, &mut stream_writer) => r,
        r = pump(&mut stream_reader, &mut ws_writer) => r,
    };

    let status = match &result {
        Ok(_) => CloseStatus::OK,
        Err(e) => {
            warn!("bridge failed: {e}");
            CloseStatus::EXCEPTION
        }
    };
    if let Err(e) = ws_writer.close(status).await {
        debug!("bridge: closing socket failed: {e}");
    }
    if let Err(e) = stream_writer.shutdown().await {
        debug!("bridge: shutting down stream failed: {e}");
    }

    result.map_err(BridgeError::from)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{DuplexStream, ReadBuf};
    use tokio_tungstenite::tungstenite::protocol::Role;
    use tokio_tungstenite::tungstenite::Message;

    async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
        (client, server)
    }

    /// Collects every binary payload until the Close frame, returning the
    /// bytes and the close code.
    async fn drain(ws: &mut WebSocketStream<DuplexStream>) -> (Vec<u8>, Option<u16>) {
        let mut bytes = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Binary(data) => bytes.extend_from_slice(&data),
                Message::Close(frame) => return (bytes, frame.map(|f| u16::from(f.code))),
                _ => {}
            }
        }
        (bytes, None)
    }

    /// A local stream whose reads always fail.
    struct BrokenStream;

    impl AsyncRead for BrokenStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()))
        }
    }

    impl AsyncWrite for BrokenStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_pump_copies_in_chunks_until_eof() {
        // Arrange: more than two chunks of data
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = data.as_slice();
        let mut writer = Vec::new();

        // Act
        let copied = pump(&mut reader, &mut writer).await.unwrap();

        // Assert
        assert_eq!(copied, 10_000);
        assert_eq!(writer, data);
    }

    #[tokio::test]
    async fn test_relay_forwards_and_closes_normally() {
        // Arrange: source client -> (relay) -> sink client
        let (mut source, source_server) = ws_pair().await;
        let (mut sink, sink_server) = ws_pair().await;
        let (reader, _source_writer) = split_ws(source_server);
        let (_sink_reader, writer) = split_ws(sink_server);
        let relay_task = tokio::spawn(relay(reader, writer));

        // Act
        source.send(Message::Binary(b"abc".to_vec())).await.unwrap();
        source.send(Message::Binary(b"def".to_vec())).await.unwrap();
        source.close(None).await.unwrap();

        // Assert
        let (bytes, code) = drain(&mut sink).await;
        assert_eq!(bytes, b"abcdef");
        assert_eq!(code, Some(1000));
        assert_eq!(relay_task.await.unwrap().unwrap(), 6);
    }

    #[tokio::test]
    async fn test_relay_mirrors_remote_close_status() {
        let (mut source, source_server) = ws_pair().await;
        let (mut sink, sink_server) = ws_pair().await;
        let (reader, _source_writer) = split_ws(source_server);
        let (_sink_reader, writer) = split_ws(sink_server);
        let relay_task = tokio::spawn(relay(reader, writer));

        source
            .close(Some(
                tokio_tungstenite::tungstenite::protocol::CloseFrame {
                    code: 4404.into(),
                    reason: "unknown bridge token".into(),
                },
            ))
            .await
            .unwrap();

        let (_, code) = drain(&mut sink).await;
        assert_eq!(code, Some(4404));
        relay_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bridge_is_full_duplex() {
        // Arrange
        let (mut client, server) = ws_pair().await;
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let bridge_task = tokio::spawn(bridge(server, local));

        // Act: socket -> stream
        client.send(Message::Binary(b"ping".to_vec())).await.unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();

        // Act: stream -> socket
        remote.write_all(b"pong").await.unwrap();
        let reply = client.next().await.unwrap().unwrap();

        // Assert
        assert_eq!(&buf, b"ping");
        assert_eq!(reply, Message::Binary(b"pong".to_vec()));

        // Closing the local stream ends the whole bridge with 1000.
        drop(remote);
        let (_, code) = drain(&mut client).await;
        assert_eq!(code, Some(1000));
        bridge_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bridge_closes_with_1011_when_stream_fails() {
        // Arrange
        let (mut client, server) = ws_pair().await;

        // Act
        let bridge_task = tokio::spawn(bridge(server, BrokenStream));
        let (_, code) = drain(&mut client).await;

        // Assert
        assert_eq!(code, Some(1011));
        assert!(matches!(
            bridge_task.await.unwrap(),
            Err(BridgeError::TransportFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_relay_closes_with_1011_when_source_breaks_protocol() {
        // Arrange: the source speaks raw bytes, not WebSocket frames
        let (mut raw_source, source_io) = tokio::io::duplex(1024);
        let source_server = WebSocketStream::from_raw_socket(source_io, Role::Server, None).await;
        let (mut sink, sink_server) = ws_pair().await;
        let (reader, _source_writer) = split_ws(source_server);
        let (_sink_reader, writer) = split_ws(sink_server);
        let relay_task = tokio::spawn(relay(reader, writer));

        // Act: a masked frame with reserved opcode 0x3
        raw_source
            .write_all(&[0x83, 0x80, 0, 0, 0, 0])
            .await
            .unwrap();

        // Assert
        let (_, code) = drain(&mut sink).await;
        assert_eq!(code, Some(1011));
        assert!(matches!(
            relay_task.await.unwrap(),
            Err(BridgeError::TransportFailure(_))
        ));
    }
}
