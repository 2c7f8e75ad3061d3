//! WebSocket transport.
//!
//! Accepts TCP connections, performs the WebSocket upgrade and exposes each
//! socket as a [`TransportConnection`] of text frames. The upgrade runs on
//! the connection's own task, after `accept` has returned. The connection
//! type is generic over the byte stream so simulated networks can reuse it.

use std::{borrow::Cow, io, net::SocketAddr, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use sealwire_core::{Transport, TransportConnection};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
};
use tokio_tungstenite::{
    WebSocketStream, accept_async,
    tungstenite::{
        Error as WsError, Message,
        protocol::{CloseFrame, frame::coding::CloseCode as WsCloseCode},
    },
};
use tracing::debug;

/// Listening WebSocket endpoint.
pub struct WsTransport {
    listener: TcpListener,
    upgrade_timeout: Duration,
}

impl WsTransport {
    /// Bind a TCP listener on `addr`
    pub async fn bind(addr: SocketAddr, upgrade_timeout: Duration) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, upgrade_timeout })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl Transport for WsTransport {
    type Incoming = TcpStream;
    type Connection = WsConnection<TcpStream>;

    async fn accept(&self) -> io::Result<Self::Incoming> {
        let (stream, peer) = self.listener.accept().await?;
        debug!(%peer, "tcp connection accepted");
        Ok(stream)
    }

    async fn upgrade(&self, stream: Self::Incoming) -> io::Result<Self::Connection> {
        stream.set_nodelay(true)?;
        upgrade(stream, self.upgrade_timeout).await
    }
}

/// Perform the server side of the WebSocket upgrade on `stream`.
///
/// # Errors
///
/// `TimedOut` if the client does not finish the upgrade within `timeout`;
/// any protocol failure during the upgrade is reported as an I/O error.
pub async fn upgrade<S>(stream: S, timeout: Duration) -> io::Result<WsConnection<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let stream = tokio::time::timeout(timeout, accept_async(stream))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "websocket upgrade timed out"))?
        .map_err(io::Error::other)?;
    Ok(WsConnection { stream })
}

/// One upgraded WebSocket.
pub struct WsConnection<S> {
    stream: WebSocketStream<S>,
}

#[async_trait]
impl<S> TransportConnection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> io::Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(text)),
                Ok(Message::Close(_)) => return Ok(None),
                Ok(Message::Binary(data)) => {
                    debug!(len = data.len(), "ignoring binary frame");
                },
                // Pings are answered by tungstenite on the next write.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {},
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return Ok(None),
                Err(err) => return Err(io::Error::other(err)),
            }
        }
        Ok(None)
    }

    async fn send(&mut self, text: String) -> io::Result<()> {
        self.stream.send(Message::Text(text)).await.map_err(io::Error::other)
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame { code: WsCloseCode::from(code), reason: Cow::Owned(reason.to_string()) };
        if let Err(err) = self.stream.send(Message::Close(Some(frame))).await {
            debug!(error = %err, "close frame not sent");
        }
    }
}
