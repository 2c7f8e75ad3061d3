//! Transport abstraction for text-framed bidirectional connections.
//!
//! The dispatcher only needs "receive a text frame", "send a text frame" and
//! "close with a code". Production uses WebSocket over TCP; tests use an
//! in-memory channel pair.

use std::io;

use async_trait::async_trait;

/// Source of accepted connections.
///
/// Accepting is split in two. [`Transport::accept`] only takes the next raw
/// connection off the listener and must not wait on the peer; the accept
/// loop awaits it serially. [`Transport::upgrade`] performs any
/// transport-level negotiation and runs on the connection's own task, so a
/// slow or silent peer delays nobody else.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Accepted connection that has not been upgraded yet.
    type Incoming: Send + 'static;

    /// Type representing one ready connection.
    type Connection: TransportConnection;

    /// Accept the next incoming connection.
    async fn accept(&self) -> io::Result<Self::Incoming>;

    /// Turn an accepted connection into a ready one.
    async fn upgrade(&self, incoming: Self::Incoming) -> io::Result<Self::Connection>;
}

/// One live connection carrying JSON text frames.
///
/// Exclusively owned by the dispatcher task serving it.
#[async_trait]
pub trait TransportConnection: Send + 'static {
    /// Receive the next text frame.
    ///
    /// Returns `Ok(None)` once the peer has gone away, whether it closed
    /// cleanly or the underlying stream ended. Must be cancellation-safe: the
    /// dispatcher races it against outbound pushes and drops the future when
    /// another branch wins.
    async fn recv(&mut self) -> io::Result<Option<String>>;

    /// Send one text frame.
    async fn send(&mut self, text: String) -> io::Result<()>;

    /// Close the connection with an application close code.
    ///
    /// Best effort; errors are swallowed since the connection is being torn
    /// down anyway.
    async fn close(&mut self, code: u16, reason: &str);
}
