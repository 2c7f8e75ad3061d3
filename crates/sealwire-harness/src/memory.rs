//! In-memory transport.
//!
//! Each connection is a pair of unbounded channels. The server side
//! implements [`TransportConnection`]; the test drives the [`ClientEnd`].
//! Dropping or disconnecting the client end makes the server's `recv` return
//! `None`, and dropping the client end also makes server sends fail, which is
//! how tests model an abrupt disconnect.

use std::io;

use async_trait::async_trait;
use sealwire_core::{Transport, TransportConnection};
use tokio::sync::{Mutex, mpsc};

/// What the server put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Text frame
    Text(String),
    /// Close frame
    Closed {
        /// Close code
        code: u16,
        /// Close reason
        reason: String,
    },
}

/// Accepts connections opened through a [`MemoryConnector`].
pub struct MemoryTransport {
    incoming: Mutex<mpsc::UnboundedReceiver<MemoryConnection>>,
}

/// Opens connections to a [`MemoryTransport`].
#[derive(Clone)]
pub struct MemoryConnector {
    tx: mpsc::UnboundedSender<MemoryConnection>,
}

impl MemoryTransport {
    /// Transport and the connector that feeds it
    pub fn new() -> (Self, MemoryConnector) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { incoming: Mutex::new(rx) }, MemoryConnector { tx })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Incoming = MemoryConnection;
    type Connection = MemoryConnection;

    async fn accept(&self) -> io::Result<Self::Incoming> {
        self.incoming.lock().await.recv().await.ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionAborted, "all connectors dropped")
        })
    }

    async fn upgrade(&self, incoming: Self::Incoming) -> io::Result<Self::Connection> {
        Ok(incoming)
    }
}

impl MemoryConnector {
    /// Open a connection
    pub fn connect(&self) -> io::Result<ClientEnd> {
        let (server, client) = MemoryConnection::pair();
        self.tx
            .send(server)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "transport dropped"))?;
        Ok(client)
    }
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<Delivery>,
    closed: bool,
}

impl MemoryConnection {
    /// Server side and client side of a fresh connection
    pub fn pair() -> (Self, ClientEnd) {
        let (client_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, client_rx) = mpsc::unbounded_channel();
        (
            Self { inbound, outbound, closed: false },
            ClientEnd { tx: Some(client_tx), rx: client_rx },
        )
    }
}

#[async_trait]
impl TransportConnection for MemoryConnection {
    async fn recv(&mut self) -> io::Result<Option<String>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.inbound.recv().await)
    }

    async fn send(&mut self, text: String) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        self.outbound
            .send(Delivery::Text(text))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client end dropped"))
    }

    async fn close(&mut self, code: u16, reason: &str) {
        if !self.closed {
            self.closed = true;
            let _ = self.outbound.send(Delivery::Closed { code, reason: reason.to_string() });
        }
    }
}

/// Client side of an in-memory connection.
pub struct ClientEnd {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl ClientEnd {
    /// Send a text frame to the server
    pub fn send(&self, text: impl Into<String>) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "disconnected"))?;
        tx.send(text.into())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "server side dropped"))
    }

    /// Next thing the server sent; `None` once the server side is gone
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Next text frame; `None` on close or end of stream
    pub async fn next_text(&mut self) -> Option<String> {
        match self.next().await? {
            Delivery::Text(text) => Some(text),
            Delivery::Closed { .. } => None,
        }
    }

    /// Wait for the server to close, returning the close code
    pub async fn closed(&mut self) -> Option<u16> {
        while let Some(delivery) = self.next().await {
            if let Delivery::Closed { code, .. } = delivery {
                return Some(code);
            }
        }
        None
    }

    /// Something the server already sent, without waiting
    pub fn try_next(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    /// Stop sending; the server sees end of stream
    pub fn disconnect(&mut self) {
        self.tx = None;
    }
}
