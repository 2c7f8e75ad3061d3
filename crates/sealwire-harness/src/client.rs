//! Test client.
//!
//! [`TestClient`] is the client half of the protocol with no I/O: it builds
//! the hello, consumes the server hello, and seals/opens frames.
//! [`SimClient`] pairs it with a [`ClientEnd`] for async scenario tests.

use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use sealwire_crypto::{CryptoError, EnvelopeError, KeyPair, PublicKey, SharedSecret, open, seal};
use sealwire_proto::{ClientHello, EncryptedFrame, Handshake, ProtocolError, Request};
use serde_json::Value;
use thiserror::Error;

use crate::memory::{ClientEnd, Delivery, MemoryConnector};

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Handshake has not completed
    #[error("handshake not complete")]
    NotEstablished,

    /// Server sent something other than `server_hello`
    #[error("unexpected handshake message")]
    UnexpectedHandshake,

    /// Server closed the connection
    #[error("server closed with code {0:?}")]
    Closed(Option<u16>),

    /// Wire format error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Key agreement failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Frame did not open
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Decrypted document was not JSON
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Transport failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Sans-IO client.
pub struct TestClient {
    keypair: KeyPair,
    secret: Option<SharedSecret>,
    session_id: Option<String>,
}

impl TestClient {
    /// Client with a random private exponent
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_keypair(KeyPair::generate(rng))
    }

    /// Client with a fixed private exponent
    pub fn with_private(private: u64) -> Self {
        Self::from_keypair(KeyPair::from_private(BigUint::from(private)))
    }

    fn from_keypair(keypair: KeyPair) -> Self {
        Self { keypair, secret: None, session_id: None }
    }

    /// `client_hello` text frame
    pub fn hello(&self) -> String {
        let hello = Handshake::ClientHello(ClientHello { public_key: self.keypair.public_decimal() });
        // Serializing a struct of strings cannot fail.
        hello.to_json().unwrap_or_default()
    }

    /// Consume the `server_hello`, deriving the shared secret.
    ///
    /// Returns the session id the server assigned.
    pub fn accept_server_hello(&mut self, text: &str) -> Result<String, ClientError> {
        let Handshake::ServerHello(hello) = Handshake::from_json(text)? else {
            return Err(ClientError::UnexpectedHandshake);
        };

        let server_public = PublicKey::from_decimal(&hello.public_key)?;
        self.secret = Some(self.keypair.agree(&server_public)?);
        self.session_id = Some(hello.session_id.clone());
        Ok(hello.session_id)
    }

    /// Shared secret, once established
    pub fn secret(&self) -> Option<&SharedSecret> {
        self.secret.as_ref()
    }

    /// Session id assigned by the server
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Seal an arbitrary document into a `{"data": hex}` frame
    pub fn seal(&self, document: &Value) -> Result<String, ClientError> {
        let secret = self.secret.as_ref().ok_or(ClientError::NotEstablished)?;
        let plaintext = serde_json::to_vec(document)?;
        Ok(EncryptedFrame::from_envelope(&seal(secret, &plaintext)).to_json()?)
    }

    /// Seal a `{"method", "args"}` request
    pub fn request(&self, method: &str, args: Value) -> Result<String, ClientError> {
        let secret = self.secret.as_ref().ok_or(ClientError::NotEstablished)?;
        let plaintext = Request::new(method, args).to_plaintext()?;
        Ok(EncryptedFrame::from_envelope(&seal(secret, &plaintext)).to_json()?)
    }

    /// Open a server frame into its document
    pub fn open(&self, text: &str) -> Result<Value, ClientError> {
        let secret = self.secret.as_ref().ok_or(ClientError::NotEstablished)?;
        let frame = EncryptedFrame::decode(text, usize::MAX)?;
        let plaintext = open(secret, &frame.envelope()?)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Connected client over the in-memory transport.
pub struct SimClient {
    end: ClientEnd,
    client: TestClient,
}

impl SimClient {
    /// Connect and complete the handshake
    pub async fn connect(
        connector: &MemoryConnector,
        mut client: TestClient,
    ) -> Result<Self, ClientError> {
        let mut end = connector.connect()?;
        end.send(client.hello())?;

        match end.next().await {
            Some(Delivery::Text(text)) => {
                client.accept_server_hello(&text)?;
            },
            Some(Delivery::Closed { code, .. }) => return Err(ClientError::Closed(Some(code))),
            None => return Err(ClientError::Closed(None)),
        }

        Ok(Self { end, client })
    }

    /// Send a request without waiting for the response
    pub fn send(&self, method: &str, args: Value) -> Result<(), ClientError> {
        self.end.send(self.client.request(method, args)?)?;
        Ok(())
    }

    /// Send a request and return the next document from the server
    pub async fn call(&mut self, method: &str, args: Value) -> Result<Value, ClientError> {
        self.send(method, args)?;
        self.recv().await
    }

    /// Next document from the server, response or push
    pub async fn recv(&mut self) -> Result<Value, ClientError> {
        match self.end.next().await {
            Some(Delivery::Text(text)) => self.client.open(&text),
            Some(Delivery::Closed { code, .. }) => Err(ClientError::Closed(Some(code))),
            None => Err(ClientError::Closed(None)),
        }
    }

    /// Sans-IO half
    pub fn client(&self) -> &TestClient {
        &self.client
    }

    /// Raw transport end
    pub fn end_mut(&mut self) -> &mut ClientEnd {
        &mut self.end
    }

    /// Stop sending; the server sees end of stream
    pub fn disconnect(&mut self) {
        self.end.disconnect();
    }
}
