//! sealwire session core.
//!
//! Per-connection encrypted sessions over a plaintext bidirectional channel:
//! a Diffie-Hellman handshake establishes a connection secret, every later
//! frame travels in an encrypted envelope, and a process-wide registry binds
//! sessions to authenticated identities so pushes can fan out to every live
//! connection of an identity.
//!
//! # Architecture
//!
//! The pieces that decide things are plain state: [`connection::Connection`]
//! tracks handshake progress and rejected-frame accounting without touching
//! I/O, and [`registry::SessionRegistry`] is a lock-protected pair of maps.
//! The [`dispatcher::Dispatcher`] is the only async driver; it pulls frames
//! from a [`transport::TransportConnection`], consults the state machine, and
//! hands decrypted requests to the business layer through the
//! [`service::Service`] trait.
//!
//! Time and randomness come from an [`env::Environment`] so tests can run
//! with seeded randomness and controlled clocks.
//!
//! # Components
//!
//! - [`connection`]: Per-connection state machine (Init, Established, Closed)
//! - [`dispatcher`]: Handshake, request loop, termination sequence
//! - [`fanout`]: Encrypted push to one identity or to every bound session
//! - [`registry`]: Live sessions and the identity index
//! - [`session`]: Per-connection keys, secret, identity, scratch, mailbox
//! - [`scratch`]: Typed connection-scoped storage for multi-step flows
//! - [`service`]: Business-layer collaborator trait and request context
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`transport`]: Transport abstraction (text frames, close codes)
//! - [`error`]: Error types

pub mod connection;
pub mod dispatcher;
pub mod env;
pub mod error;
pub mod fanout;
pub mod registry;
pub mod scratch;
pub mod service;
pub mod session;
pub mod transport;

pub use connection::{Connection, ConnectionAction, ConnectionState, DispatcherConfig};
pub use dispatcher::Dispatcher;
pub use env::{Environment, SystemEnv};
pub use error::{ConnectionError, DispatchError, ServiceError};
pub use fanout::PushReport;
pub use registry::{Departure, RegistrySnapshot, SessionRegistry};
pub use scratch::Scratch;
pub use service::{RequestContext, Service};
pub use session::{Identity, Session, SessionId};
pub use transport::{Transport, TransportConnection};
