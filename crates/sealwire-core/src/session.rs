//! Per-connection session state.
//!
//! A [`Session`] is shared between its dispatcher task and the registry (for
//! fan-out), so every mutable part sits behind interior mutability:
//!
//! - the shared secret is set exactly once, when the handshake completes
//! - the bound identity changes only under the registry lock, so the identity
//!   index and the session never disagree
//! - the push mailbox sender is the registry's only way to reach the
//!   connection; the dispatcher owns the receiving end

use std::{
    fmt,
    sync::{Mutex, MutexGuard, OnceLock, PoisonError},
    time::Instant,
};

use sealwire_crypto::{CryptoError, KeyPair, PublicKey, SharedSecret};
use tokio::sync::{
    Notify,
    mpsc::{self, error::TrySendError},
};
use uuid::Uuid;

use crate::{env::Environment, registry::Departure, scratch::Scratch};

/// Opaque session identifier, sent to the client in `server_hello`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Random v4 id drawn from the environment
    pub fn generate<E: Environment>(env: &E) -> Self {
        let mut bytes = [0u8; 16];
        env.random_bytes(&mut bytes);
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Authenticated identity a session can be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Wrap an identity string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// State of one live connection.
pub struct Session {
    id: SessionId,
    keypair: KeyPair,
    secret: OnceLock<SharedSecret>,
    identity: Mutex<Option<Identity>>,
    scratch: Mutex<Scratch>,
    outbound: mpsc::Sender<String>,
    evicted: Notify,
    departure: Mutex<Option<Departure>>,
    created_at: Instant,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        keypair: KeyPair,
        outbound: mpsc::Sender<String>,
        created_at: Instant,
    ) -> Self {
        Self {
            id,
            keypair,
            secret: OnceLock::new(),
            identity: Mutex::new(None),
            scratch: Mutex::new(Scratch::new()),
            outbound,
            evicted: Notify::new(),
            departure: Mutex::new(None),
            created_at,
        }
    }

    /// Session id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// When the session was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// This side's public value as a decimal string
    pub fn public_decimal(&self) -> String {
        self.keypair.public_decimal()
    }

    /// Derive and store the shared secret from the peer's public value.
    ///
    /// The secret is set once; a later call leaves the first secret in place.
    ///
    /// # Errors
    ///
    /// Propagates key agreement failures (degenerate shared value).
    pub fn establish(&self, peer: &PublicKey) -> Result<(), CryptoError> {
        let secret = self.keypair.agree(peer)?;
        // First writer wins; the dispatcher calls this once per session.
        let _ = self.secret.set(secret);
        Ok(())
    }

    /// Shared secret, once the handshake has completed
    pub fn secret(&self) -> Option<&SharedSecret> {
        self.secret.get()
    }

    /// True once a shared secret exists
    pub fn is_established(&self) -> bool {
        self.secret.get().is_some()
    }

    /// Currently bound identity
    pub fn identity(&self) -> Option<Identity> {
        lock(&self.identity).clone()
    }

    /// Replace the bound identity. Callers hold the registry lock.
    pub(crate) fn replace_identity(&self, identity: Option<Identity>) -> Option<Identity> {
        std::mem::replace(&mut *lock(&self.identity), identity)
    }

    /// Run `f` with exclusive access to this session's scratch store
    pub fn with_scratch<R>(&self, f: impl FnOnce(&mut Scratch) -> R) -> R {
        f(&mut lock(&self.scratch))
    }

    /// Queue an already-encrypted text frame without waiting
    pub(crate) fn try_push(&self, frame: String) -> Result<(), TrySendError<String>> {
        self.outbound.try_send(frame)
    }

    /// Keep the departure an eviction produced so the dispatcher can still
    /// report the identity as offline. Callers hold the registry lock.
    pub(crate) fn stash_departure(&self, departure: Option<Departure>) {
        if departure.is_some() {
            *lock(&self.departure) = departure;
        }
    }

    /// Signal the dispatcher that the registry dropped this session
    pub(crate) fn notify_evicted(&self) {
        self.evicted.notify_one();
    }

    /// Resolves once [`Session::notify_evicted`] has been called
    pub(crate) async fn evicted(&self) {
        self.evicted.notified().await;
    }

    /// Departure stashed by an eviction, if any
    pub(crate) fn take_departure(&self) -> Option<Departure> {
        lock(&self.departure).take()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("established", &self.is_established())
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

/// Lock ignoring poison; every critical section leaves the data consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
