//! Process-wide table of live sessions and the identity index.
//!
//! One mutex guards both maps. Every operation is short and synchronous, so
//! the lock is never held across an await point. Readers that go on to send
//! (fan-out, broadcast) copy the `Arc<Session>`s they need and release the
//! lock before encrypting.
//!
//! # Invariants
//!
//! - every id in the identity index exists in the primary table
//! - an identity key is present iff its session set is non-empty
//! - a session's bound identity and its index entry change together
//!
//! Lock order is registry, then session; a session's own locks are never held
//! while taking the registry lock.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex},
};

use sealwire_crypto::KeyPair;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    env::{EnvRng, Environment},
    session::{Identity, Session, SessionId, lock},
};

/// Result of unbinding a session from its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Identity the session was bound to
    pub identity: Identity,
    /// True if no other session remains bound to `identity`
    pub last_session: bool,
}

/// Point-in-time copy of both tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// Every live session id
    pub sessions: BTreeSet<SessionId>,
    /// Identity index
    pub identities: BTreeMap<Identity, BTreeSet<SessionId>>,
}

impl RegistrySnapshot {
    /// Check the index invariants, returning a description of the first
    /// violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (identity, ids) in &self.identities {
            if ids.is_empty() {
                return Err(format!("identity {identity} has an empty session set"));
            }
            if let Some(id) = ids.iter().find(|id| !self.sessions.contains(id)) {
                return Err(format!("identity {identity} indexes unknown session {id}"));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Arc<Session>>,
    by_identity: HashMap<Identity, HashSet<SessionId>>,
}

impl Inner {
    /// Remove `session` from its identity's set; the caller holds the lock.
    fn unbind(&mut self, session: &Session) -> Option<Departure> {
        let identity = session.replace_identity(None)?;

        let last_session = match self.by_identity.get_mut(&identity) {
            Some(ids) => {
                ids.remove(&session.id());
                if ids.is_empty() {
                    self.by_identity.remove(&identity);
                    true
                } else {
                    false
                }
            },
            None => true,
        };

        Some(Departure { identity, last_session })
    }

    fn live_sessions_for(&self, identity: &Identity) -> Vec<Arc<Session>> {
        self.by_identity
            .get(identity)
            .map(|ids| ids.iter().filter_map(|id| self.sessions.get(id).cloned()).collect())
            .unwrap_or_default()
    }
}

/// Registry of live sessions.
pub struct SessionRegistry {
    inner: Mutex<Inner>,
    mailbox_capacity: usize,
}

impl SessionRegistry {
    /// Empty registry whose sessions get push mailboxes of
    /// `mailbox_capacity` frames (at least one).
    pub fn new(mailbox_capacity: usize) -> Self {
        Self { inner: Mutex::new(Inner::default()), mailbox_capacity: mailbox_capacity.max(1) }
    }

    /// Create a session with a fresh id and key pair and insert it.
    ///
    /// Returns the receiving end of the session's push mailbox; the caller
    /// (its dispatcher) drains it onto the transport.
    pub fn create_session<E: Environment>(&self, env: &E) -> (Arc<Session>, mpsc::Receiver<String>) {
        let keypair = KeyPair::generate(&mut EnvRng(env));
        let (tx, rx) = mpsc::channel(self.mailbox_capacity);

        let mut inner = lock(&self.inner);
        let id = loop {
            let candidate = SessionId::generate(env);
            if !inner.sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let session = Arc::new(Session::new(id, keypair, tx, env.now()));
        inner.sessions.insert(id, Arc::clone(&session));
        debug!(session_id = %id, live = inner.sessions.len(), "session created");

        (session, rx)
    }

    /// Look up a live session
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        lock(&self.inner).sessions.get(&id).cloned()
    }

    /// Unbind and delete a session. Idempotent.
    ///
    /// Returns the departure if the session was still bound.
    pub fn remove(&self, id: SessionId) -> Option<Departure> {
        let mut inner = lock(&self.inner);
        let session = inner.sessions.remove(&id)?;
        let departure = inner.unbind(&session);
        debug!(session_id = %id, live = inner.sessions.len(), "session removed");
        departure
    }

    /// Bind `session` to `identity`.
    ///
    /// A session already bound elsewhere is moved; the previous binding's
    /// departure is returned. Binding a session that is no longer registered
    /// is a no-op, since a stale index entry would outlive it.
    pub fn bind(&self, session: &Session, identity: Identity) -> Option<Departure> {
        let mut inner = lock(&self.inner);
        if !inner.sessions.contains_key(&session.id()) {
            return None;
        }

        let previous = match session.identity() {
            Some(current) if current == identity => return None,
            Some(_) => inner.unbind(session),
            None => None,
        };

        inner.by_identity.entry(identity.clone()).or_default().insert(session.id());
        debug!(session_id = %session.id(), %identity, "session bound");
        session.replace_identity(Some(identity));

        previous
    }

    /// Clear `session`'s binding. Idempotent.
    pub fn unbind(&self, session: &Session) -> Option<Departure> {
        let mut inner = lock(&self.inner);
        let departure = inner.unbind(session);
        if let Some(departure) = &departure {
            debug!(
                session_id = %session.id(),
                identity = %departure.identity,
                last_session = departure.last_session,
                "session unbound"
            );
        }
        departure
    }

    /// Drop `session` after its mailbox rejected a push. Idempotent.
    ///
    /// The departure is stashed on the session before the registry lock is
    /// released, so [`SessionRegistry::retire`] observes either the binding
    /// or the stash, never neither. Returns true if this call removed it.
    pub(crate) fn evict(&self, session: &Session) -> bool {
        let removed = {
            let mut inner = lock(&self.inner);
            match inner.sessions.remove(&session.id()) {
                Some(_) => {
                    let departure = inner.unbind(session);
                    debug!(session_id = %session.id(), live = inner.sessions.len(), "session evicted");
                    session.stash_departure(departure);
                    true
                },
                None => false,
            }
        };
        session.notify_evicted();
        removed
    }

    /// End `session`'s binding for good.
    ///
    /// Returns the departure whether the session is still bound or an
    /// eviction already unbound it. Exactly one call observes each binding.
    pub fn retire(&self, session: &Session) -> Option<Departure> {
        let mut inner = lock(&self.inner);
        inner.unbind(session).or_else(|| session.take_departure())
    }

    /// Snapshot of the live sessions bound to `identity`
    pub fn sessions_for(&self, identity: &Identity) -> Vec<Arc<Session>> {
        lock(&self.inner).live_sessions_for(identity)
    }

    /// True if at least one session is bound to `identity`
    pub fn is_reachable(&self, identity: &Identity) -> bool {
        lock(&self.inner).by_identity.contains_key(identity)
    }

    /// Snapshot of every session that has a bound identity
    pub fn bound_sessions(&self) -> Vec<Arc<Session>> {
        let inner = lock(&self.inner);
        inner
            .by_identity
            .values()
            .flatten()
            .filter_map(|id| inner.sessions.get(id).cloned())
            .collect()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        lock(&self.inner).sessions.len()
    }

    /// True if no sessions are live
    pub fn is_empty(&self) -> bool {
        lock(&self.inner).sessions.is_empty()
    }

    /// Copy of both tables
    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = lock(&self.inner);
        RegistrySnapshot {
            sessions: inner.sessions.keys().copied().collect(),
            identities: inner
                .by_identity
                .iter()
                .map(|(identity, ids)| (identity.clone(), ids.iter().copied().collect()))
                .collect(),
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(crate::connection::DispatcherConfig::default().mailbox_capacity)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("SessionRegistry")
            .field("sessions", &inner.sessions.len())
            .field("identities", &inner.by_identity.len())
            .finish()
    }
}
