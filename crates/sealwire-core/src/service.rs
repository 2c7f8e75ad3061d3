//! Business-layer collaborator.
//!
//! The core decodes a request, hands it to a [`Service`] and encrypts whatever
//! document comes back. Method routing, argument validation and every
//! business rule live behind this trait.

use std::{any::Any, sync::Arc};

use async_trait::async_trait;
use sealwire_proto::Request;
use serde_json::Value;

use crate::{
    error::ServiceError,
    fanout::PushReport,
    registry::{Departure, SessionRegistry},
    scratch::Scratch,
    session::{Identity, Session, SessionId},
};

/// Handles decrypted requests for every connection.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Handle one request.
    ///
    /// The returned document is encrypted and sent back on the same
    /// connection. An error becomes an error-shaped response; it never closes
    /// the connection.
    async fn handle(&self, cx: &RequestContext, request: Request) -> Result<Value, ServiceError>;

    /// Called once when the last session bound to `identity` has gone away.
    async fn on_offline(&self, identity: &Identity, registry: &SessionRegistry) {
        let _ = (identity, registry);
    }
}

/// What a [`Service`] can see and do while handling one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
}

impl RequestContext {
    /// Context for a request arriving on `session`
    pub fn new(session: Arc<Session>, registry: Arc<SessionRegistry>) -> Self {
        Self { session, registry }
    }

    /// Session the request arrived on
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Id of the session the request arrived on
    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    /// Shared registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Identity bound to this session
    pub fn identity(&self) -> Option<Identity> {
        self.session.identity()
    }

    /// Identity bound to this session, or `NotAuthenticated`
    pub fn require_identity(&self) -> Result<Identity, ServiceError> {
        self.identity().ok_or(ServiceError::NotAuthenticated)
    }

    /// Bind this session to `identity`.
    ///
    /// # Errors
    ///
    /// `AlreadyBound` if the session already carries an identity.
    pub fn bind(&self, identity: Identity) -> Result<(), ServiceError> {
        if self.session.identity().is_some() {
            return Err(ServiceError::AlreadyBound);
        }
        self.registry.bind(&self.session, identity);
        Ok(())
    }

    /// Drop this session's binding
    pub fn unbind(&self) -> Option<Departure> {
        self.registry.unbind(&self.session)
    }

    /// Run `f` against this session's scratch store
    pub fn with_scratch<R>(&self, f: impl FnOnce(&mut Scratch) -> R) -> R {
        self.session.with_scratch(f)
    }

    /// Take a typed scratch value that is still live at `now`
    pub fn take_scratch<T: Any + Send>(&self, now: std::time::Instant) -> Option<T> {
        self.with_scratch(|scratch| scratch.take::<T>(now))
    }

    /// True if `identity` has at least one bound session
    pub fn is_reachable(&self, identity: &Identity) -> bool {
        self.registry.is_reachable(identity)
    }

    /// Push `document` to every session of `identity`
    pub fn push(&self, identity: &Identity, document: &Value) -> PushReport {
        self.registry.push(identity, document)
    }

    /// Push `document` to every bound session
    pub fn broadcast(&self, document: &Value) -> PushReport {
        self.registry.broadcast(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SystemEnv;

    #[test]
    fn bind_twice_is_rejected() {
        let registry = Arc::new(SessionRegistry::new(4));
        let (session, _rx) = registry.create_session(&SystemEnv);
        let cx = RequestContext::new(session, Arc::clone(&registry));

        assert_eq!(cx.require_identity(), Err(ServiceError::NotAuthenticated));
        cx.bind(Identity::new("alice")).unwrap();
        assert_eq!(cx.bind(Identity::new("bob")), Err(ServiceError::AlreadyBound));
        assert_eq!(cx.require_identity(), Ok(Identity::new("alice")));
        assert!(cx.is_reachable(&Identity::new("alice")));
    }

    #[test]
    fn unbind_releases_identity() {
        let registry = Arc::new(SessionRegistry::new(4));
        let (session, _rx) = registry.create_session(&SystemEnv);
        let cx = RequestContext::new(session, Arc::clone(&registry));
        cx.bind(Identity::new("alice")).unwrap();

        let departure = cx.unbind().unwrap();
        assert!(departure.last_session);
        assert_eq!(cx.identity(), None);
    }
}
