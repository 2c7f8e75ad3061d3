//! Per-connection control loop.
//!
//! [`Dispatcher::serve`] owns one connection from accept to teardown:
//!
//! 1. Create a session (fresh id and key pair) in the registry.
//! 2. Wait for a `client_hello` until the handshake deadline, derive the shared
//!    secret, reply with `server_hello`. Anything else closes with 4000.
//! 3. Loop over three sources: inbound frames, the session's push mailbox and
//!    the eviction signal. Inbound frames are opened, handed to the
//!    [`Service`], and the response is sealed and sent back before the next
//!    frame is read, so responses keep request order.
//! 4. On exit for any reason, unbind, notify the service if the identity just
//!    went fully offline, and remove the session.
//!
//! Bad frames are dropped and logged. A streak of them closes with 4001.

use std::{sync::Arc, time::Duration};

use sealwire_crypto::{PublicKey, SharedSecret, open, seal};
use sealwire_proto::{EncryptedFrame, Handshake, ProtocolError, Request, ServerHello};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    connection::{Connection, ConnectionAction, DispatcherConfig},
    env::Environment,
    error::DispatchError,
    registry::{Departure, SessionRegistry},
    service::{RequestContext, Service},
    session::Session,
    transport::{Transport, TransportConnection},
};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Why the established loop ended.
enum Exit {
    /// Close the transport with this action
    Close(ConnectionAction),
    /// Peer left or the transport broke; nothing to send
    Gone,
}

/// Drives connections for one [`Service`].
pub struct Dispatcher<S, E> {
    service: Arc<S>,
    registry: Arc<SessionRegistry>,
    env: E,
    config: DispatcherConfig,
}

impl<S: Service, E: Environment> Dispatcher<S, E> {
    /// Dispatcher with a fresh registry sized from `config`
    pub fn new(service: S, env: E, config: DispatcherConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.mailbox_capacity));
        Self::with_registry(Arc::new(service), registry, env, config)
    }

    /// Dispatcher sharing an existing service and registry
    pub fn with_registry(
        service: Arc<S>,
        registry: Arc<SessionRegistry>,
        env: E,
        config: DispatcherConfig,
    ) -> Self {
        Self { service, registry, env, config }
    }

    /// Shared session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Business-layer collaborator
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Limits applied to each connection
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Accept connections forever, serving each on its own task.
    ///
    /// The transport upgrade runs on the spawned task, never in this loop.
    /// Accept failures are logged and retried after a short pause.
    pub async fn run<T: Transport>(self: Arc<Self>, transport: T) {
        let transport = Arc::new(transport);
        loop {
            match transport.accept().await {
                Ok(incoming) => {
                    let dispatcher = Arc::clone(&self);
                    let transport = Arc::clone(&transport);
                    tokio::spawn(async move {
                        match transport.upgrade(incoming).await {
                            Ok(conn) => dispatcher.serve(conn).await,
                            Err(err) => debug!(error = %err, "transport upgrade failed"),
                        }
                    });
                },
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    self.env.sleep(ACCEPT_BACKOFF).await;
                },
            }
        }
    }

    /// Serve one connection until it closes.
    pub async fn serve<C: TransportConnection>(&self, mut conn: C) {
        let (session, mut mailbox) = self.registry.create_session(&self.env);
        let span = info_span!("session", session_id = %session.id());

        async {
            let mut state = Connection::new(self.env.now(), self.config.clone());
            debug!("connection accepted");

            match self.handshake(&mut conn, &session, &mut state).await {
                Ok(()) => {
                    debug!("handshake complete");
                    let exit = self.established(&mut conn, &session, &mut state, &mut mailbox).await;
                    if let Exit::Close(action) = exit {
                        execute(&mut conn, action).await;
                    }
                },
                Err(DispatchError::Disconnected) => debug!("peer left before handshake"),
                Err(DispatchError::Io(err)) => debug!(error = %err, "transport failed during handshake"),
                Err(err) => {
                    warn!(error = %err, "handshake rejected");
                    let action = state.reject_handshake(err.to_string());
                    execute(&mut conn, action).await;
                },
            }

            state.close();
            self.terminate(&session).await;
        }
        .instrument(span)
        .await;
    }

    async fn handshake<C: TransportConnection>(
        &self,
        conn: &mut C,
        session: &Session,
        state: &mut Connection,
    ) -> Result<(), DispatchError> {
        let remaining = state.handshake_deadline().saturating_duration_since(self.env.now());

        let text = tokio::select! {
            inbound = conn.recv() => inbound?.ok_or(DispatchError::Disconnected)?,
            () = self.env.sleep(remaining) => {
                return Err(DispatchError::HandshakeViolation(format!(
                    "no client_hello within {:?}",
                    self.config.handshake_timeout
                )));
            },
        };

        if text.len() > self.config.max_frame_len {
            return Err(DispatchError::HandshakeViolation(format!(
                "hello of {} bytes exceeds limit",
                text.len()
            )));
        }

        let hello = match Handshake::from_json(&text) {
            Ok(Handshake::ClientHello(hello)) => hello,
            Ok(other) => {
                return Err(DispatchError::HandshakeViolation(format!(
                    "expected client_hello, got {other:?}"
                )));
            },
            Err(err) => {
                return Err(DispatchError::HandshakeViolation(format!("unparseable hello: {err}")));
            },
        };

        let peer = PublicKey::from_decimal(&hello.public_key)?;
        session.establish(&peer)?;

        let reply = Handshake::ServerHello(ServerHello {
            public_key: session.public_decimal(),
            session_id: session.id().to_string(),
        });
        conn.send(reply.to_json()?).await?;

        state.establish(self.env.now())?;
        Ok(())
    }

    async fn established<C: TransportConnection>(
        &self,
        conn: &mut C,
        session: &Arc<Session>,
        state: &mut Connection,
        mailbox: &mut mpsc::Receiver<String>,
    ) -> Exit {
        let Some(secret) = session.secret() else {
            return Exit::Close(state.reject_handshake(DispatchError::NoSecret.to_string()));
        };
        let cx = RequestContext::new(Arc::clone(session), Arc::clone(&self.registry));

        loop {
            tokio::select! {
                inbound = conn.recv() => {
                    let text = match inbound {
                        Ok(Some(text)) => text,
                        Ok(None) => {
                            debug!("peer closed connection");
                            return Exit::Gone;
                        },
                        Err(err) => {
                            debug!(error = %err, "transport receive failed");
                            return Exit::Gone;
                        },
                    };

                    let plaintext = match self.open_frame(secret, &text) {
                        Ok(plaintext) => {
                            state.on_frame_accepted();
                            plaintext
                        },
                        Err(err) => {
                            warn!(error = %err, streak = state.rejected_streak() + 1, "dropping frame");
                            match state.on_frame_rejected() {
                                Some(action) => return Exit::Close(action),
                                None => continue,
                            }
                        },
                    };

                    let response = match Request::from_plaintext(&plaintext) {
                        Ok(request) => self.handle(&cx, request).await,
                        Err(err) => {
                            warn!(error = %err, "dropping undecodable request");
                            continue;
                        },
                    };

                    if let Err(err) = self.send_sealed(conn, secret, &response).await {
                        debug!(error = %err, "response send failed");
                        return Exit::Gone;
                    }
                },
                Some(frame) = mailbox.recv() => {
                    if let Err(err) = conn.send(frame).await {
                        debug!(error = %err, "push send failed");
                        return Exit::Gone;
                    }
                },
                () = session.evicted() => {
                    info!("session evicted by registry");
                    return Exit::Close(state.evicted());
                },
            }
        }
    }

    fn open_frame(&self, secret: &SharedSecret, text: &str) -> Result<Vec<u8>, DispatchError> {
        let frame = EncryptedFrame::decode(text, self.config.max_frame_len)?;
        Ok(open(secret, &frame.envelope()?)?)
    }

    async fn handle(&self, cx: &RequestContext, request: Request) -> Value {
        let method = request.method.clone();
        match self.service.handle(cx, request).await {
            Ok(response) => {
                debug!(%method, "request handled");
                response
            },
            Err(err) => {
                debug!(%method, error = ?err, "request failed");
                err.to_document()
            },
        }
    }

    async fn send_sealed<C: TransportConnection>(
        &self,
        conn: &mut C,
        secret: &SharedSecret,
        document: &Value,
    ) -> Result<(), DispatchError> {
        let plaintext = serde_json::to_vec(document).map_err(ProtocolError::from)?;
        let text = EncryptedFrame::from_envelope(&seal(secret, &plaintext)).to_json()?;
        conn.send(text).await?;
        Ok(())
    }

    async fn terminate(&self, session: &Session) {
        let departure = self.registry.retire(session);

        if let Some(Departure { identity, last_session: true }) = departure {
            debug!(%identity, "identity offline");
            self.service.on_offline(&identity, &self.registry).await;
        }

        self.registry.remove(session.id());
        info!("connection closed");
    }
}

async fn execute<C: TransportConnection>(conn: &mut C, action: ConnectionAction) {
    match action {
        ConnectionAction::Close { code, reason } => {
            info!(code = code.to_u16(), %reason, "closing connection");
            conn.close(code.to_u16(), code.reason()).await;
        },
    }
}

impl<S, E> std::fmt::Debug for Dispatcher<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
