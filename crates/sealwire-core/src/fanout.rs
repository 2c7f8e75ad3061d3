//! Encrypted push fan-out.
//!
//! A push is serialized once, then sealed separately for every target session
//! with that session's own secret and queued on its mailbox without waiting.
//! A mailbox that is full or closed counts as a dead connection: the session
//! is pruned from the registry and its dispatcher is told to close, while
//! delivery to the remaining targets carries on.

use std::sync::Arc;

use sealwire_crypto::seal;
use sealwire_proto::EncryptedFrame;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::{
    registry::SessionRegistry,
    session::{Identity, Session, SessionId},
};

/// Outcome of one push or broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Sessions whose mailbox accepted the frame
    pub delivered: usize,
    /// Sessions pruned because their mailbox rejected the frame
    pub pruned: Vec<SessionId>,
}

impl PushReport {
    /// True if at least one session received the push
    pub fn reached_anyone(&self) -> bool {
        self.delivered > 0
    }
}

impl SessionRegistry {
    /// Push `document` to every live session bound to `identity`
    pub fn push(&self, identity: &Identity, document: &Value) -> PushReport {
        let targets = self.sessions_for(identity);
        self.deliver(&targets, document)
    }

    /// Push `document` to every session that has a bound identity
    pub fn broadcast(&self, document: &Value) -> PushReport {
        let targets = self.bound_sessions();
        self.deliver(&targets, document)
    }

    fn deliver(&self, targets: &[Arc<Session>], document: &Value) -> PushReport {
        let mut report = PushReport::default();
        if targets.is_empty() {
            return report;
        }

        let plaintext = match serde_json::to_vec(document) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "push document failed to serialize");
                return report;
            },
        };

        for session in targets {
            let Some(secret) = session.secret() else {
                continue;
            };

            let frame = match EncryptedFrame::from_envelope(&seal(secret, &plaintext)).to_json() {
                Ok(text) => text,
                Err(err) => {
                    warn!(session_id = %session.id(), error = %err, "push frame failed to encode");
                    continue;
                },
            };

            match session.try_push(frame) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    let cause = match err {
                        TrySendError::Full(_) => "mailbox full",
                        TrySendError::Closed(_) => "connection gone",
                    };
                    warn!(session_id = %session.id(), cause, "push failed, pruning session");
                    if self.evict(session) {
                        report.pruned.push(session.id());
                    }
                },
            }
        }

        debug!(
            targets = targets.len(),
            delivered = report.delivered,
            pruned = report.pruned.len(),
            "push fanned out"
        );
        report
    }
}
