//! Connection state machine.
//!
//! Tracks handshake progress, the handshake deadline and rejected-frame
//! accounting for one connection. Pure state: time is passed in, decisions come
//! back as [`ConnectionAction`]s, and the dispatcher executes them.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  client_hello  ┌─────────────┐
//! │ Init │───────────────>│ Established │
//! └──────┘                └─────────────┘
//!    │                           │
//!    │ violation/timeout         │ peer gone / too many rejects / evicted
//!    ↓                           ↓
//! ┌────────┐               ┌────────┐
//! │ Closed │               │ Closed │
//! └────────┘               └────────┘
//! ```
//!
//! `Closed` is terminal. A single undecryptable frame never closes an
//! established connection; only a streak of them does.

use std::time::{Duration, Instant};

use sealwire_proto::{CloseCode, DEFAULT_MAX_FRAME_LEN};

use crate::error::ConnectionError;

/// Actions returned by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Close the transport with this code and reason
    Close {
        /// Application close code
        code: CloseCode,
        /// Human-readable reason
        reason: String,
    },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, waiting for the client hello
    Init,
    /// Shared secret derived, envelopes flowing
    Established,
    /// Terminated
    Closed,
}

/// Per-connection limits applied by the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Time allowed between accept and a valid client hello
    pub handshake_timeout: Duration,
    /// Consecutive rejected frames tolerated before force-close.
    ///
    /// `None` never closes, matching the lenient drop-and-continue behavior.
    pub max_consecutive_rejections: Option<u32>,
    /// Capacity of each session's push mailbox
    pub mailbox_capacity: usize,
    /// Largest inbound text frame accepted, in bytes
    pub max_frame_len: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            max_consecutive_rejections: Some(16),
            mailbox_capacity: 256,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Connection state machine.
///
/// No I/O and no stored environment; callers supply `now`.
#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    config: DispatcherConfig,
    /// When the transport was accepted
    opened_at: Instant,
    /// When the handshake completed
    established_at: Option<Instant>,
    /// Rejected frames since the last accepted one
    rejected_streak: u32,
}

impl Connection {
    /// Create a connection in `Init` state
    pub fn new(now: Instant, config: DispatcherConfig) -> Self {
        Self {
            state: ConnectionState::Init,
            config,
            opened_at: now,
            established_at: None,
            rejected_streak: 0,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Configuration this connection was created with
    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Instant by which the client hello must have arrived
    #[must_use]
    pub fn handshake_deadline(&self) -> Instant {
        self.opened_at + self.config.handshake_timeout
    }

    /// When the handshake completed, if it has
    #[must_use]
    pub fn established_at(&self) -> Option<Instant> {
        self.established_at
    }

    /// Rejected frames since the last accepted one
    #[must_use]
    pub fn rejected_streak(&self) -> u32 {
        self.rejected_streak
    }

    /// Transition to `Established` after a valid client hello.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if not in `Init`.
    pub fn establish(&mut self, now: Instant) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Init {
            return Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "establish",
            });
        }

        self.state = ConnectionState::Established;
        self.established_at = Some(now);
        Ok(())
    }

    /// Reject the handshake and close.
    pub fn reject_handshake(&mut self, reason: impl Into<String>) -> ConnectionAction {
        self.close_with(CloseCode::HandshakeViolation, reason.into())
    }

    /// Transition to `Closed`
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Record a frame that could not be decoded or opened.
    ///
    /// Returns a close action once the configured streak is reached.
    pub fn on_frame_rejected(&mut self) -> Option<ConnectionAction> {
        self.rejected_streak = self.rejected_streak.saturating_add(1);

        let limit = self.config.max_consecutive_rejections?;
        if self.state == ConnectionState::Established && self.rejected_streak >= limit {
            let reason = format!("{} consecutive rejected frames", self.rejected_streak);
            return Some(self.close_with(CloseCode::TooManyRejectedFrames, reason));
        }
        None
    }

    /// Record a frame that opened successfully
    pub fn on_frame_accepted(&mut self) {
        self.rejected_streak = 0;
    }

    /// Close because the registry evicted this session
    pub fn evicted(&mut self) -> ConnectionAction {
        self.close_with(CloseCode::Evicted, "session evicted".to_string())
    }

    fn close_with(&mut self, code: CloseCode, reason: String) -> ConnectionAction {
        self.close();
        ConnectionAction::Close { code, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_lifecycle() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, DispatcherConfig::default());
        assert_eq!(conn.state(), ConnectionState::Init);
        assert_eq!(conn.established_at(), None);

        conn.establish(t0).unwrap();
        assert_eq!(conn.state(), ConnectionState::Established);
        assert_eq!(conn.established_at(), Some(t0));

        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn establish_twice_is_invalid() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, DispatcherConfig::default());
        conn.establish(t0).unwrap();

        let result = conn.establish(t0);
        assert!(matches!(result, Err(ConnectionError::InvalidState { .. })));
    }

    #[test]
    fn closed_cannot_establish() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, DispatcherConfig::default());
        conn.reject_handshake("not a client hello");

        let result = conn.establish(t0);
        assert!(matches!(
            result,
            Err(ConnectionError::InvalidState { state: ConnectionState::Closed, .. })
        ));
    }

    #[test]
    fn handshake_deadline_follows_config() {
        let t0 = Instant::now();
        let config =
            DispatcherConfig { handshake_timeout: Duration::from_secs(10), ..Default::default() };
        let mut conn = Connection::new(t0, config);
        assert_eq!(conn.handshake_deadline(), t0 + Duration::from_secs(10));

        let action = conn.reject_handshake("handshake timeout");
        assert_eq!(
            action,
            ConnectionAction::Close {
                code: CloseCode::HandshakeViolation,
                reason: "handshake timeout".to_string(),
            }
        );
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn rejections_before_handshake_never_close() {
        let t0 = Instant::now();
        let config = DispatcherConfig { max_consecutive_rejections: Some(1), ..Default::default() };
        let mut conn = Connection::new(t0, config);

        assert!(conn.on_frame_rejected().is_none());
        assert_eq!(conn.state(), ConnectionState::Init);
    }

    #[test]
    fn rejection_streak_closes_at_limit() {
        let t0 = Instant::now();
        let config = DispatcherConfig { max_consecutive_rejections: Some(3), ..Default::default() };
        let mut conn = Connection::new(t0, config);
        conn.establish(t0).unwrap();

        assert!(conn.on_frame_rejected().is_none());
        assert!(conn.on_frame_rejected().is_none());
        let action = conn.on_frame_rejected();
        assert!(matches!(
            action,
            Some(ConnectionAction::Close { code: CloseCode::TooManyRejectedFrames, .. })
        ));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn accepted_frame_resets_streak() {
        let t0 = Instant::now();
        let config = DispatcherConfig { max_consecutive_rejections: Some(2), ..Default::default() };
        let mut conn = Connection::new(t0, config);
        conn.establish(t0).unwrap();

        assert!(conn.on_frame_rejected().is_none());
        conn.on_frame_accepted();
        assert_eq!(conn.rejected_streak(), 0);
        assert!(conn.on_frame_rejected().is_none());
        assert_eq!(conn.state(), ConnectionState::Established);
    }

    #[test]
    fn unlimited_rejections_never_close() {
        let t0 = Instant::now();
        let config = DispatcherConfig { max_consecutive_rejections: None, ..Default::default() };
        let mut conn = Connection::new(t0, config);
        conn.establish(t0).unwrap();

        for _ in 0..1000 {
            assert!(conn.on_frame_rejected().is_none());
        }
        assert_eq!(conn.state(), ConnectionState::Established);
    }

    #[test]
    fn eviction_closes_with_evicted_code() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, DispatcherConfig::default());
        conn.establish(t0).unwrap();

        let action = conn.evicted();
        assert!(matches!(action, ConnectionAction::Close { code: CloseCode::Evicted, .. }));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
