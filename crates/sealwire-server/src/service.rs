//! Demo business layer.
//!
//! A small in-memory stand-in for a real application: it authenticates by
//! name or one-time code, answers presence queries, relays messages and call
//! signalling, and announces presence changes. Nothing is persisted and no
//! credentials are checked.

use std::{
    collections::HashMap,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use sealwire_core::{Environment, Identity, RequestContext, Service, ServiceError, SessionRegistry};
use sealwire_proto::Request;
use serde_json::{Value, json};
use tracing::{debug, info};

/// How long a one-time code stays valid
pub const CODE_TTL: Duration = Duration::from_secs(5 * 60);

/// Call signalling methods relayed verbatim to the target's sessions
const CALL_METHODS: [&str; 5] =
    ["call.offer", "call.answer", "call.ice_candidate", "call.hangup", "call.reject"];

/// One-time code awaiting verification, kept in the session's scratch.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingCode {
    email: String,
    code: String,
}

/// In-memory demo service.
pub struct DemoService<E> {
    env: E,
    last_seen: Mutex<HashMap<Identity, u64>>,
    issued_codes: Mutex<HashMap<String, String>>,
    next_message_id: AtomicU64,
}

impl<E: Environment> DemoService<E> {
    /// Service drawing codes and expiry times from `env`
    pub fn new(env: E) -> Self {
        Self {
            env,
            last_seen: Mutex::new(HashMap::new()),
            issued_codes: Mutex::new(HashMap::new()),
            next_message_id: AtomicU64::new(1),
        }
    }

    /// Most recent code issued for `email`.
    ///
    /// Codes are logged instead of mailed; this is the same value.
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.issued_codes.lock().unwrap_or_else(PoisonError::into_inner).get(email).cloned()
    }

    /// Unix time `identity` was last seen going offline
    pub fn last_seen(&self, identity: &Identity) -> Option<u64> {
        self.last_seen.lock().unwrap_or_else(PoisonError::into_inner).get(identity).copied()
    }

    fn echo(request: &Request) -> Value {
        let text = match request.args.get("text") {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        json!({ "type": "response", "data": format!("Echo: {text}") })
    }

    fn login(cx: &RequestContext, request: &Request) -> Result<Value, ServiceError> {
        let identity = identity_arg(&request.args, "user_id")
            .ok_or_else(|| ServiceError::InvalidArgs("User ID required".to_string()))?;
        Self::sign_in(cx, identity)
    }

    fn sign_in(cx: &RequestContext, identity: Identity) -> Result<Value, ServiceError> {
        cx.bind(identity.clone())?;
        cx.broadcast(&presence(&identity, true, None));
        info!(session_id = %cx.session_id(), %identity, "signed in");
        Ok(json!({ "type": "auth_success", "user": { "id": identity.as_str() } }))
    }

    fn request_code(&self, cx: &RequestContext, request: &Request) -> Result<Value, ServiceError> {
        let email = string_arg(&request.args, "email")
            .ok_or_else(|| ServiceError::InvalidArgs("Email required".to_string()))?;
        let purpose = string_arg(&request.args, "type").unwrap_or_else(|| "login".to_string());
        if purpose != "login" {
            return Err(ServiceError::Rejected(format!("Unsupported code type: {purpose}")));
        }

        let code = (10_000 + self.env.random_u64() % 90_000).to_string();
        let deadline = self.env.now() + CODE_TTL;
        cx.with_scratch(|scratch| {
            scratch.insert_until(PendingCode { email: email.clone(), code: code.clone() }, deadline);
        });

        info!(%email, %code, "one-time code issued");
        self.issued_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(email, code);

        Ok(json!({ "type": "success", "message": "Code sent (check console)" }))
    }

    fn verify_code(&self, cx: &RequestContext, request: &Request) -> Result<Value, ServiceError> {
        let code = string_arg(&request.args, "code");
        let now = self.env.now();

        let pending = cx.with_scratch(|scratch| {
            let matches = scratch
                .get::<PendingCode>(now)
                .is_some_and(|pending| Some(&pending.code) == code.as_ref());
            if matches { scratch.take::<PendingCode>(now) } else { None }
        });

        match pending {
            Some(PendingCode { email, .. }) => Self::sign_in(cx, Identity::new(email)),
            None => Err(ServiceError::Rejected("Invalid code".to_string())),
        }
    }

    fn status(&self, cx: &RequestContext, request: &Request) -> Result<Value, ServiceError> {
        let identity = identity_arg(&request.args, "user_id")
            .ok_or_else(|| ServiceError::InvalidArgs("User ID required".to_string()))?;
        let online = cx.is_reachable(&identity);
        let last_seen = if online { None } else { self.last_seen(&identity) };
        Ok(presence(&identity, online, last_seen))
    }

    fn send_message(&self, cx: &RequestContext, request: &Request) -> Result<Value, ServiceError> {
        let sender = cx.require_identity()?;
        let recipient = identity_arg(&request.args, "peer_id")
            .ok_or_else(|| ServiceError::InvalidArgs("No recipient".to_string()))?;
        let kind = string_arg(&request.args, "type").unwrap_or_else(|| "text".to_string());

        let message = json!({
            "id": self.next_message_id.fetch_add(1, Ordering::Relaxed),
            "sender_id": sender.as_str(),
            "content": request.args.get("text").cloned().unwrap_or(Value::Null),
            "type": kind,
            "is_read": false,
            "created_at": unix_now(),
        });

        cx.push(
            &recipient,
            &json!({
                "type": "message.new",
                "message": message,
                "peer_id": sender.as_str(),
                "sender_id": sender.as_str(),
            }),
        );

        Ok(json!({ "type": "message.new", "message": message, "peer_id": recipient.as_str() }))
    }

    fn call_signal(cx: &RequestContext, request: &Request) -> Result<Value, ServiceError> {
        let sender = cx.require_identity()?;
        let target = identity_arg(&request.args, "target_id")
            .ok_or_else(|| ServiceError::InvalidArgs("Target ID required".to_string()))?;

        let signal = json!({
            "type": request.method,
            "sender_id": sender.as_str(),
            "data": request.args.get("data").cloned().unwrap_or(Value::Null),
        });
        let report = cx.push(&target, &signal);

        if !report.reached_anyone() && request.method == "call.offer" {
            return Err(ServiceError::Rejected("User is offline".to_string()));
        }
        Ok(json!({ "type": "success" }))
    }
}

#[async_trait]
impl<E: Environment> Service for DemoService<E> {
    async fn handle(&self, cx: &RequestContext, request: Request) -> Result<Value, ServiceError> {
        match request.method.as_str() {
            "echo" => Ok(Self::echo(&request)),
            "auth.login" => Self::login(cx, &request),
            "auth.request_code" => self.request_code(cx, &request),
            "auth.verify_code" => self.verify_code(cx, &request),
            "user.status" => self.status(cx, &request),
            "message.send" => self.send_message(cx, &request),
            method if CALL_METHODS.contains(&method) => Self::call_signal(cx, &request),
            other => Err(ServiceError::UnknownMethod(other.to_string())),
        }
    }

    async fn on_offline(&self, identity: &Identity, registry: &SessionRegistry) {
        // A new session may have signed in since the last one left.
        if registry.is_reachable(identity) {
            debug!(%identity, "identity back online, offline notice skipped");
            return;
        }

        let seen = unix_now();
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.clone(), seen);

        let report = registry.broadcast(&presence(identity, false, Some(seen)));
        info!(%identity, notified = report.delivered, "identity offline");
    }
}

impl<E> std::fmt::Debug for DemoService<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemoService").finish_non_exhaustive()
    }
}

/// `user.status` document
fn presence(identity: &Identity, online: bool, last_seen: Option<u64>) -> Value {
    json!({
        "type": "user.status",
        "user_id": identity.as_str(),
        "status": if online { "online" } else { "offline" },
        "last_seen": last_seen.unwrap_or(0),
    })
}

fn string_arg(args: &Value, name: &str) -> Option<String> {
    match args.get(name)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

/// Identity argument given as a string or an integer id
fn identity_arg(args: &Value, name: &str) -> Option<Identity> {
    match args.get(name)? {
        Value::String(text) if !text.is_empty() => Some(Identity::new(text.as_str())),
        Value::Number(number) => Some(Identity::new(number.to_string())),
        _ => None,
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_secs()).unwrap_or(0)
}
