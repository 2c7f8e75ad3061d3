//! Demo service flows over the in-memory transport.

use std::sync::Arc;

use sealwire_core::{Dispatcher, DispatcherConfig, Identity, SessionRegistry};
use sealwire_harness::{MemoryConnector, MemoryTransport, SimClient, SimEnv, TestClient};
use sealwire_server::DemoService;
use serde_json::{Value, json};

struct Fixture {
    connector: MemoryConnector,
    registry: Arc<SessionRegistry>,
    service: Arc<DemoService<SimEnv>>,
}

fn start() -> Fixture {
    let env = SimEnv::with_seed(5);
    let (transport, connector) = MemoryTransport::new();
    let config = DispatcherConfig::default();
    let service = Arc::new(DemoService::new(env.clone()));
    let registry = Arc::new(SessionRegistry::new(config.mailbox_capacity));
    let dispatcher = Arc::new(Dispatcher::with_registry(
        Arc::clone(&service),
        Arc::clone(&registry),
        env,
        config,
    ));
    tokio::spawn(dispatcher.run(transport));
    Fixture { connector, registry, service }
}

async fn connect(fixture: &Fixture, private: u64) -> SimClient {
    SimClient::connect(&fixture.connector, TestClient::with_private(private)).await.unwrap()
}

/// Read documents until one of type `kind` arrives
async fn next_of_type(client: &mut SimClient, kind: &str) -> Value {
    loop {
        let doc = client.recv().await.unwrap();
        if doc["type"] == kind {
            return doc;
        }
    }
}

async fn login(client: &mut SimClient, user: &str) {
    let response = client.call("auth.login", json!({ "user_id": user })).await.unwrap();
    assert_eq!(response["type"], "auth_success");
    // Own presence announcement follows the response.
    let status = next_of_type(client, "user.status").await;
    assert_eq!(status["user_id"], user);
}

#[tokio::test]
async fn echo_matches_reference_shape() {
    let fixture = start();
    let mut client = connect(&fixture, 7).await;

    let response = client.call("echo", json!({ "text": "hi" })).await.unwrap();
    assert_eq!(response, json!({ "type": "response", "data": "Echo: hi" }));
}

#[tokio::test]
async fn unknown_method_is_an_error_document() {
    let fixture = start();
    let mut client = connect(&fixture, 7).await;

    let response = client.call("dialogs.get", json!({})).await.unwrap();
    assert_eq!(response, json!({ "type": "error", "message": "Unknown method" }));
}

#[tokio::test]
async fn login_binds_and_announces_presence() {
    let fixture = start();
    let mut watcher = connect(&fixture, 3).await;
    login(&mut watcher, "watcher").await;

    let mut alice = connect(&fixture, 7).await;
    login(&mut alice, "alice").await;
    assert!(fixture.registry.is_reachable(&Identity::new("alice")));

    let status = next_of_type(&mut watcher, "user.status").await;
    assert_eq!(status["user_id"], "alice");
    assert_eq!(status["status"], "online");

    let again = alice.call("auth.login", json!({ "user_id": "bob" })).await.unwrap();
    assert_eq!(again, json!({ "type": "error", "message": "Already authenticated" }));
}

#[tokio::test]
async fn one_time_code_flow() {
    let fixture = start();
    let mut client = connect(&fixture, 7).await;

    let missing = client.call("auth.request_code", json!({})).await.unwrap();
    assert_eq!(missing["message"], "Email required");

    let sent = client.call("auth.request_code", json!({ "email": "a@example.org" })).await.unwrap();
    assert_eq!(sent["type"], "success");
    let code = fixture.service.last_code_for("a@example.org").unwrap();
    assert_eq!(code.len(), 5);

    let wrong = client.call("auth.verify_code", json!({ "code": "00000" })).await.unwrap();
    assert_eq!(wrong, json!({ "type": "error", "message": "Invalid code" }));

    let ok = client.call("auth.verify_code", json!({ "code": code })).await.unwrap();
    assert_eq!(ok["type"], "auth_success");
    assert_eq!(ok["user"]["id"], "a@example.org");
    assert!(fixture.registry.is_reachable(&Identity::new("a@example.org")));

    let announced = next_of_type(&mut client, "user.status").await;
    assert_eq!(announced["status"], "online");
    let replay = client.call("auth.verify_code", json!({ "code": code })).await.unwrap();
    assert_eq!(replay["message"], "Invalid code");
}

#[tokio::test(start_paused = true)]
async fn expired_code_is_refused() {
    let fixture = start();
    let mut client = connect(&fixture, 7).await;

    client.call("auth.request_code", json!({ "email": "late@example.org" })).await.unwrap();
    let code = fixture.service.last_code_for("late@example.org").unwrap();

    tokio::time::advance(sealwire_server::service::CODE_TTL).await;
    let response = client.call("auth.verify_code", json!({ "code": code })).await.unwrap();
    assert_eq!(response["message"], "Invalid code");
}

#[tokio::test]
async fn message_reaches_every_recipient_session() {
    let fixture = start();
    let mut alice = connect(&fixture, 5).await;
    login(&mut alice, "alice").await;

    let mut bob_phone = connect(&fixture, 7).await;
    login(&mut bob_phone, "bob").await;
    let mut bob_laptop = connect(&fixture, 9).await;
    login(&mut bob_laptop, "bob").await;

    let response = alice.call("message.send", json!({ "peer_id": "bob", "text": "hey" })).await.unwrap();
    let response = if response["type"] == "message.new" {
        response
    } else {
        next_of_type(&mut alice, "message.new").await
    };
    assert_eq!(response["peer_id"], "bob");

    for bob in [&mut bob_phone, &mut bob_laptop] {
        let pushed = next_of_type(bob, "message.new").await;
        assert_eq!(pushed["sender_id"], "alice");
        assert_eq!(pushed["message"]["content"], "hey");
    }
}

#[tokio::test]
async fn message_requires_login() {
    let fixture = start();
    let mut client = connect(&fixture, 7).await;

    let response = client.call("message.send", json!({ "peer_id": "bob", "text": "x" })).await.unwrap();
    assert_eq!(response, json!({ "type": "error", "message": "Not authenticated" }));
}

#[tokio::test]
async fn call_offer_to_offline_user_fails() {
    let fixture = start();
    let mut caller = connect(&fixture, 7).await;
    login(&mut caller, "caller").await;

    let response = caller.call("call.offer", json!({ "target_id": "nobody", "data": "sdp" })).await.unwrap();
    assert_eq!(response, json!({ "type": "error", "message": "User is offline" }));

    let hangup = caller.call("call.hangup", json!({ "target_id": "nobody" })).await.unwrap();
    assert_eq!(hangup, json!({ "type": "success" }));
}

#[tokio::test]
async fn call_signal_is_forwarded() {
    let fixture = start();
    let mut caller = connect(&fixture, 7).await;
    login(&mut caller, "caller").await;
    let mut callee = connect(&fixture, 9).await;
    login(&mut callee, "callee").await;

    caller.send("call.offer", json!({ "target_id": "callee", "data": { "sdp": "v=0" } })).unwrap();
    let offer = next_of_type(&mut callee, "call.offer").await;
    assert_eq!(offer["sender_id"], "caller");
    assert_eq!(offer["data"]["sdp"], "v=0");
    let ack = next_of_type(&mut caller, "success").await;
    assert_eq!(ack, json!({ "type": "success" }));
}

#[tokio::test]
async fn disconnect_broadcasts_offline_with_last_seen() {
    let fixture = start();
    let mut watcher = connect(&fixture, 3).await;
    login(&mut watcher, "watcher").await;
    let mut dave = connect(&fixture, 7).await;
    login(&mut dave, "dave").await;
    let online = next_of_type(&mut watcher, "user.status").await;
    assert_eq!(online["status"], "online");

    dave.disconnect();
    let offline = next_of_type(&mut watcher, "user.status").await;
    assert_eq!(offline["user_id"], "dave");
    assert_eq!(offline["status"], "offline");
    assert!(offline["last_seen"].as_u64().unwrap() > 0);

    let status = watcher.call("user.status", json!({ "user_id": "dave" })).await.unwrap();
    assert_eq!(status["status"], "offline");
    assert_eq!(status["last_seen"], offline["last_seen"]);
    assert!(fixture.service.last_seen(&Identity::new("dave")).is_some());
}
