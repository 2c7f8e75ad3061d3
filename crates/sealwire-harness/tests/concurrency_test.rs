//! Registry behavior under concurrent mutation from many tasks.
//!
//! Each session plays the part of a connection: it binds, then leaves through
//! one of the real exit paths (explicit unbind, or the dispatcher's
//! retire-then-remove teardown) while other tasks broadcast into deliberately
//! tiny mailboxes, so fan-out evictions race every teardown. Each identity
//! goes offline exactly once per round, so exactly one departure per identity
//! may report `last_session`.

use std::{collections::HashMap, sync::Arc};

use sealwire_core::{Departure, Identity, Session, SessionRegistry};
use sealwire_crypto::PublicKey;
use sealwire_harness::SimEnv;
use serde_json::json;
use tokio::sync::{Barrier, Mutex};

const IDENTITIES: usize = 4;
const SESSIONS_PER_IDENTITY: usize = 8;
const BROADCASTERS: usize = 4;
const ROUNDS: usize = 16;

fn identity(index: usize) -> Identity {
    Identity::new(format!("user-{index}"))
}

/// Leave the way a connection would; returns every departure observed
fn depart(registry: &SessionRegistry, session: &Session, explicit_unbind: bool) -> Vec<Departure> {
    let mut seen = Vec::new();
    if explicit_unbind {
        seen.extend(registry.unbind(session));
    }
    seen.extend(registry.retire(session));
    seen.extend(registry.remove(session.id()));
    seen
}

async fn run_round(seed: u64) {
    let env = SimEnv::with_seed(seed);
    let registry = Arc::new(SessionRegistry::new(1));
    let peer = PublicKey::from_decimal("128").unwrap();

    let total = IDENTITIES * SESSIONS_PER_IDENTITY;
    let barrier = Arc::new(Barrier::new(total + BROADCASTERS));
    let departures = Arc::new(Mutex::new(Vec::new()));
    let mut mailboxes = Vec::new();
    let mut tasks = Vec::new();

    for index in 0..total {
        let (session, mailbox) = registry.create_session(&env);
        session.establish(&peer).unwrap();
        // Kept alive and never drained, so the second push finds it full.
        mailboxes.push(mailbox);

        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        let departures = Arc::clone(&departures);
        tasks.push(tokio::spawn(async move {
            assert_eq!(registry.bind(&session, identity(index % IDENTITIES)), None);
            barrier.wait().await;

            tokio::task::yield_now().await;
            let seen = depart(&registry, &session, index % 2 == 0);
            departures.lock().await.extend(seen);
        }));
    }

    for _ in 0..BROADCASTERS {
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            for round in 0..4 {
                registry.broadcast(&json!({ "type": "user.status", "round": round }));
                registry.push(&identity(round % IDENTITIES), &json!({ "type": "message.new" }));
                registry.snapshot().check_invariants().unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = registry.snapshot();
    snapshot.check_invariants().unwrap();
    assert!(registry.is_empty(), "sessions left behind: {snapshot:?}");

    let departures = departures.lock().await;
    let mut per_identity: HashMap<Identity, (usize, usize)> = HashMap::new();
    for departure in departures.iter() {
        let entry = per_identity.entry(departure.identity.clone()).or_default();
        entry.0 += 1;
        if departure.last_session {
            entry.1 += 1;
        }
    }

    for index in 0..IDENTITIES {
        let (all, last) = per_identity.get(&identity(index)).copied().unwrap_or_default();
        assert_eq!(all, SESSIONS_PER_IDENTITY, "seed {seed}: {} departures", identity(index));
        assert_eq!(last, 1, "seed {seed}: {} offline reports", identity(index));
        assert!(!registry.is_reachable(&identity(index)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_teardown_and_fanout_report_each_offline_once() {
    for seed in 0..ROUNDS as u64 {
        run_round(seed).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_binds_keep_index_consistent() {
    let env = SimEnv::with_seed(99);
    let registry = Arc::new(SessionRegistry::new(4));
    let mut tasks = Vec::new();

    for task in 0..16usize {
        let registry = Arc::clone(&registry);
        let env = env.clone();
        tasks.push(tokio::spawn(async move {
            let (session, _mailbox) = registry.create_session(&env);
            for step in 0..64usize {
                registry.bind(&session, identity((task + step) % IDENTITIES));
                if step % 3 == 0 {
                    registry.unbind(&session);
                }
                registry.snapshot().check_invariants().unwrap();
                tokio::task::yield_now().await;
            }
            registry.retire(&session);
            registry.remove(session.id());
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    registry.snapshot().check_invariants().unwrap();
    assert!(registry.is_empty());
    for index in 0..IDENTITIES {
        assert!(!registry.is_reachable(&identity(index)));
    }
}
