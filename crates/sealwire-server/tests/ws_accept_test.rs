//! Accept loop behavior over real loopback sockets.

use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use sealwire_core::{Dispatcher, DispatcherConfig, SystemEnv};
use sealwire_harness::TestClient;
use sealwire_server::{DemoService, WsTransport};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const UPGRADE_TIMEOUT: Duration = Duration::from_secs(5);

async fn start() -> std::net::SocketAddr {
    let transport = WsTransport::bind("127.0.0.1:0".parse().unwrap(), UPGRADE_TIMEOUT).await.unwrap();
    let addr = transport.local_addr().unwrap();
    let dispatcher =
        Arc::new(Dispatcher::new(DemoService::new(SystemEnv), SystemEnv, DispatcherConfig::default()));
    tokio::spawn(dispatcher.run(transport));
    addr
}

#[tokio::test]
async fn silent_peer_does_not_stall_other_upgrades() {
    let addr = start().await;

    // Opens TCP and never sends the upgrade request.
    let _silent = TcpStream::connect(addr).await.unwrap();

    let (mut socket, _response) =
        tokio::time::timeout(Duration::from_secs(1), connect_async(format!("ws://{addr}/")))
            .await
            .expect("upgrade waited behind the silent peer")
            .unwrap();

    let mut client = TestClient::with_private(7);
    socket.send(Message::Text(client.hello())).await.unwrap();
    let Some(Ok(Message::Text(hello))) = socket.next().await else { panic!("no server hello") };
    client.accept_server_hello(&hello).unwrap();

    socket.send(Message::Text(client.request("echo", json!({ "text": "hi" })).unwrap())).await.unwrap();
    let Some(Ok(Message::Text(reply))) = socket.next().await else { panic!("no reply") };
    assert_eq!(client.open(&reply).unwrap(), json!({ "type": "response", "data": "Echo: hi" }));
}

#[tokio::test]
async fn many_silent_peers_do_not_stall_accept() {
    let addr = start().await;

    let mut silent = Vec::new();
    for _ in 0..8 {
        silent.push(TcpStream::connect(addr).await.unwrap());
    }

    let result =
        tokio::time::timeout(Duration::from_secs(1), connect_async(format!("ws://{addr}/"))).await;
    assert!(matches!(result, Ok(Ok(_))), "upgrade waited behind silent peers");
}
