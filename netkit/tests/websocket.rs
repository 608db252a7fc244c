//! End-to-end WebSocket upgrade + echo round trip.

#![cfg(feature = "ws")]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use netkit::eventloop::EventLoopKind;
use netkit::server::ServerConfig;
use netkit::ws::{WebSocketClient, WebSocketFrame, WebSocketServer};

fn test_config() -> ServerConfig {
    ServerConfig {
        endpoint: "127.0.0.1:0".to_string(),
        worker_threads: 2,
        event_loop: EventLoopKind::Poll,
        accept_backlog: 16,
        #[cfg(feature = "tls")]
        tls: None,
    }
}

#[test]
fn upgrade_handshake_and_echo() {
    let server = Arc::new(WebSocketServer::new(test_config(), "/ws").unwrap());
    server.on_connection(|frame| Ok(Some(frame.clone())));

    let addr = server.local_addr();
    let handle = thread::spawn({
        let server = server.clone();
        move || server.run().unwrap()
    });
    thread::sleep(Duration::from_millis(50));

    let mut client = WebSocketClient::new(addr.to_string());
    client.upgrade("/ws").unwrap();

    client.send_frame(&WebSocketFrame::text("hello there")).unwrap();
    let echoed = client.recv_frame().unwrap();
    assert_eq!(echoed.payload, b"hello there");

    server.stop();
    handle.join().unwrap();
}

#[test]
fn wrong_path_gets_upgrade_required() {
    let server = Arc::new(WebSocketServer::new(test_config(), "/ws").unwrap());
    server.on_connection(|_frame| Ok(None));

    let addr = server.local_addr();
    let handle = thread::spawn({
        let server = server.clone();
        move || server.run().unwrap()
    });
    thread::sleep(Duration::from_millis(50));

    let client = netkit::http::HttpClient::new(addr.to_string());
    let response = client.get("/not-ws").unwrap();
    assert_eq!(response.status.0, 426);

    server.stop();
    handle.join().unwrap();
}
