//! TLS-terminated HTTP round trip, using the self-signed fixture cert.

#![cfg(feature = "tls")]

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use netkit::eventloop::EventLoopKind;
use netkit::http::{HttpClient, HttpMethod, HttpResponse, HttpServer, StatusCode};
use netkit::server::{ServerConfig, TlsConfig};
use netkit::transport::TlsContext;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

#[test]
fn tls_terminated_get_round_trip() {
    let config = ServerConfig {
        endpoint: "127.0.0.1:0".to_string(),
        worker_threads: 2,
        event_loop: EventLoopKind::Poll,
        accept_backlog: 16,
        tls: Some(TlsConfig {
            cert_path: fixture("test_cert.pem"),
            key_path: fixture("test_key.pem"),
        }),
    };

    let server = Arc::new(HttpServer::new(config).unwrap());
    server.route(HttpMethod::Get, "/secure", |_req| {
        Ok(HttpResponse::text(StatusCode::OK, "over tls"))
    });
    let addr = server.local_addr();
    let handle = thread::spawn({
        let server = server.clone();
        move || server.run().unwrap()
    });
    thread::sleep(Duration::from_millis(50));

    let ctx = Arc::new(TlsContext::client_trusting(fixture("test_cert.pem")).unwrap());
    let client = HttpClient::new(addr.to_string()).with_tls(ctx);
    let response = client.get("/secure").unwrap();

    assert_eq!(response.status.0, 200);
    assert_eq!(response.body, b"over tls");

    server.stop();
    handle.join().unwrap();
}
