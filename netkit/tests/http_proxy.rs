//! End-to-end loopback scenario for the forward-proxy server: an upstream
//! `HttpServer` plus a `ProxyServer` in front of it, relaying a request by
//! `Host` header.

#![cfg(feature = "proxy")]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use netkit::eventloop::EventLoopKind;
use netkit::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpServer, ProxyServer, StatusCode};
use netkit::server::ServerConfig;

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
fn proxy_relays_to_upstream_by_host_header() {
    let upstream = Arc::new(HttpServer::new(test_config()).unwrap());
    upstream.route(HttpMethod::Get, "/", |_req| Ok(HttpResponse::text(StatusCode::OK, "upstream ok")));
    let upstream_addr = upstream.local_addr();
    let upstream_handle = thread::spawn({
        let upstream = upstream.clone();
        move || upstream.run().unwrap()
    });

    let proxy = Arc::new(ProxyServer::new(test_config()).unwrap());
    let proxy_addr = proxy.local_addr();
    let proxy_handle = thread::spawn({
        let proxy = proxy.clone();
        move || proxy.run().unwrap()
    });
    thread::sleep(Duration::from_millis(50));

    let client = HttpClient::new(proxy_addr.to_string());
    let request = HttpRequest::new(HttpMethod::Get, format!("http://{upstream_addr}/"))
        .with_header("Host", upstream_addr.to_string());
    let response = client.send(request).unwrap();

    assert_eq!(response.status.0, 200);
    assert_eq!(response.body, b"upstream ok");
    assert_eq!(proxy.client_pool().len(), 1);

    proxy.stop();
    upstream.stop();
    proxy_handle.join().unwrap();
    upstream_handle.join().unwrap();
}

#[test]
fn proxy_returns_bad_gateway_for_unreachable_upstream() {
    let proxy = Arc::new(ProxyServer::new(test_config()).unwrap());
    let proxy_addr = proxy.local_addr();
    let proxy_handle = thread::spawn({
        let proxy = proxy.clone();
        move || proxy.run().unwrap()
    });
    thread::sleep(Duration::from_millis(50));

    let client = HttpClient::new(proxy_addr.to_string());
    let request = HttpRequest::new(HttpMethod::Get, "http://127.0.0.1:1/")
        .with_header("Host", "127.0.0.1:1");
    let response = client.send(request).unwrap();
    assert_eq!(response.status.0, 502);

    proxy.stop();
    proxy_handle.join().unwrap();
}
