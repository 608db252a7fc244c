//! End-to-end loopback scenarios for the HTTP server/client pair.

use std::thread;
use std::time::Duration;

use netkit::eventloop::EventLoopKind;
use netkit::http::{HttpClient, HttpMethod, HttpResponse, HttpServer, StatusCode};
use netkit::server::ServerConfig;

fn spawn_server(server: std::sync::Arc<HttpServer>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        server.run().expect("server loop exited with an error");
    })
}

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
fn small_get_round_trip() {
    let server = std::sync::Arc::new(HttpServer::new(test_config()).unwrap());
    server.route(HttpMethod::Get, "/hello", |_req| {
        Ok(HttpResponse::text(StatusCode::OK, "hello world"))
    });
    let addr = server.local_addr();
    let handle = spawn_server(server.clone());
    thread::sleep(Duration::from_millis(50));

    let client = HttpClient::new(addr.to_string());
    let response = client.get("/hello").unwrap();
    assert_eq!(response.status.0, 200);
    assert_eq!(response.body, b"hello world");

    server.stop();
    handle.join().unwrap();
}

#[test]
fn unknown_path_falls_back_to_404() {
    let server = std::sync::Arc::new(HttpServer::new(test_config()).unwrap());
    server.route(HttpMethod::Get, "/known", |_req| {
        Ok(HttpResponse::text(StatusCode::OK, "ok"))
    });
    let addr = server.local_addr();
    let handle = spawn_server(server.clone());
    thread::sleep(Duration::from_millis(50));

    let client = HttpClient::new(addr.to_string());
    let response = client.get("/does-not-exist").unwrap();
    assert_eq!(response.status.0, 404);

    server.stop();
    handle.join().unwrap();
}

#[test]
fn handler_returned_status_becomes_error_response() {
    let server = std::sync::Arc::new(HttpServer::new(test_config()).unwrap());
    server.route(HttpMethod::Post, "/restricted", |_req| Err(StatusCode::FORBIDDEN));
    let addr = server.local_addr();
    let handle = spawn_server(server.clone());
    thread::sleep(Duration::from_millis(50));

    let client = HttpClient::new(addr.to_string());
    let response = client.post("/restricted", Vec::new()).unwrap();
    assert_eq!(response.status.0, 403);

    server.stop();
    handle.join().unwrap();
}

#[test]
fn pipelined_requests_each_get_their_own_response_in_order() {
    let server = std::sync::Arc::new(HttpServer::new(test_config()).unwrap());
    server.route(HttpMethod::Get, "/one", |_req| Ok(HttpResponse::text(StatusCode::OK, "one")));
    server.route(HttpMethod::Get, "/two", |_req| Ok(HttpResponse::text(StatusCode::OK, "two")));
    let addr = server.local_addr();
    let handle = spawn_server(server.clone());
    thread::sleep(Duration::from_millis(50));

    use std::io::{Read, Write};
    let mut stream = std::net::TcpStream::connect(addr).unwrap();
    stream
        .write_all(b"GET /one HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\nGET /two HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n")
        .unwrap();

    let mut buf = Vec::new();
    stream.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(3).filter(|w| *w == b"two").count() > 0 {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    let text = String::from_utf8_lossy(&buf);
    assert!(text.contains("one"));
    assert!(text.contains("two"));
    assert!(text.find("one").unwrap() < text.find("two").unwrap());

    server.stop();
    handle.join().unwrap();
}

#[test]
fn body_split_across_reads_is_reassembled() {
    let server = std::sync::Arc::new(HttpServer::new(test_config()).unwrap());
    server.route(HttpMethod::Post, "/echo", |req| {
        Ok(HttpResponse::new(StatusCode::OK)
            .with_header("Content-Length", req.body.len().to_string())
            .with_body(req.body.clone()))
    });
    let addr = server.local_addr();
    let handle = spawn_server(server.clone());
    thread::sleep(Duration::from_millis(50));

    use std::io::{Read, Write};
    let mut stream = std::net::TcpStream::connect(addr).unwrap();
    let body = b"0123456789abcdef";
    let head = format!("POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n", body.len());
    stream.write_all(head.as_bytes()).unwrap();
    thread::sleep(Duration::from_millis(20));
    stream.write_all(&body[..8]).unwrap();
    thread::sleep(Duration::from_millis(20));
    stream.write_all(&body[8..]).unwrap();

    stream.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                break;
            }
            Err(_) => break,
        }
    }
    assert!(String::from_utf8_lossy(&buf).ends_with("0123456789abcdef"));

    server.stop();
    handle.join().unwrap();
}
