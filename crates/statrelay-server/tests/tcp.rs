//! End-to-end tests over real sockets: ingestion and scraping share a port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use statrelay_collector::Collector;
use statrelay_protocol::{encode_frame, request_head, TERMINATOR};
use statrelay_server::{MetricsServer, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;

async fn start_server() -> (SocketAddr, watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let config = ServerConfig {
        bind: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    };
    let server = MetricsServer::bind(&config, Arc::new(Collector::new()))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        server.serve(rx).await.unwrap();
    });
    (addr, tx, handle)
}

async fn roundtrip(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    response
}

async fn scrape(addr: SocketAddr) -> String {
    roundtrip(
        addr,
        b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await
}

#[tokio::test]
async fn ingest_then_scrape() {
    let (addr, shutdown, server) = start_server().await;

    let mut request = BytesMut::from(request_head("localhost").as_bytes());
    encode_frame(
        br#"{"type":"gauge","name":"widgets","help":"Widgets","value":5,"keys":{"color":"red"}}"#,
        &mut request,
    );
    encode_frame(
        br#"{"type":"counter","name":"jobs_total","help":"Jobs","value":3}"#,
        &mut request,
    );
    request.extend_from_slice(TERMINATOR);

    let response = roundtrip(addr, &request).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");

    let metrics = scrape(addr).await;
    assert!(metrics.starts_with("HTTP/1.1 200 OK\r\n"), "{metrics}");
    assert!(metrics.contains("widgets{color=\"red\"} 5\n"));
    assert!(metrics.contains("jobs_total 3\n"));
    assert!(metrics.contains("collector_metrics_total 2\n"));
    assert!(metrics.contains("collector_sessions_total 1\n"));

    shutdown.send(true).unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn chunks_split_across_writes_are_reassembled() {
    let (addr, shutdown, server) = start_server().await;

    let mut request = BytesMut::from(request_head("localhost").as_bytes());
    encode_frame(
        br#"{"type":"counter","name":"split_total","help":"h","value":1}"#,
        &mut request,
    );
    request.extend_from_slice(TERMINATOR);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    for piece in request.chunks(7) {
        stream.write_all(piece).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(scrape(addr).await.contains("split_total 1\n"));

    shutdown.send(true).unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let (addr, shutdown, server) = start_server().await;

    let response = roundtrip(
        addr,
        b"GET /elsewhere HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");

    shutdown.send(true).unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn garbage_request_gets_bad_request() {
    let (addr, shutdown, server) = start_server().await;

    let response = roundtrip(addr, b"\x00\x01\x02 nonsense\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400"), "{response}");

    shutdown.send(true).unwrap();
    server.await.unwrap();
}
