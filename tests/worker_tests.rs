mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use ip_analyzer::config::AppConfig;
use ip_analyzer::model::ResponseEnvelope;
use ip_analyzer::runtime::{WorkerContext, WorkerServer};
use ip_analyzer::services::LoadedReader;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use common::CountingReader;

async fn start_worker(config: AppConfig) -> (Arc<WorkerContext>, SocketAddr, JoinHandle<()>) {
    let ctx = WorkerContext::new(0, Arc::new(config));
    ctx.readers.store(LoadedReader::new(
        Box::new(CountingReader {
            lookups: Arc::new(AtomicUsize::new(0)),
        }),
        "memory",
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = WorkerServer::from_listener(ctx.clone(), listener);
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(server.run());
    (ctx, addr, handle)
}

/// 发送请求但不关闭写端，服务端靠 JSON 完整性判断请求结束
async fn send(addr: SocketAddr, payload: &[u8]) -> ResponseEnvelope {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();

    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
        .await
        .expect("server closes the connection")
        .unwrap();
    serde_json::from_slice(&reply).unwrap()
}

#[tokio::test]
async fn test_one_request_per_connection() {
    let (ctx, addr, handle) = start_worker(AppConfig::default()).await;

    let pong = send(addr, br#"{"ping":""}"#).await;
    assert_eq!(pong.message.as_deref(), Some("pong"));

    let result = send(addr, br#"{"ip":"8.8.8.8"}"#).await;
    assert!(result.is_success());
    assert_eq!(result.data.unwrap()["city"], "Berlin");

    let status = send(addr, br#"{"status":""}"#).await;
    assert_eq!(status.data, Some(json!({"analyzed": 1, "failed": 0})));

    ctx.recycle.trigger("test finished");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ctx.requests(), 3);
}

#[tokio::test]
async fn test_half_closed_partial_payload() {
    let (ctx, addr, handle) = start_worker(AppConfig::default()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"{\"ip\":").await.unwrap();
    stream.shutdown().await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    let response: ResponseEnvelope = serde_json::from_slice(&reply).unwrap();
    assert_eq!(response.message.as_deref(), Some("payload cannot be empty"));

    ctx.recycle.trigger("test finished");
    handle.await.unwrap();
}

#[tokio::test]
async fn test_max_requests_recycles_worker() {
    let mut config = AppConfig::default();
    config.server.max_requests = 2;
    let (ctx, addr, handle) = start_worker(config).await;

    send(addr, br#"{"ping":""}"#).await;
    assert!(!ctx.recycle.is_triggered());
    send(addr, br#"{"ping":""}"#).await;

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker exits after max requests")
        .unwrap();
    assert!(ctx.recycle.is_triggered());
    assert_eq!(ctx.active_connections(), 0);
}

#[tokio::test]
async fn test_recycle_drains_open_connection() {
    let mut config = AppConfig::default();
    config.server.read_timeout_secs = 1;
    config.server.drain_timeout_secs = 5;
    let (ctx, addr, handle) = start_worker(config).await;

    // 连接保持打开且不发数据，等读超时后才会被处理
    let mut idle = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ctx.active_connections(), 1);

    ctx.recycle.trigger("test");
    let mut reply = Vec::new();
    idle.read_to_end(&mut reply).await.unwrap();
    let response: ResponseEnvelope = serde_json::from_slice(&reply).unwrap();
    assert!(!response.is_success());

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ctx.active_connections(), 0);
}
