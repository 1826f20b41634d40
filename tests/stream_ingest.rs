//! FrameSource and SnapshotService against a local MJPEG camera server.
//!
//! The server offers three feeds: `/live` (a frame every 20ms),
//! `/one-then-stall` (one frame, then silence), and `/unavailable` (503),
//! with a per-server connection counter to observe reconnects.

use axum::{body::Body, extract::State, response::Response, routing::get, Router};
use bytes::Bytes;
use image::{Rgb, RgbImage};
use mosaic_camserver::error::{Error, Result};
use mosaic_camserver::frame_source::{FrameSource, SourcePolicy};
use mosaic_camserver::mailbox;
use mosaic_camserver::mjpeg;
use mosaic_camserver::snapshot_service::{SnapshotCache, SnapshotService};
use mosaic_camserver::storage::ObjectStorage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct ServerState {
    connections: Arc<AtomicUsize>,
}

fn jpeg_frame(color: [u8; 3]) -> Bytes {
    mjpeg::encode_jpeg(&RgbImage::from_pixel(32, 24, Rgb(color)), 90).unwrap()
}

fn mjpeg_part(jpeg: &Bytes) -> Bytes {
    let head = format!(
        "--camframe\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = Vec::with_capacity(head.len() + jpeg.len() + 2);
    part.extend_from_slice(head.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

fn mjpeg_response(rx: mpsc::Receiver<std::result::Result<Bytes, std::convert::Infallible>>) -> Response {
    Response::builder()
        .status(200)
        .header(
            "content-type",
            "multipart/x-mixed-replace; boundary=camframe",
        )
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .unwrap()
}

async fn live_feed(State(state): State<ServerState>) -> Response {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        loop {
            if tx.send(Ok(mjpeg_part(&jpeg_frame([10, 200, 50])))).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });
    mjpeg_response(rx)
}

async fn stall_feed(State(state): State<ServerState>) -> Response {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        let _ = tx.send(Ok(mjpeg_part(&jpeg_frame([200, 10, 50])))).await;
        // hold the connection open without ever sending another frame
        tx.closed().await;
    });
    mjpeg_response(rx)
}

async fn unavailable_feed(State(state): State<ServerState>) -> Response {
    state.connections.fetch_add(1, Ordering::SeqCst);
    Response::builder()
        .status(503)
        .body(Body::empty())
        .unwrap()
}

async fn spawn_camera_server() -> (String, Arc<AtomicUsize>) {
    let connections = Arc::new(AtomicUsize::new(0));
    let state = ServerState {
        connections: connections.clone(),
    };

    let app = Router::new()
        .route("/live", get(live_feed))
        .route("/one-then-stall", get(stall_feed))
        .route("/unavailable", get(unavailable_feed))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), connections)
}

fn test_policy() -> SourcePolicy {
    SourcePolicy {
        backoff_unit: Duration::from_millis(10),
        max_failures: 30,
        stall_timeout: Duration::from_millis(150),
        handoff_window: Duration::from_millis(500),
    }
}

fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_placeholder_then_live_frames() {
    let (base, _connections) = spawn_camera_server().await;

    let (tx, mut rx) = mailbox::mailbox();
    let cancel = CancellationToken::new();
    let source = FrameSource::new(0, format!("{base}/live"), test_client(), test_policy())
        .with_placeholder(64, 48);
    let task = tokio::spawn(source.run(tx, cancel.clone()));

    // the blank placeholder arrives before any network frame
    let first = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("placeholder must arrive promptly")
        .unwrap();
    assert_eq!(first.dimensions(), (64, 48));
    assert!(first.pixels().all(|p| p == &Rgb([0, 0, 0])));

    // then the real feed
    let second = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("live frame must arrive")
        .unwrap();
    assert_eq!(second.dimensions(), (32, 24));

    cancel.cancel();
    timeout(Duration::from_secs(1), task)
        .await
        .expect("source must stop promptly on cancellation")
        .unwrap();
}

#[tokio::test]
async fn test_stall_mid_stream_forces_reconnect() {
    let (base, connections) = spawn_camera_server().await;

    let (tx, mut rx) = mailbox::mailbox();
    let cancel = CancellationToken::new();
    let source = FrameSource::new(
        0,
        format!("{base}/one-then-stall"),
        test_client(),
        test_policy(),
    );
    let task = tokio::spawn(source.run(tx, cancel.clone()));

    // keep the mailbox drained so the source never waits on us
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while connections.load(Ordering::SeqCst) < 2 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "source must reconnect after the stall window"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    cancel.cancel();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    drain.await.unwrap();
}

#[tokio::test]
async fn test_unreachable_camera_keeps_retrying() {
    let (base, connections) = spawn_camera_server().await;

    let (tx, mut rx) = mailbox::mailbox();
    let cancel = CancellationToken::new();
    let source = FrameSource::new(
        0,
        format!("{base}/unavailable"),
        test_client(),
        test_policy(),
    )
    .with_placeholder(16, 16);
    let task = tokio::spawn(source.run(tx, cancel.clone()));

    // one placeholder per failed cycle, and nothing else
    for _ in 0..3 {
        let frame = timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("source must keep cycling against a dead camera")
            .unwrap();
        assert_eq!(frame.dimensions(), (16, 16));
        assert!(frame.pixels().all(|p| p == &Rgb([0, 0, 0])));
    }
    assert!(connections.load(Ordering::SeqCst) >= 3);

    cancel.cancel();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_cancel_interrupts_backoff_sleep() {
    let (base, _connections) = spawn_camera_server().await;

    let policy = SourcePolicy {
        backoff_unit: Duration::from_secs(30),
        ..test_policy()
    };
    let (tx, _rx) = mailbox::mailbox();
    let cancel = CancellationToken::new();
    let source = FrameSource::new(0, format!("{base}/unavailable"), test_client(), policy);
    let task = tokio::spawn(source.run(tx, cancel.clone()));

    // let the first connect fail and the long backoff begin
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    timeout(Duration::from_secs(1), task)
        .await
        .expect("cancellation must interrupt the backoff sleep")
        .unwrap();
}

struct RecordingStorage {
    puts: Mutex<Vec<(String, String)>>,
}

#[async_trait::async_trait]
impl ObjectStorage for RecordingStorage {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<u64> {
        self.puts
            .lock()
            .unwrap()
            .push((bucket.to_string(), path.to_string()));
        Ok(data.len() as u64)
    }
}

#[tokio::test]
async fn test_snapshot_cache_serves_uploaded_url() {
    let (base, _connections) = spawn_camera_server().await;

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    let cache = SnapshotCache::spawn(
        format!("{base}/live"),
        test_client(),
        test_policy(),
        &cancel,
        &mut tasks,
    );

    let storage = Arc::new(RecordingStorage {
        puts: Mutex::new(Vec::new()),
    });
    let service = SnapshotService::new(
        cache,
        storage.clone(),
        "test".to_string(),
        "test.zone".to_string(),
    );

    let url = timeout(Duration::from_secs(5), service.serve_snapshot())
        .await
        .expect("populated cache must answer promptly")
        .unwrap();
    assert!(url.starts_with("https://test.test.zone/test/snapshots/"));
    assert!(url.ends_with("/snapshot.jpg"));

    let puts = storage.puts.lock().unwrap();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].0, "test");
    drop(puts);

    cancel.cancel();
    while tasks.join_next().await.is_some() {}
}

#[tokio::test]
async fn test_snapshot_wait_fails_when_camera_unreachable() {
    let (base, _connections) = spawn_camera_server().await;

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    let cache = SnapshotCache::spawn(
        format!("{base}/unavailable"),
        test_client(),
        test_policy(),
        &cancel,
        &mut tasks,
    );

    let result = cache.wait_for_frame(Duration::from_millis(300)).await;
    assert!(matches!(result, Err(Error::Timeout(_))));

    cancel.cancel();
    while tasks.join_next().await.is_some() {}
}
