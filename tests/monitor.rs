use actix_web::{test, web, App};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use durability_monitor::app_state::AppState;
use durability_monitor::backend::config::{BackendConfig, BackendKind};
use durability_monitor::backend::local_store::LocalObjectStore;
use durability_monitor::backend::{EncryptionKey, ObjectBackend};
use durability_monitor::config::RuntimeConfig;
use durability_monitor::monitor::prepare;
use durability_monitor::service::check_engine::{CheckMode, EngineState};
use durability_monitor::status::StatusStore;
use durability_monitor::web::handlers;

const API_KEY: &str = "integration-key";
const BUCKET: &str = "file-durability";

fn runtime_config(dir: &TempDir, mode: CheckMode) -> RuntimeConfig {
    let file = dir.path().join("testfile.bin");
    std::fs::write(&file, b"hello world").unwrap();

    RuntimeConfig {
        backend: BackendConfig {
            kind: BackendKind::Local,
            satellite_addr: "localhost".to_string(),
            api_key: API_KEY.to_string(),
            encryption_key: EncryptionKey::from_passphrase("you'll never guess this"),
            bucket: BUCKET.to_string(),
            base_path: dir.path().join("objects"),
        },
        object_prefix: Some("durability".to_string()),
        reference_file: file,
        check_interval: Duration::from_millis(100),
        check_mode: mode,
        listen: "127.0.0.1:0".to_string(),
    }
}

async fn wait_for(status: &StatusStore, what: &str, condition: impl Fn(&StatusStore) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition(status) {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_corrupted_remote_object_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = runtime_config(&dir, CheckMode::SingleFlight);
    let monitor = prepare(&config).await.unwrap();
    let status = Arc::clone(&monitor.status);
    let object_path = monitor.object_path.clone();

    let cancel = CancellationToken::new();
    let handle = monitor.engine.spawn(cancel.clone());
    wait_for(&status, "two checks", |s| s.read().records.len() >= 2).await;
    assert!(status.read().records.values().all(|r| r.success));
    assert_eq!(handle.state(), EngineState::Running);

    // Overwrite the stored object behind the monitor's back
    let tamper = LocalObjectStore::connect(&config.backend.base_path, API_KEY, BUCKET).await.unwrap();
    tamper.upload_object(&object_path, Bytes::from_static(b"hello w0rld")).await.unwrap();

    wait_for(&status, "a failed check", |s| s.read().records.values().any(|r| !r.success)).await;
    cancel.cancel();
    handle.wait().await.unwrap();

    let snapshot = status.read();
    let sequences: Vec<u64> = snapshot.records.keys().copied().collect();
    assert_eq!(sequences, (1..=sequences.len() as u64).collect::<Vec<_>>());
    let failed = snapshot.records.values().find(|r| !r.success).unwrap();
    assert!(failed.error_detail.as_deref().unwrap().contains("got different object back"));
    assert!(snapshot.success_percentage < 100.0);

    // Nothing is recorded after shutdown
    let count = snapshot.records.len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(status.read().records.len(), count);
}

#[tokio::test]
async fn test_modified_reference_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = runtime_config(&dir, CheckMode::Overlapping);
    let monitor = prepare(&config).await.unwrap();
    let status = Arc::clone(&monitor.status);

    let cancel = CancellationToken::new();
    let handle = monitor.engine.spawn(cancel.clone());
    wait_for(&status, "one check", |s| !s.read().records.is_empty()).await;

    std::fs::write(&config.reference_file, b"hello there").unwrap();
    wait_for(&status, "a failed check", |s| s.read().records.values().any(|r| !r.success)).await;

    cancel.cancel();
    handle.wait().await.unwrap();
}

#[actix_web::test]
async fn test_status_page_serves_engine_results() {
    let dir = TempDir::new().unwrap();
    let config = runtime_config(&dir, CheckMode::SingleFlight);
    let monitor = prepare(&config).await.unwrap();
    let status = Arc::clone(&monitor.status);

    let cancel = CancellationToken::new();
    let handle = monitor.engine.spawn(cancel.clone());
    wait_for(&status, "one check", |s| !s.read().records.is_empty()).await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState::new(Arc::clone(&status))))
            .configure(handlers::configure),
    )
    .await;
    let req = test::TestRequest::get().uri("/").to_request();
    let body = test::call_and_read_body(&app, req).await;
    let body = std::str::from_utf8(&body).unwrap();

    assert!(body.contains("Current Percentage: 100%"));
    assert!(body.contains("Filename: testfile.bin"));
    assert!(body.contains("Size: 11 Bytes"));
    assert!(body.contains("Check Interval: 100ms"));
    assert!(body.contains("<td>1</td>"));

    cancel.cancel();
    handle.wait().await.unwrap();
}
