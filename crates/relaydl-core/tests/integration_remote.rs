//! Drives the curl client and the download service against a scripted local API server.

mod common;

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

use common::api_server::{self, ApiScript};
use relaydl_core::config::{normalize_base_url, MemorySettings, RelayConfig, RetryConfig, SettingKey, TimeoutConfig};
use relaydl_core::ledger::{EntryStatus, Ledger};
use relaydl_core::orchestrator::JobOutcome;
use relaydl_core::remote::{CurlRemote, RemoteError, RemoteJobHandle, RemoteJobs, RemotePhase, SubmitBody};
use relaydl_core::request::{JobLabel, JobRequest};
use relaydl_core::retry::{classify, ErrorKind};
use relaydl_core::service::DownloadService;

const INFO: &str = r#"{
    "id": "x1",
    "title": "Harbour at dusk",
    "uploader": "tide",
    "duration": 61.5,
    "formats": [
        {"format_id": "18", "height": 360, "vcodec": "avc1"},
        {"format_id": "22", "height": 720, "vcodec": "avc1"},
        {"format_id": "140", "vcodec": "none", "acodec": "mp4a"}
    ]
}"#;

fn client(base: &str) -> CurlRemote {
    CurlRemote::new(normalize_base_url(base).unwrap(), TimeoutConfig::default())
}

fn artifact(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn metadata_and_submit_body_over_http() {
    let server = api_server::start(ApiScript {
        info: INFO.to_string(),
        start: (200, r#"{"task_id":"t-42"}"#.to_string()),
        ..Default::default()
    });
    let remote = client(&server.base_url);

    let meta = remote.fetch_metadata("https://video.example/watch?v=1").unwrap();
    assert_eq!(meta.title.as_deref(), Some("Harbour at dusk"));
    assert_eq!(meta.available_heights(), vec![720, 360]);

    let handle = remote
        .submit(&SubmitBody {
            url: "https://video.example/watch?v=1".into(),
            format: None,
            audio_only: false,
            audio_format: None,
            quality: Some(720),
        })
        .unwrap();
    assert_eq!(handle.as_str(), "t-42");

    assert_eq!(server.log(), vec!["POST /info", "POST /download/start"]);
    let bodies = server.bodies();
    let info: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(info["url"], "https://video.example/watch?v=1");
    let start: serde_json::Value = serde_json::from_str(&bodies[1]).unwrap();
    assert_eq!(start["quality"], 720);
    assert_eq!(start["audio_only"], false);
    assert!(start.get("format").is_none(), "unset fields are omitted: {}", bodies[1]);
}

#[test]
fn poll_normalizes_status_and_cancel_posts() {
    let server = api_server::start(ApiScript {
        statuses: vec![
            r#"{"progress": 3}"#.to_string(),
            r#"{"status":"downloading","progress":140.0,"speed":"1.2MiB/s"}"#.to_string(),
            r#"{"status":"finished","progress":100,"filename":"out.mp4"}"#.to_string(),
        ],
        ..Default::default()
    });
    let remote = client(&server.base_url);
    let handle = RemoteJobHandle::new("t-1");

    let first = remote.poll(&handle).unwrap();
    assert_eq!(first.phase, RemotePhase::Queued);
    assert_eq!(first.result_filename, None);

    let second = remote.poll(&handle).unwrap();
    assert_eq!(second.phase, RemotePhase::Downloading);
    assert_eq!(second.percent, 100.0);
    assert_eq!(second.transfer_rate.as_deref(), Some("1.2MiB/s"));

    let third = remote.poll(&handle).unwrap();
    assert_eq!(third.phase, RemotePhase::Completed);
    assert_eq!(third.result_filename.as_deref(), Some("out.mp4"));

    remote.cancel(&handle).unwrap();
    assert_eq!(server.count("GET /task/t-1"), 3);
    assert_eq!(server.count("POST /download/cancel/t-1"), 1);
}

#[test]
fn http_errors_and_unreachable_server_are_classified() {
    let server = api_server::start(ApiScript {
        start: (500, r#"{"detail":"boom"}"#.to_string()),
        ..Default::default()
    });
    let remote = client(&server.base_url);
    let body = SubmitBody {
        url: "https://video.example/a".into(),
        format: Some("18".into()),
        audio_only: false,
        audio_format: None,
        quality: None,
    };
    match remote.submit(&body) {
        Err(RemoteError::Http { status, body }) => {
            assert_eq!(status, 500);
            assert!(body.contains("boom"), "body kept for diagnostics: {}", body);
        }
        other => panic!("expected HTTP 500, got {:?}", other.map(|h| h.to_string())),
    }

    let missing = remote.fetch_artifact("nope.mp4").err().expect("404 artifact");
    assert!(matches!(missing, RemoteError::Http { status: 404, .. }));
    assert_eq!(classify(&missing), ErrorKind::Other);

    let offline = client(&api_server::closed_port_url());
    let err = offline.fetch_metadata("https://video.example/a").unwrap_err();
    assert_eq!(classify(&err), ErrorKind::Connection, "refused connect: {}", err);
}

#[test]
fn artifact_streams_complete_body() {
    let data = artifact(300_000);
    let server = api_server::start(ApiScript {
        files: HashMap::from([("clip 1.mp4".to_string(), data.clone())]),
        ..Default::default()
    });
    let remote = client(&server.base_url);

    let mut stream = remote.fetch_artifact("clip 1.mp4").unwrap();
    assert_eq!(stream.content_length(), Some(data.len() as u64));
    let mut got = Vec::new();
    stream.read_to_end(&mut got).unwrap();
    assert_eq!(got.len(), data.len());
    assert!(got == data, "artifact bytes differ");
    // Size lookup then the transfer itself, both with the decoded name.
    assert_eq!(server.log(), vec!["HEAD /files/clip 1.mp4", "GET /files/clip 1.mp4"]);
}

#[test]
fn truncated_artifact_is_a_read_error() {
    let server = api_server::start(ApiScript {
        files: HashMap::from([("cut.mp4".to_string(), artifact(100_000))]),
        truncate_files_at: Some(40_000),
        ..Default::default()
    });
    let remote = client(&server.base_url);
    let mut stream = remote.fetch_artifact("cut.mp4").unwrap();
    let mut got = Vec::new();
    assert!(stream.read_to_end(&mut got).is_err(), "short body must not look complete");
    assert!(got.len() <= 40_000);
}

fn fast_config() -> RelayConfig {
    RelayConfig {
        poll_interval_ms: 10,
        poll_failure_ceiling: 3,
        retry: Some(RetryConfig {
            max_attempts: 2,
            base_delay_secs: 0.01,
            max_delay_secs: 1,
        }),
        ..RelayConfig::default()
    }
}

async fn service_against(server: &api_server::ApiServer, folder: &std::path::Path) -> DownloadService {
    let settings = MemorySettings::new()
        .with(SettingKey::BaseUrl, server.base_url.clone())
        .with(SettingKey::DownloadLocation, folder.to_string_lossy());
    let ledger = Ledger::open_memory().await.unwrap();
    DownloadService::new(ledger, Arc::new(settings), fast_config())
}

#[tokio::test]
async fn service_downloads_end_to_end() {
    let data = artifact(200_000);
    let server = api_server::start(ApiScript {
        info: INFO.to_string(),
        start: (200, r#"{"task_id":"e2e"}"#.to_string()),
        statuses: vec![
            r#"{"status":"pending","progress":0}"#.to_string(),
            r#"{"status":"processing","progress":40}"#.to_string(),
            r#"{"status":"finished","progress":100,"filename":"harbour.mp4"}"#.to_string(),
        ],
        files: HashMap::from([("harbour.mp4".to_string(), data.clone())]),
        ..Default::default()
    });
    let dir = tempfile::tempdir().unwrap();
    let service = service_against(&server, dir.path()).await;

    let meta = service
        .fetch_metadata("https://video.example/watch?v=1")
        .await
        .unwrap();
    let request = JobRequest {
        source_url: "https://video.example/watch?v=1".into(),
        desired_height: meta.available_heights().first().copied(),
        ..Default::default()
    };
    let started = service
        .start(&request, JobLabel::from_metadata(&meta))
        .await
        .unwrap();

    let outcome = service.join(started.id).await.expect("job was spawned here");
    let location = match outcome {
        JobOutcome::Completed { location } => location,
        other => panic!("expected completion, got {:?}", other.status()),
    };
    assert_eq!(location.path(), dir.path().join("harbour.mp4"));
    let written = std::fs::read(location.path()).unwrap();
    assert!(written == data, "artifact content differs");

    let entry = service.ledger().get(started.id).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Completed);
    assert_eq!(entry.title, "Harbour at dusk");
    assert_eq!(entry.uploader, "tide");
    assert_eq!(entry.artifact_location.as_deref(), Some(location.path().to_str().unwrap()));
    assert_eq!(service.reporter().latest(started.id).map(|e| e.percent), Some(100));

    assert_eq!(server.count("POST /download/cancel"), 0);
    let start: serde_json::Value = serde_json::from_str(&server.bodies()[1]).unwrap();
    assert_eq!(start["quality"], 720);

    let history = service.history(&HashSet::new()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, EntryStatus::Completed);
}

#[tokio::test]
async fn interrupted_transfer_fails_without_leftovers() {
    let server = api_server::start(ApiScript {
        statuses: vec![r#"{"status":"finished","filename":"cut.mp4"}"#.to_string()],
        files: HashMap::from([("cut.mp4".to_string(), artifact(150_000))]),
        truncate_files_at: Some(10_000),
        ..Default::default()
    });
    let dir = tempfile::tempdir().unwrap();
    let service = service_against(&server, dir.path()).await;

    let request = JobRequest {
        source_url: "https://video.example/b".into(),
        format_selector: Some("best".into()),
        ..Default::default()
    };
    let started = service.start(&request, JobLabel::default()).await.unwrap();
    let outcome = service.join(started.id).await.unwrap();
    assert_eq!(outcome.status(), EntryStatus::Failed);

    let entry = service.ledger().get(started.id).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Failed);
    assert_eq!(entry.artifact_location, None);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "no partial or staged file may remain");
}

#[tokio::test]
async fn remote_failure_is_recorded() {
    let server = api_server::start(ApiScript {
        statuses: vec![r#"{"status":"failed","message":"unsupported site"}"#.to_string()],
        ..Default::default()
    });
    let dir = tempfile::tempdir().unwrap();
    let service = service_against(&server, dir.path()).await;

    let request = JobRequest {
        source_url: "https://video.example/c".into(),
        audio_only: true,
        audio_format: Some("mp3".into()),
        ..Default::default()
    };
    let started = service.start(&request, JobLabel::default()).await.unwrap();
    match service.join(started.id).await.unwrap() {
        JobOutcome::Failed(e) => assert!(e.to_string().contains("unsupported site"), "{}", e),
        other => panic!("expected failure, got {:?}", other.status()),
    }
    let entry = service.ledger().get(started.id).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Failed);
    assert!(entry.is_audio);
    assert_eq!(server.count("GET /files"), 0);
    assert_eq!(server.count("HEAD /files"), 0);
}
