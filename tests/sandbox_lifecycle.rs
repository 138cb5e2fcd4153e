//! End-to-end sandbox lifecycle tests.
//!
//! These exercise the orchestrator, session store, workspace service, and
//! reaper against a real Docker/Podman daemon and a local Redis. They are
//! ignored by default; run with `cargo test -- --ignored` on a machine with
//! both available, or set SKIP_CONTAINER_TESTS=1 to skip explicitly.

use sandboxd::container::orchestrator::short_id;
use sandboxd::container::{DockerRuntime, Orchestrator, Runtime};
use sandboxd::error::Error;
use sandboxd::store::SessionStore;
use sandboxd::workspace::WorkspaceService;
use sandboxd::{Reaper, Settings};
use serial_test::serial;
use std::sync::Arc;
use test_tag::tag;

const REDIS_URL: &str = "redis://localhost:6379/15";

/// Check if container tests should run.
fn should_run_container_tests() -> bool {
    if let Ok(value) = std::env::var("SKIP_CONTAINER_TESTS") {
        if value == "1" || value.eq_ignore_ascii_case("true") {
            return false;
        }
    }

    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
        || std::process::Command::new("podman")
            .arg("info")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
}

fn test_settings() -> Arc<Settings> {
    Arc::new(Settings {
        container_image: "alpine:latest".to_string(),
        max_exec_timeout_seconds: 10,
        ..Settings::default()
    })
}

struct Harness {
    runtime: Arc<dyn Runtime>,
    store: SessionStore,
    orchestrator: Orchestrator,
    workspace: WorkspaceService,
}

async fn harness() -> Option<Harness> {
    let runtime: Arc<dyn Runtime> = Arc::new(DockerRuntime::connect().await.ok()?);
    let store = match SessionStore::connect(REDIS_URL, 60).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Skipping lifecycle tests (Redis not available: {e})");
            return None;
        }
    };
    let settings = test_settings();
    let orchestrator = Orchestrator::new(runtime.clone(), store.clone(), settings);
    let workspace = WorkspaceService::new(runtime.clone());
    Some(Harness {
        runtime,
        store,
        orchestrator,
        workspace,
    })
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, std::process::id())
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker/Podman and Redis
#[tag(integration, container)]
async fn test_happy_exec() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }
    let Some(h) = harness().await else { return };
    let session_id = unique("lc-happy");

    let container_id = h.orchestrator.get_or_create(&session_id, "alice").await.unwrap();
    let result = h
        .orchestrator
        .execute(&container_id, "echo hi", 10, "/workspace")
        .await;

    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "hi\n");
    assert_eq!(result.stderr, "");
    assert!(result.execution_time >= 0.0);

    h.orchestrator.delete(&session_id, "alice").await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker/Podman and Redis
#[tag(integration, container)]
async fn test_exec_timeout_in_band() {
    if !should_run_container_tests() {
        return;
    }
    let Some(h) = harness().await else { return };
    let session_id = unique("lc-timeout");

    let container_id = h.orchestrator.get_or_create(&session_id, "alice").await.unwrap();
    let result = h
        .orchestrator
        .execute(&container_id, "sleep 60", 2, "/workspace")
        .await;

    assert_eq!(result.exit_code, -1);
    assert_eq!(result.stderr, "Command timed out after 2s");
    assert_eq!(result.stdout, "");
    assert!(result.execution_time >= 2.0 && result.execution_time < 4.0);

    h.orchestrator.delete(&session_id, "alice").await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker/Podman and Redis
#[tag(integration, container)]
async fn test_create_is_idempotent() {
    if !should_run_container_tests() {
        return;
    }
    let Some(h) = harness().await else { return };
    let session_id = unique("lc-idem");

    let first = h.orchestrator.get_or_create(&session_id, "alice").await.unwrap();
    let second = h.orchestrator.get_or_create(&session_id, "alice").await.unwrap();
    assert_eq!(first, second);

    // Deleting an absent session is a no-op success
    h.orchestrator.delete(&session_id, "alice").await.unwrap();
    h.orchestrator.delete(&session_id, "alice").await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker/Podman and Redis
#[tag(integration, container)]
async fn test_drift_repair() {
    if !should_run_container_tests() {
        return;
    }
    let Some(h) = harness().await else { return };
    let session_id = unique("lc-drift");

    let first = h.orchestrator.get_or_create(&session_id, "alice").await.unwrap();

    // Kill the container behind the store's back
    h.runtime.remove(&first, true).await.unwrap();

    let second = h.orchestrator.get_or_create(&session_id, "alice").await.unwrap();
    assert_ne!(short_id(&first), short_id(&second));

    // The store record was repaired to the new container
    let stored = h.store.get_container_id(&session_id).await.unwrap().unwrap();
    assert_eq!(stored, second);

    h.orchestrator.delete(&session_id, "alice").await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker/Podman and Redis
#[tag(integration, container)]
async fn test_cross_user_delete_forbidden() {
    if !should_run_container_tests() {
        return;
    }
    let Some(h) = harness().await else { return };
    let session_id = unique("lc-owner");

    h.orchestrator.get_or_create(&session_id, "alice").await.unwrap();

    let err = h.orchestrator.delete(&session_id, "bob").await.unwrap_err();
    assert!(matches!(err, Error::Forbidden));

    // Session survives the rejected delete
    assert!(h.store.get(&session_id).await.unwrap().is_some());

    h.orchestrator.delete(&session_id, "alice").await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker/Podman and Redis
#[tag(integration, container)]
async fn test_workspace_roundtrip() {
    if !should_run_container_tests() {
        return;
    }
    let Some(h) = harness().await else { return };
    let session_id = unique("lc-ws");

    let container_id = h.orchestrator.get_or_create(&session_id, "alice").await.unwrap();

    // Text file, nested path: parents created, content round-trips
    let payload = b"hello workspace\nline two\n";
    h.workspace
        .write(&container_id, "notes/a.txt", payload, 1 << 20)
        .await
        .unwrap();
    let content = h.workspace.read(&container_id, "notes/a.txt", 1 << 20).await.unwrap();
    assert_eq!(content.content.as_bytes(), payload);

    // Payload larger than one write chunk
    let big = vec![b'x'; 60 * 1024];
    h.workspace.write(&container_id, "big.txt", &big, 1 << 20).await.unwrap();
    let content = h.workspace.read(&container_id, "big.txt", 1 << 20).await.unwrap();
    assert_eq!(content.content.len(), big.len());

    // Listing sees both entries, directory flagged as dir
    let entries = h.workspace.list(&container_id, "").await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"big.txt"));
    assert!(names.contains(&"notes"));

    // Missing file maps to path-not-found
    let err = h.workspace.read(&container_id, "nope.txt", 0).await.unwrap_err();
    assert!(matches!(err, Error::PathNotFound));

    // Delete and verify
    h.workspace.delete(&container_id, "notes").await.unwrap();
    let err = h.workspace.list(&container_id, "notes").await.unwrap_err();
    assert!(matches!(err, Error::PathNotFound));

    h.orchestrator.delete(&session_id, "alice").await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker/Podman and Redis
#[tag(integration, container)]
async fn test_reaper_reclaims_aged_container() {
    if !should_run_container_tests() {
        return;
    }
    let Some(h) = harness().await else { return };
    let session_id = unique("lc-reap");

    h.orchestrator.get_or_create(&session_id, "alice").await.unwrap();

    // Age ceiling of zero makes the fresh container immediately eligible
    let settings = Settings {
        container_image: "alpine:latest".to_string(),
        cleanup_max_container_age_seconds: 0,
        ..Settings::default()
    };
    let reaper = Reaper::new(h.runtime.clone(), h.store.clone(), &settings);
    let removed = reaper.sweep().await;
    assert!(removed >= 1);

    assert!(h.store.get(&session_id).await.unwrap().is_none());
}
