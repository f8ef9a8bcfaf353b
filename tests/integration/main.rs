//! Integration tests for Arbor
//!
//! These tests verify that the crates and the CLI work together correctly.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use arbor_core::{Id, SceneDocument, StatusReason, TreeNode, VisibilityStatus};
use arbor_hierarchy::{HierarchyCache, SceneProvider};
use arbor_server::ServerState;
use arbor_server::router::create_router;
use arbor_visibility::{ViewState, VisibilityEngine};
use arbor_watcher::ReloadService;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const SCENE: &str = r#"{
  "subjects": [
    { "id": "0x1", "name": "Campus" },
    { "id": "0x2", "parent_id": "0x1", "name": "Library" }
  ],
  "models": [
    { "id": "0x10", "parent_id": "0x1", "name": "Landscape" },
    { "id": "0x11", "parent_id": "0x2", "name": "Library Shell" }
  ],
  "categories": [
    { "id": "0x20", "name": "Walls" },
    { "id": "0x21", "name": "Doors" }
  ],
  "elements": [
    { "id": "0x30", "model_id": "0x11", "category_id": "0x20" },
    { "id": "0x31", "model_id": "0x11", "category_id": "0x21", "parent_id": "0x30" },
    { "id": "0x32", "model_id": "0x10", "category_id": "0x20" }
  ],
  "view": {
    "models": ["0x10", "0x11"],
    "categories": ["0x20", "0x21"]
  }
}"#;

fn write_scene(dir: &Path) -> PathBuf {
    let path = dir.join("scene.json");
    std::fs::write(&path, SCENE).unwrap();
    path
}

fn arbor(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_arbor"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute arbor")
}

/// Test that the CLI can be invoked
#[test]
fn test_cli_invocation() {
    let output = Command::new(env!("CARGO_BIN_EXE_arbor"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("arbor"));
    assert!(stdout.contains("Hierarchical visibility for spatial models trees"));
}

#[test]
fn test_cli_tree_and_status() {
    let temp_dir = TempDir::new().unwrap();
    write_scene(temp_dir.path());

    let output = arbor(temp_dir.path(), &["tree"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Campus (0x1) [visible]"));
    assert!(stdout.contains("Library Shell (0x11) [visible]"));

    let output = arbor(temp_dir.path(), &["status", "category:0x21@0x11"]);
    assert!(output.status.success());
    let status: VisibilityStatus = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status, VisibilityStatus::visible(StatusReason::CategorySelectorShow));

    let output = arbor(temp_dir.path(), &["status", "nonsense"]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_toggle_saves_view() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_scene(temp_dir.path());

    let output = arbor(temp_dir.path(), &["toggle", "subject:0x2", "off", "--save"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("subject:0x2 -> hidden"));

    let document = SceneDocument::load(&path).unwrap();
    assert_eq!(document.view.models, vec![Id(0x10)]);
}

#[test]
fn test_cli_reads_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("data");
    std::fs::create_dir(&data).unwrap();
    write_scene(&data);
    let config = "[scene]\npath = \"data/scene.json\"\n";
    std::fs::write(temp_dir.path().join("arbor.toml"), config).unwrap();

    let output = arbor(temp_dir.path(), &["status", "model:0x10"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
}

/// Send one HTTP/1.1 request and return the raw response.
async fn http(addr: std::net::SocketAddr, method: &str, path: &str, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_http_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let document = SceneDocument::load(&write_scene(temp_dir.path())).unwrap();
    let provider = Arc::new(SceneProvider::new(document.to_graph().unwrap()));
    let cache = Arc::new(HierarchyCache::new(provider));
    let view = Arc::new(ViewState::from_settings(&document.view));
    let state = Arc::new(ServerState::new(view.clone(), cache));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move { axum::serve(listener, create_router(state)).await });

    let response = http(addr, "GET", "/api/health", "").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(r#""status":"ok""#));

    let body = r#"{"node":{"key":{"type":"model","id":"0x11"}},"visible":false}"#;
    let response = http(addr, "POST", "/api/visibility", body).await;
    assert!(response.starts_with("HTTP/1.1 204"), "{}", response);
    assert_eq!(view.settings().models, vec![Id(0x10)]);

    let body = r#"{"key":{"type":"subject","id":"0x2"}}"#;
    let response = http(addr, "POST", "/api/status", body).await;
    assert!(response.contains(r#""state":"hidden""#), "{}", response);

    let response = http(addr, "GET", "/api/subjects/0x1/models", "").await;
    assert!(response.contains(r#""model_ids":["0x10","0x11"]"#), "{}", response);

    let response = http(addr, "GET", "/api/subjects/zz/models", "").await;
    assert!(response.starts_with("HTTP/1.1 400"));

    server.abort();
}

#[tokio::test]
async fn test_reload_reaches_visibility_engine() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_scene(temp_dir.path());
    let document = SceneDocument::load(&path).unwrap();
    let provider = Arc::new(SceneProvider::new(document.to_graph().unwrap()));
    let cache = Arc::new(HierarchyCache::new(provider.clone()));
    let view = Arc::new(ViewState::from_settings(&document.view));
    let engine = VisibilityEngine::new(view, cache.clone());

    let library = TreeNode::subject(Id(0x2));
    assert!(engine.status(&library).await.is_visible());

    // Move the only library model to a partition nobody views
    let mut changed = document.clone();
    changed.models[1].id = Id(0x12);
    changed.elements.retain(|element| element.model_id != Id(0x11));
    changed.save(&path).unwrap();

    let service = ReloadService::new(&path, provider, cache.clone())
        .with_debounce(Duration::from_millis(1));
    let outcome = service.reload().await.unwrap();
    assert_eq!(outcome.generation, 1);

    assert_eq!(
        engine.status(&library).await,
        VisibilityStatus::hidden(StatusReason::AllModelsHidden)
    );
    assert_eq!(cache.subject_models(Id(0x2)).await.unwrap(), vec![Id(0x12)]);
}
