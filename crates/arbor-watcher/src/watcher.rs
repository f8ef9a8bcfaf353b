//! Scene file watcher and the reload loop behind it

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arbor_core::SceneDocument;
use arbor_hierarchy::{HierarchyCache, SceneProvider};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Quiet period after the first event before a reload starts.
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Events emitted by the scene watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Scene file created or written
    Changed(PathBuf),
    /// Scene file removed
    Removed(PathBuf),
}

/// Watches the directory holding a scene file and reports events for that file only.
///
/// Editors often replace a file instead of writing it in place, so the parent
/// directory is watched rather than the file itself.
pub struct SceneWatcher {
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
    scene_path: PathBuf,
    watching: bool,
}

impl std::fmt::Debug for SceneWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneWatcher")
            .field("scene_path", &self.scene_path)
            .field("watching", &self.watching)
            .finish()
    }
}

impl SceneWatcher {
    pub fn new(scene_path: impl AsRef<Path>) -> Result<Self> {
        let scene_path = scene_path.as_ref().to_path_buf();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let target = scene_path.clone();
        let watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    debug!("File system event: {:?}", event);
                    Self::handle_notify_event(event, &target, &event_tx);
                }
                Err(e) => {
                    error!("File system watch error: {}", e);
                }
            })?;

        Ok(Self {
            watcher,
            event_rx,
            scene_path,
            watching: false,
        })
    }

    fn handle_notify_event(
        event: notify::Event,
        target: &Path,
        event_tx: &mpsc::UnboundedSender<WatchEvent>,
    ) {
        let make: fn(PathBuf) -> WatchEvent = match event.kind {
            notify::EventKind::Create(_) | notify::EventKind::Modify(_) => WatchEvent::Changed,
            notify::EventKind::Remove(_) => WatchEvent::Removed,
            _ => return,
        };
        for path in event.paths {
            if !is_scene_path(&path, target) {
                continue;
            }
            if let Err(e) = event_tx.send(make(path)) {
                warn!("Failed to send watch event: {}", e);
            }
        }
    }

    /// Start delivering events for the scene file.
    pub fn start(&mut self) -> Result<()> {
        let directory = scene_directory(&self.scene_path);
        self.watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", directory.display()))?;
        self.watching = true;
        info!("Watching scene file: {}", self.scene_path.display());
        Ok(())
    }

    pub fn scene_path(&self) -> &Path {
        &self.scene_path
    }

    pub fn is_watching(&self) -> bool {
        self.watching
    }

    /// Get the event receiver
    pub fn event_receiver(&mut self) -> &mut mpsc::UnboundedReceiver<WatchEvent> {
        &mut self.event_rx
    }
}

fn scene_directory(scene_path: &Path) -> PathBuf {
    match scene_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Compare by file name; notify reports absolute paths even for a relative watch.
fn is_scene_path(path: &Path, scene_path: &Path) -> bool {
    path == scene_path || (path.file_name().is_some() && path.file_name() == scene_path.file_name())
}

/// Result of one successful reload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadOutcome {
    pub generation: u64,
    pub entities: usize,
}

/// Reloads the scene into the provider and invalidates the cache.
pub struct ReloadService {
    scene_path: PathBuf,
    provider: Arc<SceneProvider>,
    cache: Arc<HierarchyCache>,
    events_tx: Option<broadcast::Sender<String>>,
    debounce: Duration,
}

impl ReloadService {
    pub fn new(
        scene_path: impl AsRef<Path>,
        provider: Arc<SceneProvider>,
        cache: Arc<HierarchyCache>,
    ) -> Self {
        Self {
            scene_path: scene_path.as_ref().to_path_buf(),
            provider,
            cache,
            events_tx: None,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Announce reloads as JSON messages on a broadcast channel
    pub fn with_broadcast(mut self, events_tx: broadcast::Sender<String>) -> Self {
        self.events_tx = Some(events_tx);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Read the scene file and make it the active scene.
    ///
    /// On error the previous scene stays active and the cache is untouched.
    pub async fn reload(&self) -> Result<ReloadOutcome> {
        let json = tokio::fs::read_to_string(&self.scene_path)
            .await
            .with_context(|| format!("failed to read {}", self.scene_path.display()))?;
        let graph = SceneDocument::from_json(&json)
            .and_then(|document| document.to_graph())
            .with_context(|| format!("invalid scene document {}", self.scene_path.display()))?;

        let entities = graph.node_count();
        self.provider.replace_scene(graph);
        self.cache.invalidate();

        let outcome = ReloadOutcome {
            generation: self.cache.generation(),
            entities,
        };
        info!(
            "Scene reloaded from {}: {} entities (generation {})",
            self.scene_path.display(),
            outcome.entities,
            outcome.generation
        );

        if let Some(ref events_tx) = self.events_tx {
            let message = serde_json::json!({
                "type": "scene_reloaded",
                "generation": outcome.generation,
                "entities": outcome.entities,
            });
            // No subscribers just means no WebSocket clients are connected
            let _ = events_tx.send(message.to_string());
        }
        Ok(outcome)
    }

    /// Reload on every burst of scene file changes until the watcher closes.
    pub async fn run(&self, mut watcher: SceneWatcher) -> Result<()> {
        if !watcher.is_watching() {
            watcher.start()?;
        }
        let event_rx = watcher.event_receiver();

        while let Some(event) = event_rx.recv().await {
            debug!("Processing watch event: {:?}", event);
            tokio::time::sleep(self.debounce).await;

            let mut latest = event;
            while let Ok(next) = event_rx.try_recv() {
                latest = next;
            }

            match latest {
                WatchEvent::Changed(_) => {
                    if let Err(e) = self.reload().await {
                        warn!("Keeping previous scene: {:#}", e);
                    }
                }
                WatchEvent::Removed(path) => {
                    warn!("Scene file removed: {}; keeping previous scene", path.display());
                }
            }
        }

        info!("Scene watcher closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{Id, SceneBuilder};
    use tempfile::TempDir;
    use tokio::time::{Duration, Instant, sleep};

    const SCENE: &str = r#"{
      "subjects": [{ "id": "0x1" }],
      "models": [
        { "id": "0x10", "parent_id": "0x1" },
        { "id": "0x11", "parent_id": "0x1" }
      ],
      "categories": [{ "id": "0x20" }],
      "elements": [{ "id": "0x30", "model_id": "0x10", "category_id": "0x20" }]
    }"#;

    fn setup() -> (TempDir, PathBuf, Arc<SceneProvider>, Arc<HierarchyCache>) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("scene.json");
        let initial = SceneBuilder::new().subject(0x1, None).model(0x10, 0x1).build().unwrap();
        let provider = Arc::new(SceneProvider::new(initial));
        let cache = Arc::new(HierarchyCache::new(provider.clone()));
        (temp_dir, path, provider, cache)
    }

    #[test]
    fn test_is_scene_path() {
        let scene = Path::new("/data/scene.json");
        assert!(is_scene_path(Path::new("/data/scene.json"), scene));
        assert!(is_scene_path(Path::new("/private/data/scene.json"), scene));
        assert!(!is_scene_path(Path::new("/data/scene.json.swp"), scene));
        assert!(!is_scene_path(Path::new("/data"), Path::new("/")));
    }

    #[test]
    fn test_scene_directory_of_bare_file_name() {
        assert_eq!(scene_directory(Path::new("scene.json")), PathBuf::from("."));
        assert_eq!(scene_directory(Path::new("/data/scene.json")), PathBuf::from("/data"));
    }

    #[tokio::test]
    async fn test_scene_watcher_creation() {
        let temp_dir = TempDir::new().unwrap();
        let mut watcher = SceneWatcher::new(temp_dir.path().join("scene.json")).unwrap();
        assert!(!watcher.is_watching());
        watcher.start().unwrap();
        assert!(watcher.is_watching());
    }

    #[tokio::test]
    async fn test_reload_swaps_scene_and_invalidates() {
        let (_dir, path, provider, cache) = setup();
        assert_eq!(cache.subject_models(Id(0x1)).await.unwrap(), vec![Id(0x10)]);

        let (events_tx, mut events_rx) = broadcast::channel(4);
        let service =
            ReloadService::new(&path, provider.clone(), cache.clone()).with_broadcast(events_tx);
        std::fs::write(&path, SCENE).unwrap();

        let outcome = service.reload().await.unwrap();
        assert_eq!(outcome, ReloadOutcome { generation: 1, entities: 5 });
        assert_eq!(cache.subject_models(Id(0x1)).await.unwrap(), vec![Id(0x10), Id(0x11)]);

        let message = events_rx.recv().await.unwrap();
        let message: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(message["type"], "scene_reloaded");
        assert_eq!(message["generation"], 1);
    }

    #[tokio::test]
    async fn test_invalid_document_keeps_previous_scene() {
        let (_dir, path, provider, cache) = setup();
        let service = ReloadService::new(&path, provider.clone(), cache.clone());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(service.reload().await.is_err());

        // Dangling model parent
        std::fs::write(&path, r#"{"models": [{ "id": "0x10", "parent_id": "0x99" }]}"#).unwrap();
        assert!(service.reload().await.is_err());

        assert_eq!(cache.generation(), 0);
        assert_eq!(provider.scene().node_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let (_dir, path, provider, cache) = setup();
        let service = ReloadService::new(&path, provider, cache);
        let err = service.reload().await.unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[tokio::test]
    async fn test_run_reloads_on_change() {
        let (_dir, path, provider, cache) = setup();
        std::fs::write(&path, "{}").unwrap();

        let mut watcher = SceneWatcher::new(&path).unwrap();
        watcher.start().unwrap();
        let service = Arc::new(
            ReloadService::new(&path, provider.clone(), cache.clone())
                .with_debounce(Duration::from_millis(20)),
        );
        let runner = {
            let service = service.clone();
            tokio::spawn(async move { service.run(watcher).await })
        };

        // Give the watcher a moment to settle
        sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, SCENE).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while cache.generation() == 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(25)).await;
        }
        assert!(cache.generation() >= 1);
        assert_eq!(provider.scene().node_count(), 5);
        runner.abort();
    }
}
