//! Arbor Watcher: reloads the scene document when it changes on disk

pub mod watcher;

pub use watcher::{ReloadOutcome, ReloadService, SceneWatcher, WatchEvent};
