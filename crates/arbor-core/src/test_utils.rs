//! Test utilities for Arbor

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use crate::graph::{SceneBuilder, SceneGraph};

/// Scene document used by the on-disk tests.
pub const SAMPLE_SCENE: &str = r#"{
  "subjects": [
    { "id": "0x1", "name": "Root" },
    { "id": "0x2", "parent_id": "0x1", "name": "Site" }
  ],
  "models": [
    { "id": "0x10", "parent_id": "0x1", "name": "Architecture" },
    { "id": "0x11", "parent_id": "0x2", "name": "Structure" }
  ],
  "categories": [
    { "id": "0x20", "name": "Walls" },
    { "id": "0x21", "name": "Columns" }
  ],
  "elements": [
    { "id": "0x30", "model_id": "0x10", "category_id": "0x20" },
    { "id": "0x31", "model_id": "0x10", "category_id": "0x20", "parent_id": "0x30" },
    { "id": "0x32", "model_id": "0x11", "category_id": "0x21", "class_name": "Structural:Column" }
  ],
  "view": {
    "models": ["0x10"],
    "categories": ["0x20", "0x21"]
  }
}"#;

/// Write [`SAMPLE_SCENE`] into a fresh temporary directory.
pub fn write_sample_scene() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scene.json");
    fs::write(&path, SAMPLE_SCENE).unwrap();
    (temp_dir, path)
}

/// Two subjects, two models, and one assembly under model 0x10.
pub fn assembly_scene() -> SceneGraph {
    SceneBuilder::new()
        .subject(0x1, None)
        .subject(0x2, Some(0x1))
        .model(0x10, 0x1)
        .model(0x11, 0x2)
        .category(0x20)
        .category(0x21)
        .element(0x30, 0x10, 0x20, None)
        .element(0x31, 0x10, 0x21, Some(0x30))
        .element(0x32, 0x10, 0x20, Some(0x31))
        .element(0x33, 0x10, 0x20, None)
        .element(0x40, 0x11, 0x21, None)
        .build()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_sample_scene() {
        let (_dir, path) = write_sample_scene();
        assert!(path.exists());
    }
}
