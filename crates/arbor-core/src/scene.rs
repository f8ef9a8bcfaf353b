//! Scene documents: the on-disk JSON form of a scene graph and its view

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SceneError;
use crate::graph::{SceneEntity, SceneGraph};
use crate::model::{Id, ViewSettings};

/// Default scene file name looked up in the working directory.
pub const DEFAULT_SCENE_FILE: &str = "scene.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_partition_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: Id,
    pub parent_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub id: Id,
    pub model_id: Id,
    pub category_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Id>,
    #[serde(default = "default_class_name")]
    pub class_name: String,
}

fn default_class_name() -> String {
    "Generic:PhysicalObject".to_string()
}

/// A complete scene: hierarchy entities plus the initial view settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDocument {
    pub subjects: Vec<SubjectRecord>,
    pub models: Vec<ModelRecord>,
    pub categories: Vec<CategoryRecord>,
    pub elements: Vec<ElementRecord>,
    pub view: ViewSettings,
}

impl SceneDocument {
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a scene document from disk.
    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let json = std::fs::read_to_string(path)?;
        let document = Self::from_json(&json)?;
        tracing::debug!(
            "Scene loaded from {}: {} subjects, {} models, {} elements",
            path.display(),
            document.subjects.len(),
            document.models.len(),
            document.elements.len()
        );
        Ok(document)
    }

    /// Serialize the document as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), SceneError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::debug!("Scene saved: {}", path.display());
        Ok(())
    }

    /// Validate references and build the scene graph.
    pub fn to_graph(&self) -> Result<SceneGraph, SceneError> {
        let subjects = self.subjects.iter().map(|s| SceneEntity::Subject {
            id: s.id,
            parent_id: s.parent_id,
            target_partition_id: s.target_partition_id,
            name: s.name.clone(),
        });
        let models = self.models.iter().map(|m| SceneEntity::Model {
            id: m.id,
            parent_id: m.parent_id,
            name: m.name.clone(),
        });
        let categories = self.categories.iter().map(|c| SceneEntity::Category {
            id: c.id,
            name: c.name.clone(),
        });
        let elements = self.elements.iter().map(|e| SceneEntity::Element {
            id: e.id,
            model_id: e.model_id,
            category_id: e.category_id,
            parent_id: e.parent_id,
            class_name: e.class_name.clone(),
        });
        SceneGraph::from_entities(subjects.chain(models).chain(categories).chain(elements))
    }
}
