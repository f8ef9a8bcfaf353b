//! Arbor Core: identifiers, scene graph, and visibility data model

pub mod error;
pub mod graph;
pub mod model;
pub mod scene;


#[cfg(test)]
pub mod test_utils;

pub use error::{IdParseError, QueryError, QueryResult, SceneError};
pub use graph::{SceneBuilder, SceneEdge, SceneEntity, SceneGraph};
pub use model::{
    CategoryOverride, CategoryOverrideEntry, ElementRow, GroupingKey, Id, ModelCategoryRow,
    ModelRow, NodeKey, NodeKind, StatusReason, SubjectRow, TreeNode, ViewSettings,
    VisibilityState, VisibilityStatus,
};
pub use scene::{DEFAULT_SCENE_FILE, SceneDocument};
