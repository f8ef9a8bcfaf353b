//! Core data structures for the spatial hierarchy and its visibility

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IdParseError;

/// Identifier of a subject, model, category or element.
///
/// Rendered as lowercase hex with a `0x` prefix, which is also its serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Id(pub u64);

impl Id {
    /// The reserved "no such entity" id.
    pub const INVALID: Id = Id(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Id(value)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl FromStr for Id {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| IdParseError {
                input: s.to_string(),
                reason: "missing 0x prefix".to_string(),
            })?;
        u64::from_str_radix(digits, 16)
            .map(Id)
            .map_err(|e| IdParseError {
                input: s.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── Provider rows ───────────────────────────────────────────

/// A subject as returned by the hierarchy data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRow {
    pub id: Id,
    pub parent_id: Option<Id>,
    /// Model partition this subject takes ownership of, if any.
    pub target_partition_id: Option<Id>,
}

/// A spatial model and the subject its partition lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRow {
    pub id: Id,
    pub parent_id: Id,
}

/// One (model, category) pair that has at least one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelCategoryRow {
    pub model_id: Id,
    pub category_id: Id,
}

/// An element with its owning model, category and assembly parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRow {
    pub id: Id,
    pub model_id: Id,
    pub category_id: Id,
    pub parent_id: Option<Id>,
}

// ── Tree nodes ──────────────────────────────────────────────

/// Identifies a class grouping node: every listed element shares one class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "GroupingKeyRepr")]
pub struct GroupingKey {
    pub class_name: String,
    element_ids: Vec<Id>,
}

#[derive(Deserialize)]
struct GroupingKeyRepr {
    class_name: String,
    element_ids: Vec<Id>,
}

impl From<GroupingKeyRepr> for GroupingKey {
    fn from(repr: GroupingKeyRepr) -> Self {
        GroupingKey::new(repr.class_name, repr.element_ids)
    }
}

impl GroupingKey {
    /// Members are sorted and de-duplicated so equal groups hash equally.
    pub fn new(class_name: impl Into<String>, element_ids: impl IntoIterator<Item = Id>) -> Self {
        let mut element_ids: Vec<Id> = element_ids.into_iter().collect();
        element_ids.sort_unstable();
        element_ids.dedup();
        GroupingKey {
            class_name: class_name.into(),
            element_ids,
        }
    }

    pub fn element_ids(&self) -> &[Id] {
        &self.element_ids
    }
}

/// Discriminated key carried by every node of the models tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKey {
    Subject { id: Id },
    Model { id: Id },
    Category { id: Id },
    Element { id: Id },
    Grouping { key: GroupingKey },
    /// Anything the tree shows that is neither an instance nor a grouping node.
    Other { description: String },
}

/// Coarse classification of a [`NodeKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Subject,
    Model,
    Category,
    Element,
    Grouping,
    Unknown,
}

impl NodeKey {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeKey::Subject { .. } => NodeKind::Subject,
            NodeKey::Model { .. } => NodeKind::Model,
            NodeKey::Category { .. } => NodeKind::Category,
            NodeKey::Element { .. } => NodeKind::Element,
            NodeKey::Grouping { .. } => NodeKind::Grouping,
            NodeKey::Other { .. } => NodeKind::Unknown,
        }
    }

    /// Instance id for instance keys; `None` for grouping and unclassified keys.
    pub fn instance_id(&self) -> Option<Id> {
        match self {
            NodeKey::Subject { id }
            | NodeKey::Model { id }
            | NodeKey::Category { id }
            | NodeKey::Element { id } => Some(*id),
            NodeKey::Grouping { .. } | NodeKey::Other { .. } => None,
        }
    }
}

/// A models-tree node plus the context the tree attaches out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub key: NodeKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Id>,
    /// Hint from the tree that this element has assembly children.
    #[serde(default)]
    pub has_children: bool,
}

impl TreeNode {
    pub fn new(key: NodeKey) -> Self {
        TreeNode {
            key,
            model_id: None,
            category_id: None,
            has_children: false,
        }
    }

    pub fn subject(id: Id) -> Self {
        Self::new(NodeKey::Subject { id })
    }

    pub fn model(id: Id) -> Self {
        Self::new(NodeKey::Model { id })
    }

    pub fn category(id: Id) -> Self {
        Self::new(NodeKey::Category { id })
    }

    pub fn element(id: Id) -> Self {
        Self::new(NodeKey::Element { id })
    }

    pub fn grouping(key: GroupingKey) -> Self {
        Self::new(NodeKey::Grouping { key })
    }

    pub fn with_model(mut self, model_id: Id) -> Self {
        self.model_id = Some(model_id);
        self
    }

    pub fn with_category(mut self, category_id: Id) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_children(mut self, has_children: bool) -> Self {
        self.has_children = has_children;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.key.kind()
    }
}

// ── Visibility ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityState {
    Visible,
    Hidden,
}

/// Why a node ended up with its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
    // ── Context ─────────────────────────────────────────────
    NonSpatialView,
    UnclassifiedNode,
    MissingContext,
    QueryFailed,

    // ── Subjects and models ─────────────────────────────────
    SomeModelsVisible,
    AllModelsHidden,
    FilteredModelsVisible,
    FilteredModelsHidden,
    ModelShown,
    ModelHidden,

    // ── Categories ──────────────────────────────────────────
    CategoryOverrideShow,
    CategoryOverrideHide,
    CategorySelectorShow,
    CategorySelectorHide,

    // ── Elements and grouping nodes ─────────────────────────
    AlwaysDrawn,
    NeverDrawn,
    ExclusiveAlwaysDrawn,
    SomeMembersAlwaysDrawn,
    AllMembersNeverDrawn,
}

impl StatusReason {
    pub fn description(self) -> &'static str {
        match self {
            StatusReason::NonSpatialView => "view is not spatial",
            StatusReason::UnclassifiedNode => "node kind is not supported",
            StatusReason::MissingContext => "owning model or category is unknown",
            StatusReason::QueryFailed => "hierarchy query failed",
            StatusReason::SomeModelsVisible => "at least one model is visible",
            StatusReason::AllModelsHidden => "all models are hidden",
            StatusReason::FilteredModelsVisible => "a filtered model is visible",
            StatusReason::FilteredModelsHidden => "all filtered models are hidden",
            StatusReason::ModelShown => "model is displayed",
            StatusReason::ModelHidden => "model is not displayed",
            StatusReason::CategoryOverrideShow => "per-model override shows the category",
            StatusReason::CategoryOverrideHide => "per-model override hides the category",
            StatusReason::CategorySelectorShow => "category selector shows the category",
            StatusReason::CategorySelectorHide => "category selector hides the category",
            StatusReason::AlwaysDrawn => "element is always drawn",
            StatusReason::NeverDrawn => "element is never drawn",
            StatusReason::ExclusiveAlwaysDrawn => "only always-drawn elements are displayed",
            StatusReason::SomeMembersAlwaysDrawn => "some grouped elements are always drawn",
            StatusReason::AllMembersNeverDrawn => "all grouped elements are never drawn",
        }
    }
}

/// Computed visibility of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityStatus {
    pub state: VisibilityState,
    pub is_disabled: bool,
    pub reason: StatusReason,
}

impl VisibilityStatus {
    pub fn visible(reason: StatusReason) -> Self {
        VisibilityStatus {
            state: VisibilityState::Visible,
            is_disabled: false,
            reason,
        }
    }

    pub fn hidden(reason: StatusReason) -> Self {
        VisibilityStatus {
            state: VisibilityState::Hidden,
            is_disabled: false,
            reason,
        }
    }

    /// Hidden and not toggleable.
    pub fn disabled(reason: StatusReason) -> Self {
        VisibilityStatus {
            state: VisibilityState::Hidden,
            is_disabled: true,
            reason,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.state == VisibilityState::Visible
    }
}

/// Per-model exception to the category selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryOverride {
    #[default]
    None,
    Show,
    Hide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOverrideEntry {
    pub model_id: Id,
    pub category_id: Id,
    pub value: CategoryOverride,
}

/// Initial display state of a view, as stored alongside a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    pub spatial: bool,
    pub models: Vec<Id>,
    pub categories: Vec<Id>,
    pub overrides: Vec<CategoryOverrideEntry>,
    pub always_drawn: Vec<Id>,
    pub never_drawn: Vec<Id>,
    pub always_drawn_exclusive: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        ViewSettings {
            spatial: true,
            models: Vec::new(),
            categories: Vec::new(),
            overrides: Vec::new(),
            always_drawn: Vec::new(),
            never_drawn: Vec::new(),
            always_drawn_exclusive: false,
        }
    }
}
