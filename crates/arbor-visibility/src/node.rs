//! Classification of tree nodes into visibility targets

use arbor_core::{GroupingKey, Id, NodeKey, TreeNode};

/// What a tree node asks the engine about, with the context it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTarget<'a> {
    Subject(Id),
    Model(Id),
    /// A category shown under a model, or at the root when `model_id` is `None`.
    Category {
        id: Id,
        model_id: Option<Id>,
    },
    Element {
        id: Id,
        model_id: Option<Id>,
        category_id: Option<Id>,
        has_children: bool,
    },
    Grouping {
        key: &'a GroupingKey,
        model_id: Option<Id>,
        category_id: Option<Id>,
    },
    /// Neither an instance of a known kind nor a grouping node.
    Unclassified,
}

/// Classify a node; invalid instance ids are unclassified.
pub fn classify(node: &TreeNode) -> NodeTarget<'_> {
    let model_id = node.model_id.filter(|id| id.is_valid());
    let category_id = node.category_id.filter(|id| id.is_valid());

    match &node.key {
        NodeKey::Grouping { key } => NodeTarget::Grouping {
            key,
            model_id,
            category_id,
        },
        NodeKey::Other { .. } => NodeTarget::Unclassified,
        NodeKey::Subject { id }
        | NodeKey::Model { id }
        | NodeKey::Category { id }
        | NodeKey::Element { id }
            if !id.is_valid() =>
        {
            NodeTarget::Unclassified
        }
        NodeKey::Subject { id } => NodeTarget::Subject(*id),
        NodeKey::Model { id } => NodeTarget::Model(*id),
        NodeKey::Category { id } => NodeTarget::Category { id: *id, model_id },
        NodeKey::Element { id } => NodeTarget::Element {
            id: *id,
            model_id,
            category_id,
            has_children: node.has_children,
        },
    }
}
