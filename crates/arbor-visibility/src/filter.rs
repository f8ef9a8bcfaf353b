//! Filtered-tree overlay used while the models tree shows search results

use std::collections::{HashMap, HashSet};

use arbor_core::{NodeKey, TreeNode};
use serde::{Deserialize, Serialize};

/// One node of a filtered tree as the tree hands it over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredNode {
    pub node: TreeNode,
    /// The node itself matched the filter, so its whole subtree applies.
    #[serde(default)]
    pub matches_filter: bool,
    #[serde(default)]
    pub children: Vec<FilteredNode>,
}

impl FilteredNode {
    pub fn matched(node: TreeNode) -> Self {
        FilteredNode {
            node,
            matches_filter: true,
            children: Vec::new(),
        }
    }

    /// A node kept only because some descendant matched.
    pub fn ancestor(node: TreeNode, children: Vec<FilteredNode>) -> Self {
        FilteredNode {
            node,
            matches_filter: false,
            children,
        }
    }
}

/// Which nodes matched the filter and which children survived it.
#[derive(Debug, Clone, Default)]
pub struct FilteredHierarchy {
    matched: HashSet<NodeKey>,
    children: HashMap<NodeKey, Vec<TreeNode>>,
}

impl FilteredHierarchy {
    pub fn from_roots(roots: Vec<FilteredNode>) -> Self {
        let mut hierarchy = FilteredHierarchy::default();
        let mut stack: Vec<FilteredNode> = roots;
        while let Some(entry) = stack.pop() {
            if entry.matches_filter {
                hierarchy.matched.insert(entry.node.key.clone());
            }
            if !entry.children.is_empty() {
                let children = entry.children.iter().map(|child| child.node.clone()).collect();
                hierarchy.children.insert(entry.node.key.clone(), children);
                stack.extend(entry.children);
            }
        }
        hierarchy
    }

    pub fn matches(&self, key: &NodeKey) -> bool {
        self.matched.contains(key)
    }

    /// Children of `key` that survived the filter.
    pub fn children(&self, key: &NodeKey) -> &[TreeNode] {
        self.children.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty() && self.children.is_empty()
    }
}
