//! Scene graph wrapper using petgraph::StableDiGraph keyed by entity [`Id`]

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

use crate::error::SceneError;
use crate::model::*;

/// One entity of the spatial hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEntity {
    Subject {
        id: Id,
        parent_id: Option<Id>,
        target_partition_id: Option<Id>,
        name: Option<String>,
    },
    Model {
        id: Id,
        parent_id: Id,
        name: Option<String>,
    },
    Category {
        id: Id,
        name: Option<String>,
    },
    Element {
        id: Id,
        model_id: Id,
        category_id: Id,
        parent_id: Option<Id>,
        class_name: String,
    },
}

impl SceneEntity {
    pub fn id(&self) -> Id {
        match self {
            SceneEntity::Subject { id, .. }
            | SceneEntity::Model { id, .. }
            | SceneEntity::Category { id, .. }
            | SceneEntity::Element { id, .. } => *id,
        }
    }

    /// Display label: the explicit name, or the class name for elements.
    pub fn label(&self) -> Option<&str> {
        match self {
            SceneEntity::Subject { name, .. }
            | SceneEntity::Model { name, .. }
            | SceneEntity::Category { name, .. } => name.as_deref(),
            SceneEntity::Element { class_name, .. } => Some(class_name),
        }
    }

    fn as_element_row(&self) -> Option<ElementRow> {
        match self {
            SceneEntity::Element {
                id,
                model_id,
                category_id,
                parent_id,
                ..
            } => Some(ElementRow {
                id: *id,
                model_id: *model_id,
                category_id: *category_id,
                parent_id: *parent_id,
            }),
            _ => None,
        }
    }
}

/// What relationship a scene edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneEdge {
    /// Subject → child subject.
    ChildSubject,
    /// Subject → model whose partition lives under it.
    ContainsModel,
    /// Model → element.
    ContainsElement,
    /// Category → element.
    Categorizes,
    /// Assembly parent → child element.
    ChildElement,
}

/// The spatial hierarchy of subjects, models, categories and elements.
#[derive(Clone)]
pub struct SceneGraph {
    inner: StableDiGraph<SceneEntity, SceneEdge>,
    index: HashMap<Id, NodeIndex>,
}

impl std::fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        SceneGraph {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Build a graph from a flat entity list, linking and validating references.
    pub fn from_entities(
        entities: impl IntoIterator<Item = SceneEntity>,
    ) -> Result<Self, SceneError> {
        let mut graph = SceneGraph::new();
        for entity in entities {
            let id = entity.id();
            if graph.index.contains_key(&id) {
                return Err(SceneError::DuplicateId(id));
            }
            let idx = graph.inner.add_node(entity);
            graph.index.insert(id, idx);
        }
        graph.link()?;
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn link(&mut self) -> Result<(), SceneError> {
        let mut edges = Vec::new();
        for idx in self.inner.node_indices() {
            let Some(entity) = self.inner.node_weight(idx) else {
                continue;
            };
            match entity {
                SceneEntity::Subject {
                    id,
                    parent_id,
                    target_partition_id,
                    ..
                } => {
                    if let Some(parent) = parent_id {
                        let parent_idx = self.expect_kind(*parent, "subject", *id)?;
                        edges.push((parent_idx, idx, SceneEdge::ChildSubject));
                    }
                    if let Some(target) = target_partition_id {
                        self.expect_kind(*target, "model", *id)?;
                    }
                }
                SceneEntity::Model { id, parent_id, .. } => {
                    let parent_idx = self.expect_kind(*parent_id, "subject", *id)?;
                    edges.push((parent_idx, idx, SceneEdge::ContainsModel));
                }
                SceneEntity::Element {
                    id,
                    model_id,
                    category_id,
                    parent_id,
                    ..
                } => {
                    let model_idx = self.expect_kind(*model_id, "model", *id)?;
                    let category_idx = self.expect_kind(*category_id, "category", *id)?;
                    edges.push((model_idx, idx, SceneEdge::ContainsElement));
                    edges.push((category_idx, idx, SceneEdge::Categorizes));
                    if let Some(parent) = parent_id {
                        let parent_idx = self.expect_kind(*parent, "element", *id)?;
                        edges.push((parent_idx, idx, SceneEdge::ChildElement));
                    }
                }
                _ => {}
            }
        }
        for (source, target, edge) in edges {
            self.inner.add_edge(source, target, edge);
        }
        Ok(())
    }

    fn expect_kind(&self, id: Id, kind: &'static str, owner: Id) -> Result<NodeIndex, SceneError> {
        let idx = self.index.get(&id).copied();
        let matches = match (kind, idx.and_then(|idx| self.inner.node_weight(idx))) {
            ("subject", Some(SceneEntity::Subject { .. })) => true,
            ("model", Some(SceneEntity::Model { .. })) => true,
            ("category", Some(SceneEntity::Category { .. })) => true,
            ("element", Some(SceneEntity::Element { .. })) => true,
            _ => false,
        };
        match idx {
            Some(idx) if matches => Ok(idx),
            _ => Err(SceneError::UnknownReference { kind, id, owner }),
        }
    }

    /// Subjects must form a forest and element assemblies must be trees.
    fn check_acyclic(&self) -> Result<(), SceneError> {
        for entity in self.all_entities() {
            let (kind, edge) = match entity {
                SceneEntity::Subject { .. } => ("subject", SceneEdge::ChildSubject),
                SceneEntity::Element { .. } => ("element", SceneEdge::ChildElement),
                _ => continue,
            };
            let start = entity.id();
            let mut seen = HashSet::from([start]);
            let mut current = self.index[&start];
            while let Some(parent) = self.parent_via(current, edge) {
                let parent_id = self.inner[parent].id();
                if !seen.insert(parent_id) {
                    return Err(SceneError::Cycle { kind, id: start });
                }
                current = parent;
            }
        }
        Ok(())
    }

    fn parent_via(&self, idx: NodeIndex, kind: SceneEdge) -> Option<NodeIndex> {
        self.inner
            .edges_directed(idx, Direction::Incoming)
            .find(|e| *e.weight() == kind)
            .map(|e| e.source())
    }

    fn targets_via(&self, idx: NodeIndex, kind: SceneEdge) -> impl Iterator<Item = &SceneEntity> {
        self.inner
            .edges_directed(idx, Direction::Outgoing)
            .filter(move |e| *e.weight() == kind)
            .filter_map(move |e| self.inner.node_weight(e.target()))
    }

    /// Look up an entity by id.
    pub fn entity(&self, id: Id) -> Option<&SceneEntity> {
        self.index.get(&id).and_then(|idx| self.inner.node_weight(*idx))
    }

    pub fn contains(&self, id: Id) -> bool {
        self.index.contains_key(&id)
    }

    /// Total number of entities.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Total number of relationships.
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate over all entities in insertion order.
    pub fn all_entities(&self) -> impl Iterator<Item = &SceneEntity> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
    }

    pub fn subjects(&self) -> Vec<SubjectRow> {
        self.all_entities()
            .filter_map(|e| match e {
                SceneEntity::Subject {
                    id,
                    parent_id,
                    target_partition_id,
                    ..
                } => Some(SubjectRow {
                    id: *id,
                    parent_id: *parent_id,
                    target_partition_id: *target_partition_id,
                }),
                _ => None,
            })
            .collect()
    }

    pub fn models(&self) -> Vec<ModelRow> {
        self.all_entities()
            .filter_map(|e| match e {
                SceneEntity::Model { id, parent_id, .. } => Some(ModelRow {
                    id: *id,
                    parent_id: *parent_id,
                }),
                _ => None,
            })
            .collect()
    }

    /// Distinct (model, category) pairs over all elements, sorted.
    pub fn model_categories(&self) -> Vec<ModelCategoryRow> {
        let mut pairs: Vec<ModelCategoryRow> = self
            .all_entities()
            .filter_map(SceneEntity::as_element_row)
            .map(|row| ModelCategoryRow {
                model_id: row.model_id,
                category_id: row.category_id,
            })
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        pairs.sort_by_key(|row| (row.model_id, row.category_id));
        pairs
    }

    /// Categories that have at least one element in `model_id`, sorted.
    pub fn categories_of_model(&self, model_id: Id) -> Vec<Id> {
        self.model_categories()
            .into_iter()
            .filter(|row| row.model_id == model_id)
            .map(|row| row.category_id)
            .collect()
    }

    /// Top-level elements (no assembly parent) of a model, optionally of one category.
    pub fn root_elements(&self, model_id: Id, category_id: Option<Id>) -> Vec<ElementRow> {
        let Some(&model_idx) = self.index.get(&model_id) else {
            return Vec::new();
        };
        let mut rows: Vec<ElementRow> = self
            .targets_via(model_idx, SceneEdge::ContainsElement)
            .filter_map(SceneEntity::as_element_row)
            .filter(|row| row.parent_id.is_none())
            .filter(|row| category_id.is_none_or(|c| row.category_id == c))
            .collect();
        rows.sort_by_key(|row| row.id);
        rows
    }

    /// Direct assembly children of an element, sorted by id.
    pub fn element_children(&self, element_id: Id) -> Vec<ElementRow> {
        let Some(&idx) = self.index.get(&element_id) else {
            return Vec::new();
        };
        let mut rows: Vec<ElementRow> = self
            .targets_via(idx, SceneEdge::ChildElement)
            .filter_map(SceneEntity::as_element_row)
            .collect();
        rows.sort_by_key(|row| row.id);
        rows
    }

    pub fn element(&self, element_id: Id) -> Option<ElementRow> {
        self.entity(element_id).and_then(SceneEntity::as_element_row)
    }

    /// Rows for the given ids that resolve to elements; unknown ids are skipped.
    pub fn elements(&self, ids: &[Id]) -> Vec<ElementRow> {
        ids.iter().filter_map(|id| self.element(*id)).collect()
    }

    /// Members of a class grouping node whose class still matches the key.
    pub fn grouped_elements(&self, key: &GroupingKey) -> Vec<ElementRow> {
        key.element_ids()
            .iter()
            .filter_map(|id| self.entity(*id))
            .filter(|e| match e {
                SceneEntity::Element { class_name, .. } => *class_name == key.class_name,
                _ => false,
            })
            .filter_map(SceneEntity::as_element_row)
            .collect()
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent builder for small scenes.
#[derive(Debug, Default)]
pub struct SceneBuilder {
    entities: Vec<SceneEntity>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, id: u64, parent_id: Option<u64>) -> Self {
        self.entities.push(SceneEntity::Subject {
            id: Id(id),
            parent_id: parent_id.map(Id),
            target_partition_id: None,
            name: None,
        });
        self
    }

    /// A subject that takes ownership of the model partition `target`.
    pub fn subject_targeting(mut self, id: u64, parent_id: Option<u64>, target: u64) -> Self {
        self.entities.push(SceneEntity::Subject {
            id: Id(id),
            parent_id: parent_id.map(Id),
            target_partition_id: Some(Id(target)),
            name: None,
        });
        self
    }

    pub fn model(mut self, id: u64, parent_id: u64) -> Self {
        self.entities.push(SceneEntity::Model {
            id: Id(id),
            parent_id: Id(parent_id),
            name: None,
        });
        self
    }

    pub fn category(mut self, id: u64) -> Self {
        self.entities.push(SceneEntity::Category { id: Id(id), name: None });
        self
    }

    pub fn element(self, id: u64, model_id: u64, category_id: u64, parent_id: Option<u64>) -> Self {
        self.element_of_class(id, model_id, category_id, parent_id, "Generic:PhysicalObject")
    }

    pub fn element_of_class(
        mut self,
        id: u64,
        model_id: u64,
        category_id: u64,
        parent_id: Option<u64>,
        class_name: &str,
    ) -> Self {
        self.entities.push(SceneEntity::Element {
            id: Id(id),
            model_id: Id(model_id),
            category_id: Id(category_id),
            parent_id: parent_id.map(Id),
            class_name: class_name.to_string(),
        });
        self
    }

    pub fn entity(mut self, entity: SceneEntity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn build(self) -> Result<SceneGraph, SceneError> {
        SceneGraph::from_entities(self.entities)
    }
}
