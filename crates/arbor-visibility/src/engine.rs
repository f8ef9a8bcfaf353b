//! Status computation and visibility mutations for models-tree nodes

use std::collections::HashSet;
use std::sync::Arc;

use arbor_core::{
    CategoryOverride, GroupingKey, Id, NodeKey, QueryResult, StatusReason, TreeNode,
    VisibilityStatus,
};
use arbor_hierarchy::{ElementScope, HierarchyCache};
use futures_util::TryStreamExt;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::coalescer::{ChangeCoalescer, VisibilityChanged};
use crate::error::VisibilityError;
use crate::filter::FilteredHierarchy;
use crate::node::{NodeTarget, classify};
use crate::viewport::Viewport;

/// Model and category an element-like node belongs to.
#[derive(Debug, Clone, Copy)]
struct ElementContext {
    model_id: Id,
    category_id: Id,
}

/// Answers "is this node visible" and applies "make it (in)visible" to a viewport.
pub struct VisibilityEngine {
    viewport: Arc<dyn Viewport>,
    cache: Arc<HierarchyCache>,
    filter: RwLock<Option<Arc<FilteredHierarchy>>>,
    coalescer: ChangeCoalescer,
}

impl std::fmt::Debug for VisibilityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityEngine")
            .field("cache", &self.cache)
            .field("filtered", &self.filter.read().is_some())
            .field("coalescer", &self.coalescer)
            .finish()
    }
}

impl VisibilityEngine {
    /// Must be called within a tokio runtime; starts listening to viewport changes.
    pub fn new(viewport: Arc<dyn Viewport>, cache: Arc<HierarchyCache>) -> Self {
        let coalescer = ChangeCoalescer::new(viewport.as_ref());
        Self {
            viewport,
            cache,
            filter: RwLock::new(None),
            coalescer,
        }
    }

    pub fn viewport(&self) -> &Arc<dyn Viewport> {
        &self.viewport
    }

    pub fn cache(&self) -> &Arc<HierarchyCache> {
        &self.cache
    }

    /// One event per burst of viewport changes.
    pub fn on_visibility_changed(&self) -> broadcast::Receiver<VisibilityChanged> {
        self.coalescer.subscribe()
    }

    /// Stop reporting viewport changes.
    pub fn dispose(&mut self) {
        self.coalescer.dispose();
    }

    /// Restrict subject aggregation to the filtered tree, or lift the restriction with `None`.
    pub fn set_filtered_scope(&self, filter: Option<FilteredHierarchy>) {
        debug!("Filtered scope {}", if filter.is_some() { "set" } else { "cleared" });
        *self.filter.write() = filter.map(Arc::new);
    }

    pub fn filtered_scope(&self) -> Option<Arc<FilteredHierarchy>> {
        self.filter.read().clone()
    }

    // ── Status ──────────────────────────────────────────────

    /// Visibility of a node; query failures resolve to a disabled status.
    pub async fn status(&self, node: &TreeNode) -> VisibilityStatus {
        match self.try_status(node).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Visibility status for {:?} failed: {}", node.key, e);
                VisibilityStatus::disabled(StatusReason::QueryFailed)
            }
        }
    }

    /// Visibility of a node, surfacing query failures to the caller.
    pub async fn try_status(&self, node: &TreeNode) -> QueryResult<VisibilityStatus> {
        match classify(node) {
            NodeTarget::Unclassified => {
                Ok(VisibilityStatus::disabled(StatusReason::UnclassifiedNode))
            }
            NodeTarget::Subject(id) => self.subject_status(&node.key, id).await,
            NodeTarget::Model(id) => Ok(self.model_status(id)),
            NodeTarget::Category { id, model_id } => Ok(self.category_status(id, model_id)),
            NodeTarget::Grouping {
                key,
                model_id,
                category_id,
            } => self.grouping_status(key, model_id, category_id).await,
            NodeTarget::Element {
                id,
                model_id,
                category_id,
                ..
            } => self.element_status(id, model_id, category_id).await,
        }
    }

    async fn subject_status(&self, key: &NodeKey, subject_id: Id) -> QueryResult<VisibilityStatus> {
        if !self.viewport.is_spatial_view() {
            return Ok(VisibilityStatus::disabled(StatusReason::NonSpatialView));
        }

        let (models, filtered) = self.subject_models(key, subject_id).await?;
        let any_visible = models.iter().any(|model| self.viewport.views_model(*model));
        let reason = match (filtered, any_visible) {
            (false, true) => StatusReason::SomeModelsVisible,
            (false, false) => StatusReason::AllModelsHidden,
            (true, true) => StatusReason::FilteredModelsVisible,
            (true, false) => StatusReason::FilteredModelsHidden,
        };
        Ok(if any_visible {
            VisibilityStatus::visible(reason)
        } else {
            VisibilityStatus::hidden(reason)
        })
    }

    fn model_status(&self, model_id: Id) -> VisibilityStatus {
        if !self.viewport.is_spatial_view() {
            VisibilityStatus::disabled(StatusReason::NonSpatialView)
        } else if self.viewport.views_model(model_id) {
            VisibilityStatus::visible(StatusReason::ModelShown)
        } else {
            VisibilityStatus::hidden(StatusReason::ModelHidden)
        }
    }

    fn category_status(&self, category_id: Id, model_id: Option<Id>) -> VisibilityStatus {
        match model_id {
            Some(model_id) if !self.viewport.views_model(model_id) => {
                VisibilityStatus::disabled(StatusReason::ModelHidden)
            }
            Some(model_id) => self.category_on_model(category_id, model_id),
            None => self.category_selector(category_id),
        }
    }

    /// The per-model override wins over the category selector.
    fn category_on_model(&self, category_id: Id, model_id: Id) -> VisibilityStatus {
        match self.viewport.category_override(model_id, category_id) {
            CategoryOverride::Show => VisibilityStatus::visible(StatusReason::CategoryOverrideShow),
            CategoryOverride::Hide => VisibilityStatus::hidden(StatusReason::CategoryOverrideHide),
            CategoryOverride::None => self.category_selector(category_id),
        }
    }

    fn category_selector(&self, category_id: Id) -> VisibilityStatus {
        if self.viewport.views_category(category_id) {
            VisibilityStatus::visible(StatusReason::CategorySelectorShow)
        } else {
            VisibilityStatus::hidden(StatusReason::CategorySelectorHide)
        }
    }

    async fn element_status(
        &self,
        element_id: Id,
        model_id: Option<Id>,
        category_id: Option<Id>,
    ) -> QueryResult<VisibilityStatus> {
        let Some(context) = self.element_context(element_id, model_id, category_id).await? else {
            return Ok(VisibilityStatus::disabled(StatusReason::MissingContext));
        };
        if !self.viewport.views_model(context.model_id) {
            return Ok(VisibilityStatus::disabled(StatusReason::ModelHidden));
        }

        if self.viewport.never_drawn().contains(&element_id) {
            return Ok(VisibilityStatus::hidden(StatusReason::NeverDrawn));
        }
        let always = self.viewport.always_drawn();
        if always.contains(&element_id) {
            return Ok(VisibilityStatus::visible(StatusReason::AlwaysDrawn));
        }
        if self.viewport.is_always_drawn_exclusive() && !always.is_empty() {
            return Ok(VisibilityStatus::hidden(StatusReason::ExclusiveAlwaysDrawn));
        }
        Ok(self.category_on_model(context.category_id, context.model_id))
    }

    async fn grouping_status(
        &self,
        key: &GroupingKey,
        model_id: Option<Id>,
        category_id: Option<Id>,
    ) -> QueryResult<VisibilityStatus> {
        let grouped = self.cache.grouping_node_children(key).await?;
        let (Some(model_id), Some(category_id)) = (
            model_id.or(grouped.model_id),
            category_id.or(grouped.category_id),
        ) else {
            return Ok(VisibilityStatus::disabled(StatusReason::MissingContext));
        };
        if !self.viewport.views_model(model_id) {
            return Ok(VisibilityStatus::disabled(StatusReason::ModelHidden));
        }

        let always = self.viewport.always_drawn();
        if grouped.element_ids.iter().any(|id| always.contains(id)) {
            return Ok(VisibilityStatus::visible(StatusReason::SomeMembersAlwaysDrawn));
        }
        if self.viewport.is_always_drawn_exclusive() && !always.is_empty() {
            return Ok(VisibilityStatus::hidden(StatusReason::ExclusiveAlwaysDrawn));
        }
        let never = self.viewport.never_drawn();
        if !grouped.element_ids.is_empty()
            && grouped.element_ids.iter().all(|id| never.contains(id))
        {
            return Ok(VisibilityStatus::hidden(StatusReason::AllMembersNeverDrawn));
        }
        Ok(self.category_on_model(category_id, model_id))
    }

    // ── Mutation ────────────────────────────────────────────

    /// Make a node and everything below it visible or hidden.
    ///
    /// Nodes the engine cannot classify or place are left untouched.
    pub async fn set_visible(&self, node: &TreeNode, on: bool) -> Result<(), VisibilityError> {
        debug!("Set {:?} visible={}", node.key, on);
        match classify(node) {
            NodeTarget::Unclassified => {
                debug!("Ignoring visibility change for unclassified node {:?}", node.key);
            }
            NodeTarget::Subject(id) => self.set_subject_visible(&node.key, id, on).await?,
            NodeTarget::Model(id) => self.set_models_visible(&[id], on),
            NodeTarget::Category { id, model_id } => self.set_category_visible(id, model_id, on),
            NodeTarget::Grouping {
                key,
                model_id,
                category_id,
            } => self.set_grouping_visible(key, model_id, category_id, on).await?,
            NodeTarget::Element {
                id,
                model_id,
                category_id,
                has_children,
            } => {
                self.set_element_visible(id, model_id, category_id, has_children, on)
                    .await?
            }
        }
        Ok(())
    }

    async fn set_subject_visible(
        &self,
        key: &NodeKey,
        subject_id: Id,
        on: bool,
    ) -> QueryResult<()> {
        if !self.viewport.is_spatial_view() {
            debug!("Subject {} not toggleable outside a spatial view", subject_id);
            return Ok(());
        }
        let (models, _) = self.subject_models(key, subject_id).await?;
        self.set_models_visible(&models, on);
        Ok(())
    }

    fn set_models_visible(&self, model_ids: &[Id], on: bool) {
        if model_ids.is_empty() {
            return;
        }
        if on {
            self.viewport.add_viewed_models(model_ids);
        } else {
            self.viewport.change_model_display(model_ids, false);
        }
    }

    fn set_category_visible(&self, category_id: Id, model_id: Option<Id>, on: bool) {
        let Some(model_id) = model_id else {
            self.viewport.change_category_display(&[category_id], on, on);
            return;
        };

        // An override equal to the selector is redundant and collapses to none
        let selector = self.viewport.views_category(category_id);
        let value = if on == selector {
            CategoryOverride::None
        } else if on {
            CategoryOverride::Show
        } else {
            CategoryOverride::Hide
        };
        self.viewport.set_category_override(model_id, category_id, value);
        if value == CategoryOverride::None && on {
            self.viewport.change_category_display(&[category_id], true, true);
        }
    }

    async fn set_grouping_visible(
        &self,
        key: &GroupingKey,
        model_id: Option<Id>,
        category_id: Option<Id>,
        on: bool,
    ) -> QueryResult<()> {
        let grouped = self.cache.grouping_node_children(key).await?;
        let (Some(model_id), Some(category_id)) = (
            model_id.or(grouped.model_id),
            category_id.or(grouped.category_id),
        ) else {
            debug!("Grouping node {} has no resolvable members", key.class_name);
            return Ok(());
        };
        let context = ElementContext { model_id, category_id };
        self.apply_element_changes(context, grouped.element_ids.iter().copied(), on);
        Ok(())
    }

    async fn set_element_visible(
        &self,
        element_id: Id,
        model_id: Option<Id>,
        category_id: Option<Id>,
        has_children: bool,
        on: bool,
    ) -> QueryResult<()> {
        let Some(context) = self.element_context(element_id, model_id, category_id).await? else {
            debug!("Element {} has no model/category context", element_id);
            return Ok(());
        };

        let mut element_ids = vec![element_id];
        if has_children {
            let descendants: Vec<Id> = self
                .cache
                .element_family(ElementScope::RootElement(element_id), None)
                .await?
                .try_collect()
                .await?;
            element_ids.extend(descendants);
        }
        self.apply_element_changes(context, element_ids, on);
        Ok(())
    }

    /// Edit working copies of both element sets and commit each at most once.
    fn apply_element_changes(
        &self,
        context: ElementContext,
        element_ids: impl IntoIterator<Item = Id>,
        on: bool,
    ) {
        let displayed_by_default = self.viewport.views_model(context.model_id)
            && self.category_on_model(context.category_id, context.model_id).is_visible();
        let exclusive = self.viewport.is_always_drawn_exclusive();
        let mut always: HashSet<Id> = self.viewport.always_drawn().as_ref().clone();
        let mut never: HashSet<Id> = self.viewport.never_drawn().as_ref().clone();
        let hidden_by_exclusive = exclusive && !always.is_empty();
        let shown_without_lists = displayed_by_default && !hidden_by_exclusive;

        let mut always_changed = false;
        let mut never_changed = false;
        for element_id in element_ids {
            if on {
                never_changed |= never.remove(&element_id);
                if !shown_without_lists {
                    always_changed |= always.insert(element_id);
                }
            } else {
                always_changed |= always.remove(&element_id);
                if shown_without_lists {
                    never_changed |= never.insert(element_id);
                }
            }
        }

        if always_changed {
            self.viewport.set_always_drawn(always, exclusive);
        }
        if never_changed {
            self.viewport.set_never_drawn(never);
        }
    }

    // ── Context ─────────────────────────────────────────────

    /// Models a subject node stands for, and whether the filtered tree narrowed them.
    async fn subject_models(&self, key: &NodeKey, subject_id: Id) -> QueryResult<(Vec<Id>, bool)> {
        match self.filtered_scope() {
            Some(filter) if !filter.matches(key) => {
                Ok((self.filtered_subject_models(&filter, key).await?, true))
            }
            _ => Ok((self.cache.subject_models(subject_id).await?, false)),
        }
    }

    /// Models under the filtered children of a subject.
    ///
    /// Matching child subjects contribute their whole subtree; non-matching
    /// ones contribute only their own filtered children.
    async fn filtered_subject_models(
        &self,
        filter: &FilteredHierarchy,
        key: &NodeKey,
    ) -> QueryResult<Vec<Id>> {
        let mut models = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = vec![key.clone()];

        while let Some(current) = pending.pop() {
            for child in filter.children(&current) {
                match &child.key {
                    NodeKey::Subject { id } if filter.matches(&child.key) => {
                        for model in self.cache.subject_models(*id).await? {
                            if seen.insert(model) {
                                models.push(model);
                            }
                        }
                    }
                    NodeKey::Subject { .. } => pending.push(child.key.clone()),
                    NodeKey::Model { id } => {
                        if seen.insert(*id) {
                            models.push(*id);
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(models)
    }

    /// Use the context the node carries, filling gaps from the element's top-most ancestor.
    async fn element_context(
        &self,
        element_id: Id,
        model_id: Option<Id>,
        category_id: Option<Id>,
    ) -> QueryResult<Option<ElementContext>> {
        if let (Some(model_id), Some(category_id)) = (model_id, category_id) {
            return Ok(Some(ElementContext { model_id, category_id }));
        }

        let ancestry = self.cache.element_ancestry_info(&[element_id]).await?;
        Ok(ancestry.first().map(|info| ElementContext {
            model_id: model_id.unwrap_or(info.model_id),
            category_id: category_id.unwrap_or(info.category_id),
        }))
    }
}
