//! Recursive element-family traversal

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use arbor_core::{Id, QueryError, QueryResult};
use futures_util::stream;
use futures_util::{StreamExt, TryStreamExt};

use crate::provider::{HierarchyQueryProvider, RowStream, collect_rows};

/// Where an element-family traversal starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementScope {
    /// Top-level elements of a model and all their descendants.
    Model(Id),
    /// Top-level elements of one category within a model and all their descendants.
    ModelCategory { model_id: Id, category_id: Id },
    /// Every descendant of an assembly root, excluding the root itself.
    RootElement(Id),
}

/// Key under which unfiltered model and model/category families are memoized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FamilyKey {
    pub model_id: Id,
    pub category_id: Option<Id>,
}

impl ElementScope {
    /// Assembly-root scopes are one-shot and never cached.
    pub(crate) fn cache_key(self) -> Option<FamilyKey> {
        match self {
            ElementScope::Model(model_id) => Some(FamilyKey {
                model_id,
                category_id: None,
            }),
            ElementScope::ModelCategory {
                model_id,
                category_id,
            } => Some(FamilyKey {
                model_id,
                category_id: Some(category_id),
            }),
            ElementScope::RootElement(_) => None,
        }
    }

    async fn direct_matches(self, provider: &dyn HierarchyQueryProvider) -> QueryResult<Vec<Id>> {
        let rows = match self {
            ElementScope::Model(model_id) => provider.model_elements(model_id).await?,
            ElementScope::ModelCategory {
                model_id,
                category_id,
            } => provider.category_elements(model_id, category_id).await?,
            ElementScope::RootElement(element_id) => provider.element_children(element_id).await?,
        };
        rows.map_ok(|row| row.id).try_collect().await
    }
}

struct FamilyWalk {
    provider: Arc<dyn HierarchyQueryProvider>,
    scope: Option<ElementScope>,
    pending: VecDeque<Id>,
    filter: Option<Arc<HashSet<Id>>>,
}

/// Breadth-first walk over the parent-child edge, starting from the scope's direct matches.
///
/// With a filter, every element is still expanded but only ids in the filter are yielded.
pub fn walk_family(
    provider: Arc<dyn HierarchyQueryProvider>,
    scope: ElementScope,
    filter: Option<Arc<HashSet<Id>>>,
) -> RowStream<Id> {
    let walk = FamilyWalk {
        provider,
        scope: Some(scope),
        pending: VecDeque::new(),
        filter,
    };

    stream::try_unfold(walk, |mut walk| async move {
        if let Some(scope) = walk.scope.take() {
            let roots = scope.direct_matches(walk.provider.as_ref()).await?;
            walk.pending.extend(roots);
        }
        while let Some(id) = walk.pending.pop_front() {
            let children = collect_rows(walk.provider.element_children(id).await?).await?;
            walk.pending.extend(children.into_iter().map(|child| child.id));
            if walk.filter.as_ref().is_none_or(|filter| filter.contains(&id)) {
                return Ok(Some((id, walk)));
            }
        }
        Ok::<_, QueryError>(None)
    })
    .boxed()
}
