//! Generation-scoped memoization of hierarchy facts

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arbor_core::{ElementRow, GroupingKey, Id, QueryResult};
use dashmap::DashMap;
use futures_util::stream;
use futures_util::{StreamExt, TryStreamExt};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::family::{ElementScope, FamilyKey, walk_family};
use crate::index::HierarchyIndex;
use crate::memo::SharedCell;
use crate::provider::{HierarchyQueryProvider, RowStream, collect_rows};

/// Elements behind a grouping node and the model/category they share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedElements {
    /// Owning model of the first resolved member; `None` for an empty group.
    pub model_id: Option<Id>,
    pub category_id: Option<Id>,
    pub element_ids: Vec<Id>,
}

/// The top-most ancestor's model and category, reported for a descendant element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementAncestry {
    pub element_id: Id,
    pub model_id: Id,
    pub category_id: Id,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub generation: u64,
    pub index_built: bool,
    pub grouping_entries: usize,
    pub family_entries: usize,
}

struct Generation {
    number: u64,
    index: SharedCell<HierarchyIndex>,
    groupings: DashMap<GroupingKey, Arc<SharedCell<GroupedElements>>>,
    families: DashMap<FamilyKey, Arc<SharedCell<Vec<Id>>>>,
}

impl Generation {
    fn new(number: u64) -> Self {
        Self {
            number,
            index: SharedCell::new(),
            groupings: DashMap::new(),
            families: DashMap::new(),
        }
    }
}

/// Memoizing front for a [`HierarchyQueryProvider`].
///
/// All structural facts of one generation come from a single index build.
/// [`HierarchyCache::invalidate`] starts a new generation; callers already
/// holding the previous one finish against it.
pub struct HierarchyCache {
    provider: Arc<dyn HierarchyQueryProvider>,
    generation: RwLock<Arc<Generation>>,
}

impl std::fmt::Debug for HierarchyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyCache")
            .field("provider", &self.provider.name())
            .field("stats", &self.stats())
            .finish()
    }
}

impl HierarchyCache {
    pub fn new(provider: Arc<dyn HierarchyQueryProvider>) -> Self {
        Self {
            provider,
            generation: RwLock::new(Arc::new(Generation::new(0))),
        }
    }

    pub fn provider(&self) -> &Arc<dyn HierarchyQueryProvider> {
        &self.provider
    }

    fn current(&self) -> Arc<Generation> {
        Arc::clone(&self.generation.read())
    }

    /// The structural index of the current generation, built on first use.
    pub async fn index(&self) -> QueryResult<Arc<HierarchyIndex>> {
        let generation = self.current();
        generation
            .index
            .get_or_try_init(|| async {
                info!(
                    "Building hierarchy index (generation {}) from {} provider",
                    generation.number,
                    self.provider.name()
                );
                HierarchyIndex::build(self.provider.as_ref()).await
            })
            .await
    }

    /// Every model reachable from the subject through its subtree.
    pub async fn subject_models(&self, subject_id: Id) -> QueryResult<Vec<Id>> {
        Ok(self.index().await?.subject_models(subject_id))
    }

    /// Categories of a model; empty when the model is unknown.
    pub async fn model_categories(&self, model_id: Id) -> QueryResult<Vec<Id>> {
        Ok(self.index().await?.model_categories(model_id).to_vec())
    }

    pub async fn root_subjects(&self) -> QueryResult<Vec<Id>> {
        Ok(self.index().await?.root_subjects().to_vec())
    }

    pub async fn child_subjects(&self, subject_id: Id) -> QueryResult<Vec<Id>> {
        Ok(self.index().await?.child_subjects(subject_id).to_vec())
    }

    /// Models attached to this subject itself, excluding descendant subjects.
    pub async fn direct_subject_models(&self, subject_id: Id) -> QueryResult<Vec<Id>> {
        Ok(self.index().await?.direct_models(subject_id).to_vec())
    }

    /// Resolve a grouping node's members once per distinct key.
    pub async fn grouping_node_children(
        &self,
        key: &GroupingKey,
    ) -> QueryResult<Arc<GroupedElements>> {
        let generation = self.current();
        let cell = generation
            .groupings
            .entry(key.clone())
            .or_insert_with(|| Arc::new(SharedCell::new()))
            .clone();

        cell.get_or_try_init(|| async {
            debug!("Resolving grouping node {} ({} ids)", key.class_name, key.element_ids().len());
            let rows = collect_rows(self.provider.grouped_elements(key).await?).await?;
            let first = rows.first();
            Ok(GroupedElements {
                model_id: first.map(|row| row.model_id),
                category_id: first.map(|row| row.category_id),
                element_ids: rows.iter().map(|row| row.id).collect(),
            })
        })
        .await
    }

    /// Elements in scope plus all their assembly descendants.
    ///
    /// Unfiltered model and model/category scopes are memoized per generation;
    /// filtered and assembly-root traversals run every time.
    pub async fn element_family(
        &self,
        scope: ElementScope,
        filter: Option<Arc<HashSet<Id>>>,
    ) -> QueryResult<RowStream<Id>> {
        match (scope.cache_key(), filter) {
            (Some(key), None) => {
                let ids = self.cached_family(key, scope).await?;
                let ids: Vec<Id> = ids.as_ref().clone();
                Ok(stream::iter(ids.into_iter().map(Ok)).boxed())
            }
            (_, filter) => Ok(walk_family(Arc::clone(&self.provider), scope, filter)),
        }
    }

    /// Number of ids [`HierarchyCache::element_family`] would yield.
    pub async fn element_family_count(
        &self,
        scope: ElementScope,
        filter: Option<Arc<HashSet<Id>>>,
    ) -> QueryResult<usize> {
        match (scope.cache_key(), filter) {
            (Some(key), None) => Ok(self.cached_family(key, scope).await?.len()),
            (_, filter) => {
                walk_family(Arc::clone(&self.provider), scope, filter)
                    .try_fold(0, |count, _| async move { Ok(count + 1) })
                    .await
            }
        }
    }

    async fn cached_family(
        &self,
        key: FamilyKey,
        scope: ElementScope,
    ) -> QueryResult<Arc<Vec<Id>>> {
        let generation = self.current();
        let cell = generation
            .families
            .entry(key)
            .or_insert_with(|| Arc::new(SharedCell::new()))
            .clone();

        cell.get_or_try_init(|| async {
            debug!("Collecting element family for {:?}", scope);
            collect_rows(walk_family(Arc::clone(&self.provider), scope, None)).await
        })
        .await
    }

    /// Walk each element up to its top-most ancestor and report that ancestor's model and category.
    ///
    /// Results follow the order of `element_ids`; ids the provider does not know are skipped.
    pub async fn element_ancestry_info(
        &self,
        element_ids: &[Id],
    ) -> QueryResult<Vec<ElementAncestry>> {
        let mut rows: HashMap<Id, ElementRow> = HashMap::new();
        let mut unknown: HashSet<Id> = HashSet::new();

        // One provider round trip per level of the deepest chain still open
        loop {
            let wanted: Vec<Id> = element_ids
                .iter()
                .filter_map(|id| match walk_up(*id, &rows, &unknown) {
                    Ancestor::Fetch(id) => Some(id),
                    Ancestor::Root(_) | Ancestor::Unresolved => None,
                })
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            if wanted.is_empty() {
                break;
            }

            for row in collect_rows(self.provider.elements_info(&wanted).await?).await? {
                rows.insert(row.id, row);
            }
            let missing: Vec<Id> =
                wanted.into_iter().filter(|id| !rows.contains_key(id)).collect();
            if !missing.is_empty() {
                debug!("{} elements could not be resolved", missing.len());
                unknown.extend(missing);
            }
        }

        Ok(element_ids
            .iter()
            .filter_map(|id| match walk_up(*id, &rows, &unknown) {
                Ancestor::Root(root) => Some(ElementAncestry {
                    element_id: *id,
                    model_id: root.model_id,
                    category_id: root.category_id,
                }),
                Ancestor::Fetch(_) | Ancestor::Unresolved => None,
            })
            .collect())
    }

    /// Drop the index and every derived cache; the next call rebuilds lazily.
    pub fn invalidate(&self) {
        let mut generation = self.generation.write();
        let number = generation.number + 1;
        *generation = Arc::new(Generation::new(number));
        info!("Hierarchy cache invalidated (generation {})", number);
    }

    pub fn generation(&self) -> u64 {
        self.current().number
    }

    pub fn stats(&self) -> CacheStats {
        let generation = self.current();
        CacheStats {
            generation: generation.number,
            index_built: generation.index.is_initialized(),
            grouping_entries: generation.groupings.len(),
            family_entries: generation.families.len(),
        }
    }
}

enum Ancestor {
    Root(ElementRow),
    Fetch(Id),
    Unresolved,
}

/// Follow parent links through the rows known so far.
fn walk_up(id: Id, rows: &HashMap<Id, ElementRow>, unknown: &HashSet<Id>) -> Ancestor {
    let mut visited = HashSet::new();
    let mut current = id;
    loop {
        // Unknown ids and parent cycles never resolve
        if unknown.contains(&current) || !visited.insert(current) {
            return Ancestor::Unresolved;
        }
        let Some(row) = rows.get(&current) else {
            return Ancestor::Fetch(current);
        };
        match row.parent_id {
            Some(parent) => current = parent,
            None => return Ancestor::Root(*row),
        }
    }
}
