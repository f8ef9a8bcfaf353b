//! Provider answering hierarchy queries from an in-memory [`SceneGraph`]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arbor_core::{
    ElementRow, GroupingKey, Id, ModelCategoryRow, ModelRow, QueryError, QueryResult, SceneGraph,
    SubjectRow,
};
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::provider::{HierarchyQueryProvider, QueryKind, RowStream};

/// Number of queries executed per [`QueryKind`].
#[derive(Debug, Default)]
pub struct QueryStats {
    counts: [AtomicUsize; QueryKind::COUNT],
}

impl QueryStats {
    fn record(&self, kind: QueryKind) {
        self.counts[kind.index()].fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self, kind: QueryKind) -> usize {
        self.counts[kind.index()].load(Ordering::SeqCst)
    }

    /// Queries executed across all kinds.
    pub fn total(&self) -> usize {
        QueryKind::ALL.iter().map(|kind| self.count(*kind)).sum()
    }

    pub fn reset(&self) {
        for count in &self.counts {
            count.store(0, Ordering::SeqCst);
        }
    }
}

/// Scene-backed [`HierarchyQueryProvider`].
///
/// The scene can be swapped at runtime with [`SceneProvider::replace_scene`];
/// queries already streaming keep the scene they started with.
pub struct SceneProvider {
    scene: RwLock<Arc<SceneGraph>>,
    stats: QueryStats,
    latency: Option<Duration>,
    failures: Mutex<HashSet<QueryKind>>,
}

impl std::fmt::Debug for SceneProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneProvider")
            .field("scene", &*self.scene.read())
            .field("latency", &self.latency)
            .field("queries", &self.stats.total())
            .finish()
    }
}

impl SceneProvider {
    pub fn new(scene: SceneGraph) -> Self {
        Self {
            scene: RwLock::new(Arc::new(scene)),
            stats: QueryStats::default(),
            latency: None,
            failures: Mutex::new(HashSet::new()),
        }
    }

    /// Delay every query by `latency` before producing rows.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = (!latency.is_zero()).then_some(latency);
        self
    }

    /// Swap in a new scene for subsequent queries.
    pub fn replace_scene(&self, scene: SceneGraph) {
        debug!("Replacing scene: {:?}", scene);
        *self.scene.write() = Arc::new(scene);
    }

    pub fn scene(&self) -> Arc<SceneGraph> {
        Arc::clone(&self.scene.read())
    }

    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    /// Make the next query of `kind` fail with a backend error.
    pub fn fail_next(&self, kind: QueryKind) {
        self.failures.lock().insert(kind);
    }

    async fn execute<T, F>(&self, kind: QueryKind, rows: F) -> QueryResult<RowStream<T>>
    where
        T: Send + 'static,
        F: FnOnce(&SceneGraph) -> Vec<T> + Send,
    {
        self.stats.record(kind);
        debug!("Executing {} query", kind.as_str());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failures.lock().remove(&kind) {
            return Err(QueryError::backend(kind.as_str(), "injected failure"));
        }

        let scene = self.scene();
        let rows = rows(&scene);
        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }
}

#[async_trait::async_trait]
impl HierarchyQueryProvider for SceneProvider {
    async fn all_subjects(&self) -> QueryResult<RowStream<SubjectRow>> {
        self.execute(QueryKind::Subjects, |scene| scene.subjects()).await
    }

    async fn all_models(&self) -> QueryResult<RowStream<ModelRow>> {
        self.execute(QueryKind::Models, |scene| scene.models()).await
    }

    async fn all_model_categories(&self) -> QueryResult<RowStream<ModelCategoryRow>> {
        self.execute(QueryKind::ModelCategoryPairs, |scene| scene.model_categories())
            .await
    }

    async fn model_categories(&self, model_id: Id) -> QueryResult<RowStream<Id>> {
        self.execute(QueryKind::ModelCategories, move |scene| {
            scene.categories_of_model(model_id)
        })
        .await
    }

    async fn category_elements(
        &self,
        model_id: Id,
        category_id: Id,
    ) -> QueryResult<RowStream<ElementRow>> {
        self.execute(QueryKind::CategoryElements, move |scene| {
            scene.root_elements(model_id, Some(category_id))
        })
        .await
    }

    async fn model_elements(&self, model_id: Id) -> QueryResult<RowStream<ElementRow>> {
        self.execute(QueryKind::ModelElements, move |scene| {
            scene.root_elements(model_id, None)
        })
        .await
    }

    async fn element_children(&self, element_id: Id) -> QueryResult<RowStream<ElementRow>> {
        self.execute(QueryKind::ElementChildren, move |scene| {
            scene.element_children(element_id)
        })
        .await
    }

    async fn elements_info(&self, element_ids: &[Id]) -> QueryResult<RowStream<ElementRow>> {
        let element_ids = element_ids.to_vec();
        self.execute(QueryKind::ElementsInfo, move |scene| scene.elements(&element_ids))
            .await
    }

    async fn grouped_elements(&self, key: &GroupingKey) -> QueryResult<RowStream<ElementRow>> {
        let key = key.clone();
        self.execute(QueryKind::GroupedElements, move |scene| {
            scene.grouped_elements(&key)
        })
        .await
    }

    fn name(&self) -> &str {
        "scene"
    }
}
