//! Hierarchy data source abstraction

use arbor_core::{
    ElementRow, GroupingKey, Id, ModelCategoryRow, ModelRow, QueryResult, SubjectRow,
};
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;

/// Lazily produced query rows. Errors end the sequence for that caller only.
pub type RowStream<T> = BoxStream<'static, QueryResult<T>>;

/// The primitive queries a data source must answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Subjects,
    Models,
    ModelCategoryPairs,
    ModelCategories,
    CategoryElements,
    ModelElements,
    ElementChildren,
    ElementsInfo,
    GroupedElements,
}

impl QueryKind {
    pub const COUNT: usize = 9;

    pub const ALL: [QueryKind; Self::COUNT] = [
        QueryKind::Subjects,
        QueryKind::Models,
        QueryKind::ModelCategoryPairs,
        QueryKind::ModelCategories,
        QueryKind::CategoryElements,
        QueryKind::ModelElements,
        QueryKind::ElementChildren,
        QueryKind::ElementsInfo,
        QueryKind::GroupedElements,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Subjects => "subjects",
            QueryKind::Models => "models",
            QueryKind::ModelCategoryPairs => "model-category pairs",
            QueryKind::ModelCategories => "model categories",
            QueryKind::CategoryElements => "category elements",
            QueryKind::ModelElements => "model elements",
            QueryKind::ElementChildren => "element children",
            QueryKind::ElementsInfo => "elements info",
            QueryKind::GroupedElements => "grouped elements",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Stateless query execution against the scene data source.
///
/// Implementations do no caching and no retries; failures propagate to the
/// caller. Element queries that take a model or category return only
/// top-level elements (those without an assembly parent).
#[async_trait::async_trait]
pub trait HierarchyQueryProvider: Send + Sync {
    /// Every subject with its parent and target partition.
    async fn all_subjects(&self) -> QueryResult<RowStream<SubjectRow>>;

    /// Every spatial model with the subject its partition lives under.
    async fn all_models(&self) -> QueryResult<RowStream<ModelRow>>;

    /// Every (model, category) pair that has elements.
    async fn all_model_categories(&self) -> QueryResult<RowStream<ModelCategoryRow>>;

    /// Categories with elements in one model.
    ///
    /// Part of the provider contract for backends that answer per model.
    /// [`HierarchyCache`](crate::HierarchyCache) reads categories from the
    /// index built on [`all_model_categories`](Self::all_model_categories)
    /// and never issues this query; the two must agree.
    async fn model_categories(&self, model_id: Id) -> QueryResult<RowStream<Id>>;

    /// Top-level elements of a category within a model.
    async fn category_elements(
        &self,
        model_id: Id,
        category_id: Id,
    ) -> QueryResult<RowStream<ElementRow>>;

    /// Top-level elements of a model.
    async fn model_elements(&self, model_id: Id) -> QueryResult<RowStream<ElementRow>>;

    /// Direct assembly children of an element.
    async fn element_children(&self, element_id: Id) -> QueryResult<RowStream<ElementRow>>;

    /// Rows for the given element ids; unknown ids yield nothing.
    async fn elements_info(&self, element_ids: &[Id]) -> QueryResult<RowStream<ElementRow>>;

    /// Members behind a class grouping node.
    async fn grouped_elements(&self, key: &GroupingKey) -> QueryResult<RowStream<ElementRow>>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Drain a row stream into a vector, stopping at the first error.
pub async fn collect_rows<T>(rows: RowStream<T>) -> QueryResult<Vec<T>> {
    rows.try_collect().await
}
