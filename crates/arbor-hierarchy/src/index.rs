//! The structural index shared by one cache generation

use std::collections::{HashMap, HashSet, VecDeque};

use arbor_core::{Id, ModelCategoryRow, ModelRow, QueryResult, SubjectRow};
use futures_util::future::try_join3;
use tracing::debug;

use crate::provider::{HierarchyQueryProvider, collect_rows};

/// Subject tree, subject → model and model → category maps.
///
/// Immutable once built; a new index is built after each invalidation.
#[derive(Debug, Default)]
pub struct HierarchyIndex {
    root_subjects: Vec<Id>,
    subject_parent: HashMap<Id, Id>,
    subject_children: HashMap<Id, Vec<Id>>,
    subject_models: HashMap<Id, Vec<Id>>,
    model_categories: HashMap<Id, Vec<Id>>,
}

impl HierarchyIndex {
    /// Issue the subjects, models and model-category queries once each and index the rows.
    pub async fn build(provider: &dyn HierarchyQueryProvider) -> QueryResult<Self> {
        let (subjects, models, pairs) = try_join3(
            async { collect_rows(provider.all_subjects().await?).await },
            async { collect_rows(provider.all_models().await?).await },
            async { collect_rows(provider.all_model_categories().await?).await },
        )
        .await?;
        Ok(Self::from_rows(subjects, models, pairs))
    }

    pub fn from_rows(
        subjects: Vec<SubjectRow>,
        models: Vec<ModelRow>,
        pairs: Vec<ModelCategoryRow>,
    ) -> Self {
        let mut index = HierarchyIndex::default();

        // Partitions claimed by a subject are shown under that subject instead of their parent
        let mut partition_owners: HashMap<Id, Vec<Id>> = HashMap::new();
        for subject in &subjects {
            match subject.parent_id {
                Some(parent) => {
                    index.subject_parent.insert(subject.id, parent);
                    index.subject_children.entry(parent).or_default().push(subject.id);
                }
                None => index.root_subjects.push(subject.id),
            }
            if let Some(target) = subject.target_partition_id {
                partition_owners.entry(target).or_default().push(subject.id);
            }
        }

        for model in &models {
            match partition_owners.get(&model.id) {
                Some(owners) => {
                    for owner in owners {
                        index.subject_models.entry(*owner).or_default().push(model.id);
                    }
                }
                None => index.subject_models.entry(model.parent_id).or_default().push(model.id),
            }
        }

        for pair in pairs {
            let categories = index.model_categories.entry(pair.model_id).or_default();
            if !categories.contains(&pair.category_id) {
                categories.push(pair.category_id);
            }
        }

        debug!(
            "Hierarchy index: {} subjects, {} models, {} models with categories",
            subjects.len(),
            models.len(),
            index.model_categories.len()
        );
        index
    }

    /// Subjects without a parent, in query order.
    pub fn root_subjects(&self) -> &[Id] {
        &self.root_subjects
    }

    pub fn parent_subject(&self, subject_id: Id) -> Option<Id> {
        self.subject_parent.get(&subject_id).copied()
    }

    pub fn child_subjects(&self, subject_id: Id) -> &[Id] {
        self.subject_children
            .get(&subject_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Models attached directly to a subject, not through descendants.
    pub fn direct_models(&self, subject_id: Id) -> &[Id] {
        self.subject_models
            .get(&subject_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn model_categories(&self, model_id: Id) -> &[Id] {
        self.model_categories
            .get(&model_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every model reachable from a subject or any descendant subject, without duplicates.
    pub fn subject_models(&self, subject_id: Id) -> Vec<Id> {
        let mut models = Vec::new();
        let mut seen_models = HashSet::new();
        let mut seen_subjects = HashSet::from([subject_id]);
        let mut queue = VecDeque::from([subject_id]);

        while let Some(current) = queue.pop_front() {
            for model in self.direct_models(current) {
                if seen_models.insert(*model) {
                    models.push(*model);
                }
            }
            for child in self.child_subjects(current) {
                if seen_subjects.insert(*child) {
                    queue.push_back(*child);
                }
            }
        }
        models
    }
}
