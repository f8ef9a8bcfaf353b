//! Viewport capability interface and an in-memory implementation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arbor_core::{CategoryOverride, CategoryOverrideEntry, Id, ViewSettings};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Independent change notifications a viewport raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewportSignal {
    ViewedModels,
    ViewedCategories,
    CategoryOverrides,
    AlwaysDrawn,
    NeverDrawn,
}

impl ViewportSignal {
    pub const ALL: [ViewportSignal; 5] = [
        ViewportSignal::ViewedModels,
        ViewportSignal::ViewedCategories,
        ViewportSignal::CategoryOverrides,
        ViewportSignal::AlwaysDrawn,
        ViewportSignal::NeverDrawn,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Display state the visibility engine reads and writes.
///
/// Mutating methods take `&self`; implementations own their synchronization.
/// Every mutating call raises its [`ViewportSignal`].
pub trait Viewport: Send + Sync {
    fn is_spatial_view(&self) -> bool;

    fn views_model(&self, model_id: Id) -> bool;
    fn add_viewed_models(&self, model_ids: &[Id]);
    fn change_model_display(&self, model_ids: &[Id], show: bool);

    fn views_category(&self, category_id: Id) -> bool;
    fn change_category_display(
        &self,
        category_ids: &[Id],
        show: bool,
        enable_all_sub_categories: bool,
    );

    fn category_override(&self, model_id: Id, category_id: Id) -> CategoryOverride;
    fn set_category_override(&self, model_id: Id, category_id: Id, value: CategoryOverride);

    fn always_drawn(&self) -> Arc<HashSet<Id>>;
    fn never_drawn(&self) -> Arc<HashSet<Id>>;
    fn set_always_drawn(&self, element_ids: HashSet<Id>, exclusive: bool);
    fn set_never_drawn(&self, element_ids: HashSet<Id>);
    fn is_always_drawn_exclusive(&self) -> bool;

    /// Receive one `()` per change of `signal`.
    fn subscribe(&self, signal: ViewportSignal) -> broadcast::Receiver<()>;
}

const SIGNAL_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct ViewStateInner {
    spatial: bool,
    models: HashSet<Id>,
    categories: HashSet<Id>,
    sub_categories_enabled: HashSet<Id>,
    overrides: HashMap<(Id, Id), CategoryOverride>,
    always_drawn: Arc<HashSet<Id>>,
    never_drawn: Arc<HashSet<Id>>,
    always_drawn_exclusive: bool,
}

/// In-memory [`Viewport`] used by the server, the CLI and tests.
pub struct ViewState {
    inner: Mutex<ViewStateInner>,
    signals: [broadcast::Sender<()>; 5],
}

impl std::fmt::Debug for ViewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ViewState")
            .field("spatial", &inner.spatial)
            .field("models", &inner.models.len())
            .field("categories", &inner.categories.len())
            .field("overrides", &inner.overrides.len())
            .field("always_drawn", &inner.always_drawn.len())
            .field("never_drawn", &inner.never_drawn.len())
            .finish()
    }
}

impl ViewState {
    pub fn new(spatial: bool) -> Self {
        Self {
            inner: Mutex::new(ViewStateInner {
                spatial,
                ..ViewStateInner::default()
            }),
            signals: std::array::from_fn(|_| broadcast::channel(SIGNAL_CAPACITY).0),
        }
    }

    pub fn from_settings(settings: &ViewSettings) -> Self {
        let state = Self::new(settings.spatial);
        {
            let mut inner = state.inner.lock();
            inner.models = settings.models.iter().copied().collect();
            inner.categories = settings.categories.iter().copied().collect();
            inner.overrides = settings
                .overrides
                .iter()
                .filter(|entry| entry.value != CategoryOverride::None)
                .map(|entry| ((entry.model_id, entry.category_id), entry.value))
                .collect();
            inner.always_drawn = Arc::new(settings.always_drawn.iter().copied().collect());
            inner.never_drawn = Arc::new(settings.never_drawn.iter().copied().collect());
            inner.always_drawn_exclusive = settings.always_drawn_exclusive;
        }
        state
    }

    /// Snapshot the current state, with ids sorted.
    pub fn settings(&self) -> ViewSettings {
        let inner = self.inner.lock();
        let mut overrides: Vec<CategoryOverrideEntry> = inner
            .overrides
            .iter()
            .map(|((model_id, category_id), value)| CategoryOverrideEntry {
                model_id: *model_id,
                category_id: *category_id,
                value: *value,
            })
            .collect();
        overrides.sort_by_key(|entry| (entry.model_id, entry.category_id));

        ViewSettings {
            spatial: inner.spatial,
            models: sorted(inner.models.iter()),
            categories: sorted(inner.categories.iter()),
            overrides,
            always_drawn: sorted(inner.always_drawn.iter()),
            never_drawn: sorted(inner.never_drawn.iter()),
            always_drawn_exclusive: inner.always_drawn_exclusive,
        }
    }

    /// Switch between a spatial and a non-spatial (e.g. drawing) view.
    pub fn set_spatial(&self, spatial: bool) {
        self.inner.lock().spatial = spatial;
    }

    /// Whether the last display change for this category also enabled its sub-categories.
    pub fn sub_categories_enabled(&self, category_id: Id) -> bool {
        self.inner.lock().sub_categories_enabled.contains(&category_id)
    }

    fn notify(&self, signal: ViewportSignal) {
        trace!("Viewport signal {:?}", signal);
        // No receivers is fine
        let _ = self.signals[signal.index()].send(());
    }
}

fn sorted<'a>(ids: impl Iterator<Item = &'a Id>) -> Vec<Id> {
    let mut ids: Vec<Id> = ids.copied().collect();
    ids.sort_unstable();
    ids
}

impl Viewport for ViewState {
    fn is_spatial_view(&self) -> bool {
        self.inner.lock().spatial
    }

    fn views_model(&self, model_id: Id) -> bool {
        self.inner.lock().models.contains(&model_id)
    }

    fn add_viewed_models(&self, model_ids: &[Id]) {
        self.inner.lock().models.extend(model_ids.iter().copied());
        self.notify(ViewportSignal::ViewedModels);
    }

    fn change_model_display(&self, model_ids: &[Id], show: bool) {
        {
            let mut inner = self.inner.lock();
            for model_id in model_ids {
                if show {
                    inner.models.insert(*model_id);
                } else {
                    inner.models.remove(model_id);
                }
            }
        }
        self.notify(ViewportSignal::ViewedModels);
    }

    fn views_category(&self, category_id: Id) -> bool {
        self.inner.lock().categories.contains(&category_id)
    }

    fn change_category_display(
        &self,
        category_ids: &[Id],
        show: bool,
        enable_all_sub_categories: bool,
    ) {
        {
            let mut inner = self.inner.lock();
            for category_id in category_ids {
                if show {
                    inner.categories.insert(*category_id);
                    if enable_all_sub_categories {
                        inner.sub_categories_enabled.insert(*category_id);
                    }
                } else {
                    inner.categories.remove(category_id);
                    inner.sub_categories_enabled.remove(category_id);
                }
            }
        }
        self.notify(ViewportSignal::ViewedCategories);
    }

    fn category_override(&self, model_id: Id, category_id: Id) -> CategoryOverride {
        self.inner
            .lock()
            .overrides
            .get(&(model_id, category_id))
            .copied()
            .unwrap_or_default()
    }

    fn set_category_override(&self, model_id: Id, category_id: Id, value: CategoryOverride) {
        {
            let mut inner = self.inner.lock();
            match value {
                CategoryOverride::None => inner.overrides.remove(&(model_id, category_id)),
                value => inner.overrides.insert((model_id, category_id), value),
            };
        }
        self.notify(ViewportSignal::CategoryOverrides);
    }

    fn always_drawn(&self) -> Arc<HashSet<Id>> {
        Arc::clone(&self.inner.lock().always_drawn)
    }

    fn never_drawn(&self) -> Arc<HashSet<Id>> {
        Arc::clone(&self.inner.lock().never_drawn)
    }

    fn set_always_drawn(&self, element_ids: HashSet<Id>, exclusive: bool) {
        {
            let mut inner = self.inner.lock();
            inner.always_drawn = Arc::new(element_ids);
            inner.always_drawn_exclusive = exclusive;
        }
        self.notify(ViewportSignal::AlwaysDrawn);
    }

    fn set_never_drawn(&self, element_ids: HashSet<Id>) {
        self.inner.lock().never_drawn = Arc::new(element_ids);
        self.notify(ViewportSignal::NeverDrawn);
    }

    fn is_always_drawn_exclusive(&self) -> bool {
        self.inner.lock().always_drawn_exclusive
    }

    fn subscribe(&self, signal: ViewportSignal) -> broadcast::Receiver<()> {
        self.signals[signal.index()].subscribe()
    }
}
