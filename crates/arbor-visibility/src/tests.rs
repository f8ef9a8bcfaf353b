//! Unit tests for arbor-visibility module

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use arbor_core::{
    CategoryOverride, GroupingKey, Id, SceneBuilder, SceneGraph, StatusReason, TreeNode,
    ViewSettings, VisibilityStatus,
};
use arbor_hierarchy::{HierarchyCache, QueryKind, SceneProvider};
use tokio::sync::broadcast;

use crate::*;

fn ids(raw: &[u64]) -> Vec<Id> {
    raw.iter().copied().map(Id).collect()
}

fn id_set(raw: &[u64]) -> HashSet<Id> {
    raw.iter().copied().map(Id).collect()
}

fn sample_scene() -> SceneGraph {
    SceneBuilder::new()
        .subject(0x1, None)
        .subject(0x2, Some(0x1))
        .subject(0x3, Some(0x1))
        .model(0x10, 0x2)
        .model(0x11, 0x3)
        .category(0x20)
        .category(0x21)
        .element(0x30, 0x10, 0x20, None)
        .element(0x31, 0x10, 0x20, Some(0x30))
        .element(0x32, 0x10, 0x21, Some(0x31))
        .element(0x33, 0x10, 0x20, None)
        .element_of_class(0x40, 0x11, 0x21, None, "Structural:Beam")
        .element_of_class(0x41, 0x11, 0x21, None, "Structural:Beam")
        .element_of_class(0x42, 0x11, 0x21, None, "Structural:Beam")
        .build()
        .unwrap()
}

fn base_settings() -> ViewSettings {
    ViewSettings {
        models: ids(&[0x10, 0x11]),
        categories: ids(&[0x20, 0x21]),
        ..ViewSettings::default()
    }
}

struct Fixture {
    provider: Arc<SceneProvider>,
    view: Arc<ViewState>,
    engine: VisibilityEngine,
}

fn fixture(settings: ViewSettings) -> Fixture {
    let provider = Arc::new(SceneProvider::new(sample_scene()));
    let cache = Arc::new(HierarchyCache::new(provider.clone()));
    let view = Arc::new(ViewState::from_settings(&settings));
    let engine = VisibilityEngine::new(view.clone(), cache);
    Fixture { provider, view, engine }
}

fn element(id: u64) -> TreeNode {
    TreeNode::element(Id(id)).with_model(Id(0x10)).with_category(Id(0x20))
}

fn beams() -> TreeNode {
    TreeNode::grouping(GroupingKey::new("Structural:Beam", ids(&[0x40, 0x41, 0x42])))
}

fn drain(rx: &mut broadcast::Receiver<()>) -> usize {
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    count
}

// ── Status ──────────────────────────────────────────────────

#[tokio::test]
async fn test_subject_visible_when_any_model_visible() {
    let fx = fixture(ViewSettings {
        models: ids(&[0x10]),
        ..base_settings()
    });
    let subject = TreeNode::subject(Id(0x1));

    assert_eq!(
        fx.engine.status(&subject).await,
        VisibilityStatus::visible(StatusReason::SomeModelsVisible)
    );

    fx.view.change_model_display(&[Id(0x10)], false);
    assert_eq!(
        fx.engine.status(&subject).await,
        VisibilityStatus::hidden(StatusReason::AllModelsHidden)
    );
}

#[tokio::test]
async fn test_non_spatial_view_disables_subjects_and_models() {
    let fx = fixture(ViewSettings {
        spatial: false,
        ..base_settings()
    });

    for node in [TreeNode::subject(Id(0x1)), TreeNode::model(Id(0x10))] {
        let status = fx.engine.status(&node).await;
        assert!(status.is_disabled);
        assert_eq!(status.reason, StatusReason::NonSpatialView);
    }

    fx.engine.set_visible(&TreeNode::subject(Id(0x1)), false).await.unwrap();
    assert!(fx.view.views_model(Id(0x10)));
}

#[tokio::test]
async fn test_category_status() {
    let fx = fixture(ViewSettings {
        models: ids(&[0x10]),
        categories: ids(&[0x20]),
        ..base_settings()
    });

    let on_hidden_model = TreeNode::category(Id(0x20)).with_model(Id(0x11));
    assert_eq!(
        fx.engine.status(&on_hidden_model).await,
        VisibilityStatus::disabled(StatusReason::ModelHidden)
    );

    let selector_off = TreeNode::category(Id(0x21)).with_model(Id(0x10));
    assert_eq!(
        fx.engine.status(&selector_off).await,
        VisibilityStatus::hidden(StatusReason::CategorySelectorHide)
    );

    fx.view.set_category_override(Id(0x10), Id(0x21), CategoryOverride::Show);
    assert_eq!(
        fx.engine.status(&selector_off).await,
        VisibilityStatus::visible(StatusReason::CategoryOverrideShow)
    );

    // Without a model the selector decides
    assert_eq!(
        fx.engine.status(&TreeNode::category(Id(0x21))).await,
        VisibilityStatus::hidden(StatusReason::CategorySelectorHide)
    );
}

#[tokio::test]
async fn test_element_status_precedence() {
    let fx = fixture(ViewSettings {
        categories: ids(&[0x20]),
        always_drawn: ids(&[0x31]),
        never_drawn: ids(&[0x33]),
        ..base_settings()
    });

    assert_eq!(
        fx.engine.status(&element(0x30)).await,
        VisibilityStatus::visible(StatusReason::CategorySelectorShow)
    );
    assert_eq!(
        fx.engine.status(&element(0x33)).await,
        VisibilityStatus::hidden(StatusReason::NeverDrawn)
    );
    let beam_category = TreeNode::element(Id(0x31)).with_model(Id(0x10)).with_category(Id(0x21));
    assert_eq!(
        fx.engine.status(&beam_category).await,
        VisibilityStatus::visible(StatusReason::AlwaysDrawn)
    );

    fx.view.change_model_display(&[Id(0x10)], false);
    assert_eq!(
        fx.engine.status(&element(0x30)).await,
        VisibilityStatus::disabled(StatusReason::ModelHidden)
    );
}

#[tokio::test]
async fn test_exclusive_always_drawn_hides_everything_else() {
    let fx = fixture(ViewSettings {
        always_drawn: ids(&[0x33]),
        always_drawn_exclusive: true,
        ..base_settings()
    });

    assert_eq!(
        fx.engine.status(&element(0x30)).await,
        VisibilityStatus::hidden(StatusReason::ExclusiveAlwaysDrawn)
    );
    assert_eq!(
        fx.engine.status(&element(0x33)).await,
        VisibilityStatus::visible(StatusReason::AlwaysDrawn)
    );

    fx.engine.set_visible(&element(0x30), true).await.unwrap();
    assert_eq!(*fx.view.always_drawn(), id_set(&[0x30, 0x33]));
    assert!(fx.view.is_always_drawn_exclusive());
    assert!(fx.view.never_drawn().is_empty());

    fx.engine.set_visible(&element(0x30), false).await.unwrap();
    assert_eq!(*fx.view.always_drawn(), id_set(&[0x33]));
    assert!(fx.view.never_drawn().is_empty());
    assert_eq!(
        fx.engine.status(&element(0x30)).await,
        VisibilityStatus::hidden(StatusReason::ExclusiveAlwaysDrawn)
    );
}

#[tokio::test]
async fn test_grouping_status() {
    let fx = fixture(ViewSettings {
        never_drawn: ids(&[0x40, 0x41, 0x42]),
        ..base_settings()
    });

    assert_eq!(
        fx.engine.status(&beams()).await,
        VisibilityStatus::hidden(StatusReason::AllMembersNeverDrawn)
    );

    fx.view.set_never_drawn(id_set(&[0x40]));
    assert_eq!(
        fx.engine.status(&beams()).await,
        VisibilityStatus::visible(StatusReason::CategorySelectorShow)
    );

    fx.view.set_always_drawn(id_set(&[0x41]), false);
    fx.view.change_category_display(&[Id(0x21)], false, false);
    assert_eq!(
        fx.engine.status(&beams()).await,
        VisibilityStatus::visible(StatusReason::SomeMembersAlwaysDrawn)
    );
}

#[tokio::test]
async fn test_missing_context_is_inferred_from_ancestry() {
    let fx = fixture(ViewSettings {
        categories: ids(&[0x20]),
        ..base_settings()
    });

    // 0x32 is in category 0x21, but its assembly root 0x30 is in 0x20
    let bare = TreeNode::element(Id(0x32));
    assert_eq!(
        fx.engine.status(&bare).await,
        VisibilityStatus::visible(StatusReason::CategorySelectorShow)
    );

    assert_eq!(
        fx.engine.status(&TreeNode::element(Id(0x999))).await,
        VisibilityStatus::disabled(StatusReason::MissingContext)
    );
}

#[tokio::test]
async fn test_unclassified_node_is_disabled() {
    let fx = fixture(base_settings());
    let node = TreeNode::model(Id::INVALID);

    assert_eq!(
        fx.engine.status(&node).await,
        VisibilityStatus::disabled(StatusReason::UnclassifiedNode)
    );
    fx.engine.set_visible(&node, false).await.unwrap();
    assert_eq!(fx.view.settings(), base_settings());
}

#[tokio::test]
async fn test_query_failure() {
    let fx = fixture(base_settings());
    let subject = TreeNode::subject(Id(0x1));

    fx.provider.fail_next(QueryKind::Subjects);
    assert_eq!(
        fx.engine.status(&subject).await,
        VisibilityStatus::disabled(StatusReason::QueryFailed)
    );

    fx.provider.fail_next(QueryKind::Subjects);
    assert!(fx.engine.try_status(&subject).await.is_err());

    fx.provider.fail_next(QueryKind::Subjects);
    let err = fx.engine.set_visible(&subject, false).await.unwrap_err();
    assert!(matches!(err, VisibilityError::Query(_)));
    assert!(fx.view.views_model(Id(0x10)));

    // The failure is not remembered
    assert!(fx.engine.try_status(&subject).await.is_ok());
}

// ── Mutation ────────────────────────────────────────────────

#[tokio::test]
async fn test_subject_toggle_changes_all_models_at_once() {
    let fx = fixture(ViewSettings {
        models: Vec::new(),
        ..base_settings()
    });
    let mut models = fx.view.subscribe(ViewportSignal::ViewedModels);
    let subject = TreeNode::subject(Id(0x1));

    fx.engine.set_visible(&subject, true).await.unwrap();
    assert!(fx.view.views_model(Id(0x10)) && fx.view.views_model(Id(0x11)));
    assert_eq!(drain(&mut models), 1);
    assert!(fx.engine.status(&subject).await.is_visible());

    fx.engine.set_visible(&subject, false).await.unwrap();
    assert!(fx.view.settings().models.is_empty());
    assert_eq!(drain(&mut models), 1);
}

#[tokio::test]
async fn test_set_visible_is_idempotent() {
    let fx = fixture(ViewSettings {
        categories: ids(&[0x20]),
        ..base_settings()
    });
    let nodes = [
        TreeNode::subject(Id(0x2)),
        TreeNode::model(Id(0x11)),
        TreeNode::category(Id(0x21)).with_model(Id(0x10)),
        element(0x33),
        beams(),
        element(0x30).with_children(true),
    ];

    for on in [false, true] {
        for node in &nodes {
            fx.engine.set_visible(node, on).await.unwrap();
            let once = fx.view.settings();
            fx.engine.set_visible(node, on).await.unwrap();
            assert_eq!(fx.view.settings(), once, "{:?} on={}", node.key, on);
        }
    }
}

#[tokio::test]
async fn test_category_override_collapses_to_none() {
    let fx = fixture(base_settings());
    let node = TreeNode::category(Id(0x20)).with_model(Id(0x10));

    fx.engine.set_visible(&node, false).await.unwrap();
    assert_eq!(fx.view.category_override(Id(0x10), Id(0x20)), CategoryOverride::Hide);
    assert_eq!(
        fx.engine.status(&node).await,
        VisibilityStatus::hidden(StatusReason::CategoryOverrideHide)
    );

    // Matching the selector again removes the override and re-enables sub-categories
    fx.engine.set_visible(&node, true).await.unwrap();
    assert_eq!(fx.view.category_override(Id(0x10), Id(0x20)), CategoryOverride::None);
    assert!(fx.view.sub_categories_enabled(Id(0x20)));
    assert_eq!(
        fx.engine.status(&node).await,
        VisibilityStatus::visible(StatusReason::CategorySelectorShow)
    );
    assert!(fx.view.settings().overrides.is_empty());
}

#[tokio::test]
async fn test_category_override_against_hidden_selector() {
    let fx = fixture(ViewSettings {
        categories: Vec::new(),
        ..base_settings()
    });
    let node = TreeNode::category(Id(0x21)).with_model(Id(0x11));

    fx.engine.set_visible(&node, true).await.unwrap();
    assert_eq!(fx.view.category_override(Id(0x11), Id(0x21)), CategoryOverride::Show);
    assert!(!fx.view.views_category(Id(0x21)));

    fx.engine.set_visible(&node, false).await.unwrap();
    assert_eq!(fx.view.category_override(Id(0x11), Id(0x21)), CategoryOverride::None);
    assert!(!fx.view.views_category(Id(0x21)));
}

#[tokio::test]
async fn test_category_without_model_changes_selector() {
    let fx = fixture(base_settings());

    fx.engine.set_visible(&TreeNode::category(Id(0x21)), false).await.unwrap();
    assert!(!fx.view.views_category(Id(0x21)));

    fx.engine.set_visible(&TreeNode::category(Id(0x21)), true).await.unwrap();
    assert!(fx.view.views_category(Id(0x21)));
    assert!(fx.view.sub_categories_enabled(Id(0x21)));
    assert!(fx.view.settings().overrides.is_empty());
}

#[tokio::test]
async fn test_element_round_trip_against_hidden_category() {
    let fx = fixture(ViewSettings {
        categories: ids(&[0x21]),
        ..base_settings()
    });
    let before = fx.engine.status(&element(0x33)).await;
    assert_eq!(before, VisibilityStatus::hidden(StatusReason::CategorySelectorHide));

    fx.engine.set_visible(&element(0x33), true).await.unwrap();
    assert_eq!(*fx.view.always_drawn(), id_set(&[0x33]));
    assert!(fx.engine.status(&element(0x33)).await.is_visible());

    fx.engine.set_visible(&element(0x33), false).await.unwrap();
    assert!(fx.view.always_drawn().is_empty());
    assert!(fx.view.never_drawn().is_empty());
    assert_eq!(fx.engine.status(&element(0x33)).await, before);
}

#[tokio::test]
async fn test_element_hidden_while_category_shown() {
    let fx = fixture(base_settings());

    fx.engine.set_visible(&element(0x33), true).await.unwrap();
    assert!(fx.view.always_drawn().is_empty());

    fx.engine.set_visible(&element(0x33), false).await.unwrap();
    assert_eq!(*fx.view.never_drawn(), id_set(&[0x33]));
    assert_eq!(
        fx.engine.status(&element(0x33)).await,
        VisibilityStatus::hidden(StatusReason::NeverDrawn)
    );

    fx.engine.set_visible(&element(0x33), true).await.unwrap();
    assert!(fx.view.never_drawn().is_empty());
    assert!(fx.view.always_drawn().is_empty());
}

#[tokio::test]
async fn test_assembly_toggle_commits_each_set_once() {
    let fx = fixture(base_settings());
    let mut always = fx.view.subscribe(ViewportSignal::AlwaysDrawn);
    let mut never = fx.view.subscribe(ViewportSignal::NeverDrawn);

    fx.engine.set_visible(&element(0x30).with_children(true), false).await.unwrap();
    assert_eq!(*fx.view.never_drawn(), id_set(&[0x30, 0x31, 0x32]));
    assert_eq!(drain(&mut never), 1);
    assert_eq!(drain(&mut always), 0);

    // Without the hint only the element itself changes
    fx.engine.set_visible(&element(0x30), true).await.unwrap();
    assert_eq!(*fx.view.never_drawn(), id_set(&[0x31, 0x32]));
}

#[tokio::test]
async fn test_grouping_toggle_touches_members_only() {
    let fx = fixture(ViewSettings {
        categories: ids(&[0x20]),
        never_drawn: ids(&[0x30]),
        ..base_settings()
    });

    fx.engine.set_visible(&beams(), true).await.unwrap();
    assert_eq!(*fx.view.always_drawn(), id_set(&[0x40, 0x41, 0x42]));
    assert_eq!(*fx.view.never_drawn(), id_set(&[0x30]));
    assert!(!fx.view.views_category(Id(0x21)));
    assert_eq!(
        fx.engine.status(&beams()).await,
        VisibilityStatus::visible(StatusReason::SomeMembersAlwaysDrawn)
    );

    fx.engine.set_visible(&beams(), false).await.unwrap();
    assert!(fx.view.always_drawn().is_empty());
    assert_eq!(*fx.view.never_drawn(), id_set(&[0x30]));
}

// ── Filtered scope ──────────────────────────────────────────

#[tokio::test]
async fn test_filtered_subject_uses_filtered_children() {
    let fx = fixture(ViewSettings {
        models: ids(&[0x11]),
        ..base_settings()
    });
    let subject = TreeNode::subject(Id(0x1));
    assert!(fx.engine.status(&subject).await.is_visible());

    fx.engine.set_filtered_scope(Some(FilteredHierarchy::from_roots(vec![FilteredNode::ancestor(
        subject.clone(),
        vec![FilteredNode::ancestor(
            TreeNode::subject(Id(0x2)),
            vec![FilteredNode::matched(TreeNode::model(Id(0x10)))],
        )],
    )])));
    assert_eq!(
        fx.engine.status(&subject).await,
        VisibilityStatus::hidden(StatusReason::FilteredModelsHidden)
    );

    fx.engine.set_visible(&subject, true).await.unwrap();
    assert_eq!(fx.view.settings().models, ids(&[0x10, 0x11]));
    assert_eq!(
        fx.engine.status(&subject).await,
        VisibilityStatus::visible(StatusReason::FilteredModelsVisible)
    );

    fx.engine.set_visible(&subject, false).await.unwrap();
    assert_eq!(fx.view.settings().models, ids(&[0x11]));

    fx.engine.set_filtered_scope(None);
    assert_eq!(
        fx.engine.status(&subject).await,
        VisibilityStatus::visible(StatusReason::SomeModelsVisible)
    );
}

#[tokio::test]
async fn test_matching_filtered_subject_contributes_whole_subtree() {
    let fx = fixture(ViewSettings {
        models: Vec::new(),
        ..base_settings()
    });
    let subject = TreeNode::subject(Id(0x1));
    fx.engine.set_filtered_scope(Some(FilteredHierarchy::from_roots(vec![FilteredNode::ancestor(
        subject.clone(),
        vec![FilteredNode::matched(TreeNode::subject(Id(0x3)))],
    )])));

    fx.engine.set_visible(&subject, true).await.unwrap();
    assert_eq!(fx.view.settings().models, ids(&[0x11]));

    // A subject that matched itself is not narrowed
    fx.engine.set_visible(&TreeNode::subject(Id(0x3)), false).await.unwrap();
    assert!(fx.view.settings().models.is_empty());
}

// ── Change notification ─────────────────────────────────────

#[tokio::test]
async fn test_burst_of_changes_emits_one_event() {
    let fx = fixture(base_settings());
    let mut events = fx.engine.on_visibility_changed();

    fx.view.change_model_display(&[Id(0x11)], false);
    fx.view.change_category_display(&[Id(0x21)], false, false);
    fx.view.set_category_override(Id(0x10), Id(0x20), CategoryOverride::Hide);
    fx.view.set_always_drawn(id_set(&[0x30]), false);
    fx.view.set_never_drawn(id_set(&[0x33]));

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    let fired: HashSet<ViewportSignal> = event.signals.into_iter().collect();
    assert_eq!(fired, HashSet::from(ViewportSignal::ALL));

    let second = tokio::time::timeout(Duration::from_millis(50), events.recv()).await;
    assert!(second.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_element_toggle_emits_one_event_across_workers() {
    for _ in 0..20 {
        let fx = fixture(ViewSettings {
            categories: Vec::new(),
            never_drawn: ids(&[0x33]),
            ..base_settings()
        });
        let mut events = fx.engine.on_visibility_changed();

        // Removes from never-drawn and adds to always-drawn in one call
        fx.engine.set_visible(&element(0x33), true).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        let fired: HashSet<ViewportSignal> = event.signals.into_iter().collect();
        assert_eq!(fired, HashSet::from([ViewportSignal::AlwaysDrawn, ViewportSignal::NeverDrawn]));

        let second = tokio::time::timeout(Duration::from_millis(40), events.recv()).await;
        assert!(second.is_err());
    }
}

#[tokio::test]
async fn test_disposed_engine_stops_reporting() {
    let mut fx = fixture(base_settings());
    let mut events = fx.engine.on_visibility_changed();

    fx.engine.dispose();
    fx.engine.set_visible(&TreeNode::model(Id(0x10)), false).await.unwrap();

    let received = tokio::time::timeout(Duration::from_millis(50), events.recv()).await;
    assert!(received.is_err());
}
