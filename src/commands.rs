//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use arbor_core::{
    GroupingKey, Id, NodeKey, QueryResult, SceneDocument, SceneEntity, SceneGraph, TreeNode,
    VisibilityStatus,
};
use arbor_hierarchy::{HierarchyCache, HierarchyIndex, SceneProvider};
use arbor_server::{ArborServer, ServerState};
use arbor_visibility::{ViewState, VisibilityEngine};
use arbor_watcher::{ReloadService, SceneWatcher};

use crate::config::ArborConfig;

/// A loaded scene with its provider, cache and view.
pub struct Session {
    pub scene_path: PathBuf,
    pub document: SceneDocument,
    pub provider: Arc<SceneProvider>,
    pub cache: Arc<HierarchyCache>,
    pub view: Arc<ViewState>,
}

impl Session {
    pub fn open(scene_path: &Path, latency: Option<Duration>) -> anyhow::Result<Self> {
        let document = SceneDocument::load(scene_path)
            .with_context(|| format!("failed to load scene {}", scene_path.display()))?;
        let graph = document.to_graph()?;
        tracing::info!(
            "Scene {}: {} entities, {} relations",
            scene_path.display(),
            graph.node_count(),
            graph.edge_count()
        );

        let mut provider = SceneProvider::new(graph);
        if let Some(latency) = latency {
            provider = provider.with_latency(latency);
        }
        let provider = Arc::new(provider);
        let cache = Arc::new(HierarchyCache::new(provider.clone()));
        let view = Arc::new(ViewState::from_settings(&document.view));

        Ok(Self {
            scene_path: scene_path.to_path_buf(),
            document,
            provider,
            cache,
            view,
        })
    }

    /// Must be called within a tokio runtime.
    pub fn engine(&self) -> VisibilityEngine {
        VisibilityEngine::new(self.view.clone(), self.cache.clone())
    }

    /// Write the current view back into the scene document.
    pub fn save_view(&mut self) -> anyhow::Result<()> {
        self.document.view = self.view.settings();
        self.document.save(&self.scene_path)?;
        tracing::info!("View saved to {}", self.scene_path.display());
        Ok(())
    }
}

pub async fn serve(root: PathBuf, config: ArborConfig) -> anyhow::Result<()> {
    let scene_path = config.scene_path(&root);
    let session = Session::open(&scene_path, config.latency())?;

    let state = ServerState::new(session.view.clone(), session.cache.clone());
    let server = ArborServer::new(state, config.server_config());
    tracing::info!("Starting Arbor server on {}:{}", config.server.host, config.server.port);

    if config.scene.watch {
        let service =
            ReloadService::new(&scene_path, session.provider.clone(), session.cache.clone())
                .with_broadcast(server.state().events_tx.clone());
        let watcher = SceneWatcher::new(&scene_path)?;
        tokio::spawn(async move {
            if let Err(e) = service.run(watcher).await {
                tracing::error!("Scene watcher error: {}", e);
            }
        });
    }

    server.start().await
}

pub async fn tree(
    root: PathBuf,
    config: ArborConfig,
    include_elements: bool,
) -> anyhow::Result<()> {
    let session = Session::open(&config.scene_path(&root), config.latency())?;
    let engine = session.engine();
    let rendered = render_tree(&engine, &session.provider.scene(), include_elements).await?;
    println!("{}", rendered);
    Ok(())
}

pub async fn status(root: PathBuf, config: ArborConfig, target: &str) -> anyhow::Result<()> {
    let session = Session::open(&config.scene_path(&root), config.latency())?;
    let node = with_scene_context(parse_node(target)?, &session.provider.scene());
    let status = session.engine().try_status(&node).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

pub async fn toggle(
    root: PathBuf,
    config: ArborConfig,
    target: &str,
    visible: bool,
    save: bool,
) -> anyhow::Result<()> {
    let mut session = Session::open(&config.scene_path(&root), config.latency())?;
    let node = with_scene_context(parse_node(target)?, &session.provider.scene());
    let engine = session.engine();

    engine.set_visible(&node, visible).await?;
    let status = engine.try_status(&node).await?;
    println!("{} -> {}", target, status_label(&status));

    if save {
        session.save_view()?;
    }
    Ok(())
}

/// Parse `kind:id`, `category:id@model`, `element:id@model` or `group:Class=id,id,...`.
pub fn parse_node(target: &str) -> anyhow::Result<TreeNode> {
    let Some((kind, rest)) = target.split_once(':') else {
        bail!("expected <kind>:<id>, got `{}`", target);
    };

    if kind == "group" {
        let Some((class_name, ids)) = rest.rsplit_once('=') else {
            bail!("expected group:<class>=<id>,<id>..., got `{}`", target);
        };
        let ids = ids
            .split(',')
            .map(|id| id.trim().parse::<Id>())
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(TreeNode::grouping(GroupingKey::new(class_name, ids)));
    }

    let (id, model_id) = match rest.split_once('@') {
        Some((id, model)) => (id.parse::<Id>()?, Some(model.parse::<Id>()?)),
        None => (rest.parse::<Id>()?, None),
    };
    let node = match kind {
        "subject" => TreeNode::subject(id),
        "model" => TreeNode::model(id),
        "category" => TreeNode::category(id),
        "element" => TreeNode::element(id),
        other => bail!("unknown node kind `{}`", other),
    };
    Ok(match model_id {
        Some(model_id) => node.with_model(model_id),
        None => node,
    })
}

/// Attach the model, category and children hint the models tree would show for an element.
pub fn with_scene_context(node: TreeNode, scene: &SceneGraph) -> TreeNode {
    let NodeKey::Element { id } = &node.key else {
        return node;
    };
    let id = *id;
    let Some(SceneEntity::Element {
        model_id, category_id, ..
    }) = scene.entity(id)
    else {
        return node;
    };
    let has_children = !scene.element_children(id).is_empty();
    let model_id = node.model_id.unwrap_or(*model_id);
    let category_id = node.category_id.unwrap_or(*category_id);
    node.with_model(model_id)
        .with_category(category_id)
        .with_children(has_children)
}

fn status_label(status: &VisibilityStatus) -> &'static str {
    if status.is_disabled {
        "disabled"
    } else if status.is_visible() {
        "visible"
    } else {
        "hidden"
    }
}

/// One line of the rendered models tree.
struct TreeEntry {
    id: Id,
    label: String,
    node: TreeNode,
    children: Vec<TreeEntry>,
}

fn label(scene: &SceneGraph, id: Id) -> String {
    scene
        .entity(id)
        .and_then(SceneEntity::label)
        .map(str::to_string)
        .unwrap_or_else(|| id.to_string())
}

fn subject_entry(
    scene: &SceneGraph,
    index: &HierarchyIndex,
    id: Id,
    include_elements: bool,
) -> TreeEntry {
    let mut children: Vec<TreeEntry> = index
        .child_subjects(id)
        .iter()
        .map(|child| subject_entry(scene, index, *child, include_elements))
        .collect();
    children.extend(
        index
            .direct_models(id)
            .iter()
            .map(|model| model_entry(scene, index, *model, include_elements)),
    );
    TreeEntry {
        id,
        label: label(scene, id),
        node: TreeNode::subject(id),
        children,
    }
}

fn model_entry(
    scene: &SceneGraph,
    index: &HierarchyIndex,
    id: Id,
    include_elements: bool,
) -> TreeEntry {
    let children = index
        .model_categories(id)
        .iter()
        .map(|category| {
            let elements = if include_elements {
                scene
                    .root_elements(id, Some(*category))
                    .into_iter()
                    .map(|row| element_entry(scene, row.id, id, *category))
                    .collect()
            } else {
                Vec::new()
            };
            TreeEntry {
                id: *category,
                label: label(scene, *category),
                node: TreeNode::category(*category).with_model(id),
                children: elements,
            }
        })
        .collect();
    TreeEntry {
        id,
        label: label(scene, id),
        node: TreeNode::model(id),
        children,
    }
}

fn element_entry(scene: &SceneGraph, id: Id, model_id: Id, category_id: Id) -> TreeEntry {
    let children: Vec<TreeEntry> = scene
        .element_children(id)
        .into_iter()
        .map(|row| element_entry(scene, row.id, row.model_id, row.category_id))
        .collect();
    TreeEntry {
        id,
        label: label(scene, id),
        node: TreeNode::element(id)
            .with_model(model_id)
            .with_category(category_id)
            .with_children(!children.is_empty()),
        children,
    }
}

fn flatten<'a>(
    entries: &'a [TreeEntry],
    prefix: &str,
    top: bool,
    out: &mut Vec<(String, &'a TreeEntry)>,
) {
    for (i, entry) in entries.iter().enumerate() {
        let last = i + 1 == entries.len();
        let (connector, child_prefix) = match (top, last) {
            (true, _) => (String::new(), String::new()),
            (false, true) => (format!("{}└── ", prefix), format!("{}    ", prefix)),
            (false, false) => (format!("{}├── ", prefix), format!("{}│   ", prefix)),
        };
        out.push((connector, entry));
        flatten(&entry.children, &child_prefix, false, out);
    }
}

/// Render the models tree with the visibility of every node.
pub async fn render_tree(
    engine: &VisibilityEngine,
    scene: &SceneGraph,
    include_elements: bool,
) -> QueryResult<String> {
    let index = engine.cache().index().await?;
    let roots: Vec<TreeEntry> = index
        .root_subjects()
        .iter()
        .map(|subject| subject_entry(scene, &index, *subject, include_elements))
        .collect();

    let mut lines = Vec::new();
    flatten(&roots, "", true, &mut lines);

    let mut rendered = Vec::with_capacity(lines.len());
    for (prefix, entry) in lines {
        let status = engine.try_status(&entry.node).await?;
        rendered.push(format!(
            "{}{} ({}) [{}]",
            prefix,
            entry.label,
            entry.id,
            status_label(&status)
        ));
    }
    Ok(rendered.join("\n"))
}
