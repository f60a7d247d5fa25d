use std::collections::{BTreeMap, BTreeSet};

use crate::coords::edge_scope;
use crate::model::{GraphData, GraphEdge, GraphIndex, GraphNode};
use crate::render::ShapeRenderer;
use crate::scene::{Phase, Scene, SceneEdge, SceneNode};

/// How a pass drives the shape renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Clear and fully redraw every pass.
    Basic,
    /// Identity-keyed diff: unchanged elements survive across passes.
    #[default]
    Delta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Added,
    Updated,
    Removed,
}

/// One planned extension-point invocation: all affected nodes of one
/// category at one hierarchy level (a parent's child list).
#[derive(Debug)]
struct NodeBatch {
    kind: Kind,
    parent: Vec<String>,
    ids: Vec<String>,
}

#[derive(Debug)]
struct EdgeBatch {
    kind: Kind,
    keys: Vec<String>,
}

/// Reconciles the model (with freshly applied geometry) against the
/// committed scene. Scene elements are created and destroyed here and
/// nowhere else. Removed elements stay attached while their callback runs
/// and are detached afterwards.
pub fn reconcile(
    scene: &mut Scene,
    data: &GraphData,
    index: &GraphIndex,
    globals: &BTreeMap<String, (f32, f32)>,
    mode: RenderMode,
    renderer: &mut dyn ShapeRenderer,
) {
    if mode == RenderMode::Basic {
        scene.clear();
    }

    let mut node_batches = Vec::new();
    diff_children(
        &mut scene.nodes,
        &data.nodes,
        Vec::new(),
        0,
        globals,
        &mut node_batches,
    );
    let edge_batches = diff_edges(scene, data, index);

    match mode {
        RenderMode::Delta => {
            for batch in &node_batches {
                let Some(refs) = resolve_nodes(scene, batch) else {
                    continue;
                };
                match batch.kind {
                    Kind::Added => renderer.node_added(&refs),
                    Kind::Updated => renderer.node_updated(&refs),
                    Kind::Removed => renderer.node_removed(&refs),
                }
            }
            for batch in &edge_batches {
                let refs = resolve_edges(scene, batch);
                if refs.is_empty() {
                    continue;
                }
                match batch.kind {
                    Kind::Added => renderer.edge_added(&refs),
                    Kind::Updated => renderer.edge_updated(&refs),
                    Kind::Removed => renderer.edge_removed(&refs),
                }
            }
        }
        RenderMode::Basic => {
            // Full redraw wants parents painted before children; the plan
            // is child-first, so walk it backwards.
            for batch in node_batches.iter().rev() {
                let Some(refs) = resolve_nodes(scene, batch) else {
                    continue;
                };
                renderer.render_node(&refs);
            }
            for batch in &edge_batches {
                let refs = resolve_edges(scene, batch);
                if !refs.is_empty() {
                    renderer.render_edge(&refs);
                }
            }
        }
    }

    detach_removed_nodes(&mut scene.nodes);
    scene.edges.retain(|_, edge| edge.phase != Phase::Removed);
}

/// Diffs one hierarchy level, then recurses, then plans this level's
/// batches; children are fully handled before their parent's own
/// handling finishes, so identity keys stay scoped under the right parent.
fn diff_children(
    scene_nodes: &mut BTreeMap<String, SceneNode>,
    data_children: &[GraphNode],
    parent_path: Vec<String>,
    depth: usize,
    globals: &BTreeMap<String, (f32, f32)>,
    batches: &mut Vec<NodeBatch>,
) {
    let incoming: BTreeSet<&str> = data_children.iter().map(|n| n.id.as_str()).collect();
    let mut added = Vec::new();
    let mut updated = Vec::new();

    for child in data_children {
        let (gx, gy) = globals
            .get(&child.id)
            .copied()
            .unwrap_or((child.x, child.y));
        match scene_nodes.get_mut(&child.id) {
            Some(element) => {
                element.label = child.label.clone();
                element.depth = depth;
                element.x = child.x;
                element.y = child.y;
                element.width = child.width;
                element.height = child.height;
                element.global_x = gx;
                element.global_y = gy;
                element.collapsed = child.collapsed;
                element.data = child.data.clone();
                element.phase = Phase::Updated;
                updated.push(child.id.clone());
            }
            None => {
                scene_nodes.insert(
                    child.id.clone(),
                    SceneNode {
                        id: child.id.clone(),
                        label: child.label.clone(),
                        depth,
                        x: child.x,
                        y: child.y,
                        width: child.width,
                        height: child.height,
                        global_x: gx,
                        global_y: gy,
                        collapsed: child.collapsed,
                        highlighted: false,
                        phase: Phase::New,
                        data: child.data.clone(),
                        children: BTreeMap::new(),
                    },
                );
                added.push(child.id.clone());
            }
        }

        let element = scene_nodes
            .get_mut(&child.id)
            .expect("element inserted above");
        let mut child_path = parent_path.clone();
        child_path.push(child.id.clone());
        diff_children(
            &mut element.children,
            &child.children,
            child_path,
            depth + 1,
            globals,
            batches,
        );
    }

    let mut removed = Vec::new();
    for (id, element) in scene_nodes.iter_mut() {
        if incoming.contains(id.as_str()) {
            continue;
        }
        let mut path = parent_path.clone();
        path.push(id.clone());
        mark_removed(element, path, batches);
        removed.push(id.clone());
    }

    for (kind, ids) in [
        (Kind::Added, added),
        (Kind::Updated, updated),
        (Kind::Removed, removed),
    ] {
        if !ids.is_empty() {
            batches.push(NodeBatch {
                kind,
                parent: parent_path.clone(),
                ids,
            });
        }
    }
}

fn mark_removed(node: &mut SceneNode, path: Vec<String>, batches: &mut Vec<NodeBatch>) {
    node.phase = Phase::Removed;
    let ids: Vec<String> = node.children.keys().cloned().collect();
    for (id, child) in node.children.iter_mut() {
        let mut child_path = path.clone();
        child_path.push(id.clone());
        mark_removed(child, child_path, batches);
    }
    if !ids.is_empty() {
        batches.push(NodeBatch {
            kind: Kind::Removed,
            parent: path,
            ids,
        });
    }
}

fn diff_edges(scene: &mut Scene, data: &GraphData, index: &GraphIndex) -> Vec<EdgeBatch> {
    let mut incoming: BTreeMap<String, (&GraphEdge, Option<String>)> = BTreeMap::new();
    for edge in &data.edges {
        let key = edge.key();
        if incoming.contains_key(&key) {
            // Endpoint rewrites can momentarily fold two edges onto one
            // derived key; the first one wins for rendering.
            log::debug!("duplicate edge key `{key}` in pass, merging");
            continue;
        }
        let scope = edge_scope(index, &edge.source, &edge.target);
        incoming.insert(key, (edge, scope));
    }

    type ScopeGroup = BTreeMap<Option<String>, Vec<String>>;
    let mut added = ScopeGroup::new();
    let mut updated = ScopeGroup::new();
    let mut removed = ScopeGroup::new();

    for (key, (edge, scope)) in &incoming {
        match scene.edges.get_mut(key) {
            Some(element) => {
                element.source = edge.source.clone();
                element.target = edge.target.clone();
                element.scope = scope.clone();
                element.points = edge.points.clone();
                element.data = edge.data.clone();
                element.phase = Phase::Updated;
                updated.entry(scope.clone()).or_default().push(key.clone());
            }
            None => {
                scene.edges.insert(
                    key.clone(),
                    SceneEdge {
                        key: key.clone(),
                        source: edge.source.clone(),
                        target: edge.target.clone(),
                        scope: scope.clone(),
                        points: edge.points.clone(),
                        highlighted: false,
                        phase: Phase::New,
                        data: edge.data.clone(),
                    },
                );
                added.entry(scope.clone()).or_default().push(key.clone());
            }
        }
    }

    for (key, element) in scene.edges.iter_mut() {
        if incoming.contains_key(key) {
            continue;
        }
        element.phase = Phase::Removed;
        removed
            .entry(element.scope.clone())
            .or_default()
            .push(key.clone());
    }

    let mut batches = Vec::new();
    for (kind, groups) in [
        (Kind::Added, added),
        (Kind::Updated, updated),
        (Kind::Removed, removed),
    ] {
        for (_scope, keys) in groups {
            batches.push(EdgeBatch { kind, keys });
        }
    }
    batches
}

fn resolve_nodes<'a>(scene: &'a Scene, batch: &NodeBatch) -> Option<Vec<&'a SceneNode>> {
    let mut level = &scene.nodes;
    for id in &batch.parent {
        level = &level.get(id)?.children;
    }
    let refs: Vec<&SceneNode> = batch.ids.iter().filter_map(|id| level.get(id)).collect();
    if refs.is_empty() { None } else { Some(refs) }
}

fn resolve_edges<'a>(scene: &'a Scene, batch: &EdgeBatch) -> Vec<&'a SceneEdge> {
    batch
        .keys
        .iter()
        .filter_map(|key| scene.edges.get(key))
        .collect()
}

fn detach_removed_nodes(nodes: &mut BTreeMap<String, SceneNode>) {
    nodes.retain(|_, node| node.phase != Phase::Removed);
    for node in nodes.values_mut() {
        detach_removed_nodes(&mut node.children);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::global_positions;
    use crate::render::{RecordingRenderer, RenderOp};

    fn sized(id: &str, x: f32, y: f32) -> GraphNode {
        let mut node = GraphNode::new(id);
        node.x = x;
        node.y = y;
        node.width = 10.0;
        node.height = 10.0;
        node
    }

    fn sample() -> GraphData {
        let mut container = sized("box", 0.0, 0.0);
        container.children.push(sized("a", 1.0, 1.0));
        container.children.push(sized("b", 5.0, 5.0));
        GraphData {
            nodes: vec![container, sized("c", 50.0, 0.0)],
            edges: vec![GraphEdge::new("a", "b"), GraphEdge::new("b", "c")],
        }
    }

    fn run_pass(scene: &mut Scene, data: &GraphData, mode: RenderMode) -> RecordingRenderer {
        let index = data.index().unwrap();
        let globals = global_positions(data);
        let mut renderer = RecordingRenderer::default();
        reconcile(scene, data, &index, &globals, mode, &mut renderer);
        renderer
    }

    #[test]
    fn first_pass_tags_everything_new() {
        let data = sample();
        let mut scene = Scene::default();
        let renderer = run_pass(&mut scene, &data, RenderMode::Delta);
        let mut added = renderer.ids_for(RenderOp::NodeAdded);
        added.sort();
        assert_eq!(added, vec!["a", "b", "box", "c"]);
        assert!(renderer.ids_for(RenderOp::NodeUpdated).is_empty());
        assert_eq!(renderer.ids_for(RenderOp::EdgeAdded).len(), 2);
    }

    #[test]
    fn moving_one_leaf_updates_without_destroying() {
        let mut data = sample();
        let mut scene = Scene::default();
        run_pass(&mut scene, &data, RenderMode::Delta);

        data.node_mut("a").unwrap().x = 3.0;
        let renderer = run_pass(&mut scene, &data, RenderMode::Delta);
        assert!(renderer.ids_for(RenderOp::NodeAdded).is_empty());
        assert!(renderer.ids_for(RenderOp::NodeRemoved).is_empty());
        let mut updated = renderer.ids_for(RenderOp::NodeUpdated);
        updated.sort();
        assert_eq!(updated, vec!["a", "b", "box", "c"]);
        assert_eq!(scene.node("a").unwrap().x, 3.0);
    }

    #[test]
    fn removal_fires_callback_then_detaches() {
        let mut data = sample();
        let mut scene = Scene::default();
        run_pass(&mut scene, &data, RenderMode::Delta);

        data.node_mut("box").unwrap().children.retain(|n| n.id != "b");
        data.edges.retain(|e| e.source != "b" && e.target != "b");
        let renderer = run_pass(&mut scene, &data, RenderMode::Delta);
        assert_eq!(renderer.ids_for(RenderOp::NodeRemoved), vec!["b"]);
        let mut removed_edges = renderer.ids_for(RenderOp::EdgeRemoved);
        removed_edges.sort();
        assert_eq!(removed_edges, vec!["a:b", "b:c"]);
        assert!(scene.node("b").is_none());
        assert!(!scene.edges.contains_key("a:b"));
    }

    #[test]
    fn batches_are_per_level_not_per_element() {
        let data = sample();
        let mut scene = Scene::default();
        let renderer = run_pass(&mut scene, &data, RenderMode::Delta);
        let node_add_calls: Vec<_> = renderer
            .calls
            .iter()
            .filter(|call| call.op == RenderOp::NodeAdded)
            .collect();
        // One batch for box's children, one for the top level.
        assert_eq!(node_add_calls.len(), 2);
        assert_eq!(node_add_calls[0].ids, vec!["a", "b"]);
        let mut top = node_add_calls[1].ids.clone();
        top.sort();
        assert_eq!(top, vec!["box", "c"]);
    }

    #[test]
    fn removed_container_children_batch_before_parent() {
        let mut data = sample();
        let mut scene = Scene::default();
        run_pass(&mut scene, &data, RenderMode::Delta);

        data.nodes.retain(|n| n.id != "box");
        data.edges.clear();
        let renderer = run_pass(&mut scene, &data, RenderMode::Delta);
        let removed_calls: Vec<_> = renderer
            .calls
            .iter()
            .filter(|call| call.op == RenderOp::NodeRemoved)
            .collect();
        assert_eq!(removed_calls.len(), 2);
        assert_eq!(removed_calls[0].ids, vec!["a", "b"]);
        assert_eq!(removed_calls[1].ids, vec!["box"]);
    }

    #[test]
    fn basic_mode_redraws_everything_each_pass() {
        let data = sample();
        let mut scene = Scene::default();
        run_pass(&mut scene, &data, RenderMode::Basic);
        let renderer = run_pass(&mut scene, &data, RenderMode::Basic);
        let mut drawn = renderer.ids_for(RenderOp::RenderNode);
        drawn.sort();
        assert_eq!(drawn, vec!["a", "b", "box", "c"]);
        assert_eq!(renderer.ids_for(RenderOp::RenderEdge).len(), 2);
        assert!(renderer.ids_for(RenderOp::NodeAdded).is_empty());
    }

    #[test]
    fn highlight_flag_survives_delta_updates() {
        let data = sample();
        let mut scene = Scene::default();
        run_pass(&mut scene, &data, RenderMode::Delta);
        scene.node_mut("a").unwrap().highlighted = true;
        run_pass(&mut scene, &data, RenderMode::Delta);
        assert!(scene.node("a").unwrap().highlighted);
    }
}
