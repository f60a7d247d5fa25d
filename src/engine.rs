use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::coords::{global_positions, rebase_edges};
use crate::error::EngineError;
use crate::interact::{self, CameraMove, DragState, TraceResult, Transform, Viewport};
use crate::layout::{LayoutAdapter, LayoutResult, apply_geometry, straighten_edges};
use crate::model::GraphData;
use crate::reconcile::{RenderMode, reconcile};
use crate::render::ShapeRenderer;
use crate::scene::Scene;
use crate::topology::{self, CollapseRecord};

/// Identifies one layout pass. Commits carrying a token that is no longer
/// the most recently issued one are silently discarded, so a stale result
/// from an abandoned pass can never overwrite newer state.
#[derive(Debug, Clone, Copy)]
pub struct PassToken {
    seq: u64,
}

/// Elements a highlight call applies to.
#[derive(Debug, Clone, Default)]
pub struct HighlightSet {
    pub nodes: Vec<String>,
    pub edges: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HighlightOptions {
    /// Drop every existing highlight before applying this one.
    pub exclusive: bool,
}

/// One compound-graph view: caller-owned, one per rendered graph. Owns the
/// model, the committed scene, the collapse records and the viewport; the
/// layout adapter and shape renderer are injected at construction and fixed
/// for the instance's lifetime (swapping either is a reconstruction, since
/// prepared layout state is adapter-specific).
pub struct GraphView {
    config: EngineConfig,
    adapter: Box<dyn LayoutAdapter>,
    renderer: Box<dyn ShapeRenderer>,
    mode: RenderMode,
    data: GraphData,
    scene: Scene,
    records: BTreeMap<String, CollapseRecord>,
    viewport: Viewport,
    drag: Option<DragState>,
    highlights: BTreeMap<u64, HighlightSet>,
    next_highlight: u64,
    focused: BTreeMap<String, (f32, f32)>,
    issued_seq: u64,
    pending: Option<u64>,
}

impl GraphView {
    pub fn new(adapter: Box<dyn LayoutAdapter>, renderer: Box<dyn ShapeRenderer>) -> Self {
        Self::with_config(adapter, renderer, EngineConfig::default())
    }

    pub fn with_config(
        adapter: Box<dyn LayoutAdapter>,
        renderer: Box<dyn ShapeRenderer>,
        config: EngineConfig,
    ) -> Self {
        let viewport = Viewport::new(
            config.viewport_width,
            config.viewport_height,
            config.min_scale,
            config.max_scale,
        );
        Self {
            config,
            adapter,
            renderer,
            mode: RenderMode::Delta,
            data: GraphData::default(),
            scene: Scene::default(),
            records: BTreeMap::new(),
            viewport,
            drag: None,
            highlights: BTreeMap::new(),
            next_highlight: 1,
            focused: BTreeMap::new(),
            issued_seq: 0,
            pending: None,
        }
    }

    pub fn set_mode(&mut self, mode: RenderMode) {
        self.mode = mode;
    }

    pub fn data(&self) -> &GraphData {
        &self.data
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        self.viewport.width = width;
        self.viewport.height = height;
    }

    pub fn is_collapsed(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Loads a new graph. The previous model, collapse records, highlights
    /// and any active drag are dropped; the scene is reconciled against the
    /// new data, so elements whose ids survive the load stay alive.
    pub fn set_data(&mut self, graph: GraphData) -> Result<(), EngineError> {
        graph.flatten()?;
        self.data = graph;
        self.records.clear();
        self.highlights.clear();
        self.focused.clear();
        self.drag = None;
        self.render()
    }

    /// Runs one full synchronous pass: validate, layout, commit. A pass
    /// already in flight is superseded (its eventual commit is discarded).
    pub fn render(&mut self) -> Result<(), EngineError> {
        self.data.flatten()?;
        let token = self.begin_pass();
        let result = self
            .adapter
            .prepare(&self.data)
            .and_then(|prepared| self.adapter.run(&prepared));
        match result {
            Ok(result) => self.commit_pass(token, result),
            Err(err) => {
                // Pass is over; the committed scene stays as it was.
                self.pending = None;
                Err(err.into())
            }
        }
    }

    /// Starts a deferred pass for hosts that run the layout adapter
    /// asynchronously: take the token, compute a `LayoutResult` against
    /// [`data`](Self::data), then hand both to
    /// [`commit_pass`](Self::commit_pass). Drag input is rejected while a
    /// pass is pending.
    pub fn begin_pass(&mut self) -> PassToken {
        self.drag = None;
        self.issued_seq += 1;
        self.pending = Some(self.issued_seq);
        PassToken {
            seq: self.issued_seq,
        }
    }

    /// Commits a finished layout pass. Stale tokens (superseded by a newer
    /// `begin_pass`) are discarded without touching the scene.
    pub fn commit_pass(
        &mut self,
        token: PassToken,
        result: LayoutResult,
    ) -> Result<(), EngineError> {
        if self.pending != Some(token.seq) {
            log::debug!("discarding stale layout pass {}", token.seq);
            return Ok(());
        }
        apply_geometry(&mut self.data, &result);
        straighten_edges(
            &mut self.data,
            self.config.straighten_threshold,
            self.config.straighten_offset,
        );
        let index = self.data.index()?;
        let globals = global_positions(&self.data);
        rebase_edges(&mut self.data, &index, &globals);
        reconcile(
            &mut self.scene,
            &self.data,
            &index,
            &globals,
            self.mode,
            self.renderer.as_mut(),
        );
        self.apply_highlight_flags();
        self.pending = None;
        Ok(())
    }

    /// Collapses a container; precondition violations (leaf, unknown id,
    /// already collapsed) are logged no-ops.
    pub fn collapse(&mut self, id: &str) -> Result<(), EngineError> {
        self.drag = None;
        let size = (self.config.collapsed_width, self.config.collapsed_height);
        if topology::collapse(&mut self.data, &mut self.records, id, size) {
            self.render()
        } else {
            Ok(())
        }
    }

    pub fn expand(&mut self, id: &str) -> Result<(), EngineError> {
        self.drag = None;
        if topology::expand(&mut self.data, &mut self.records, id) {
            self.render()
        } else {
            Ok(())
        }
    }

    pub fn group(&mut self, name: &str, ids: &[&str]) -> Result<(), EngineError> {
        self.drag = None;
        if topology::group(&mut self.data, name, ids) {
            self.render()
        } else {
            Ok(())
        }
    }

    pub fn ungroup(&mut self, name: &str) -> Result<(), EngineError> {
        self.drag = None;
        if topology::ungroup(&mut self.data, &self.records, name) {
            self.render()
        } else {
            Ok(())
        }
    }

    /// Temporarily enlarges a node. Undone by [`unfocus`](Self::unfocus).
    pub fn focus(&mut self, id: &str) -> Result<(), EngineError> {
        if self.focused.contains_key(id) {
            log::warn!("focus `{id}`: already focused, ignoring");
            return Ok(());
        }
        let scale = self.config.focus_scale;
        let Some(node) = self.data.node_mut(id) else {
            log::warn!("focus `{id}`: unknown node, ignoring");
            return Ok(());
        };
        self.focused.insert(id.to_string(), (node.width, node.height));
        node.width *= scale;
        node.height *= scale;
        self.render()
    }

    pub fn unfocus(&mut self, id: &str) -> Result<(), EngineError> {
        let Some((width, height)) = self.focused.remove(id) else {
            log::warn!("unfocus `{id}`: not focused, ignoring");
            return Ok(());
        };
        if let Some(node) = self.data.node_mut(id) {
            node.width = width;
            node.height = height;
        }
        self.render()
    }

    /// Centers a node in the viewport. Returns the animation plan for the
    /// host to play over `duration_ms`; the viewport itself jumps to the
    /// target transform immediately.
    pub fn move_to(&mut self, id: &str, duration_ms: f32) -> Option<CameraMove> {
        let globals = global_positions(&self.data);
        let global = *globals.get(id).or_else(|| {
            log::warn!("move_to `{id}`: unknown node, ignoring");
            None
        })?;
        let node = self.data.node(id)?;
        let to = self
            .viewport
            .centering_transform(global, (node.width, node.height));
        let plan = CameraMove {
            from: self.viewport.transform,
            to,
            duration_ms,
        };
        self.viewport.transform = to;
        Some(plan)
    }

    /// Fits the whole content bounding box into the viewport.
    pub fn fit(&mut self) -> Transform {
        let globals = global_positions(&self.data);
        let mut max_x: f32 = 0.0;
        let mut max_y: f32 = 0.0;
        let flat = match self.data.flatten() {
            Ok(flat) => flat,
            Err(_) => return self.viewport.transform,
        };
        for node in &flat.nodes {
            if let Some(&(gx, gy)) = globals.get(&node.id) {
                max_x = max_x.max(gx + node.width);
                max_y = max_y.max(gy + node.height);
            }
        }
        let transform = self
            .viewport
            .fit_transform((max_x, max_y), self.config.fit_padding);
        self.viewport.transform = transform;
        transform
    }

    /// Marks a set of elements highlighted and notifies the renderer via
    /// the `updated` extension points. Returns a token for
    /// [`unhighlight`](Self::unhighlight).
    pub fn highlight(&mut self, set: HighlightSet, options: HighlightOptions) -> u64 {
        let mut affected_nodes = set.nodes.clone();
        let mut affected_edges = set.edges.clone();
        if options.exclusive {
            for old in self.highlights.values() {
                affected_nodes.extend(old.nodes.iter().cloned());
                affected_edges.extend(old.edges.iter().cloned());
            }
            self.highlights.clear();
        }
        let token = self.next_highlight;
        self.next_highlight += 1;
        self.highlights.insert(token, set);
        self.apply_highlight_flags();
        self.notify_elements(&affected_nodes, &affected_edges);
        token
    }

    pub fn unhighlight(&mut self, token: u64) {
        let Some(set) = self.highlights.remove(&token) else {
            log::warn!("unhighlight: unknown token {token}, ignoring");
            return;
        };
        self.apply_highlight_flags();
        self.notify_elements(&set.nodes, &set.edges);
    }

    /// Ancestry trace from a node: pure query, no state change.
    pub fn trace(&self, id: &str) -> TraceResult {
        interact::trace(&self.data, id)
    }

    /// Captures a node for dragging. Rejected while a layout pass is
    /// pending, since the pass is about to overwrite drag's working copy.
    pub fn drag_start(&mut self, id: &str) -> bool {
        if self.pending.is_some() {
            log::warn!("drag `{id}`: layout pass pending, ignoring");
            return false;
        }
        let Ok(index) = self.data.index() else {
            return false;
        };
        self.drag = interact::drag_start(&index, id);
        self.drag.is_some()
    }

    /// Applies one drag delta; returns false when the delta was rejected
    /// (containment) or no drag is active. The scene is kept in sync and
    /// the renderer notified, without any adapter call.
    pub fn drag_by(&mut self, dx: f32, dy: f32) -> bool {
        if self.pending.is_some() {
            return false;
        }
        let Ok(index) = self.data.index() else {
            return false;
        };
        let Some(drag) = self.drag.take() else {
            return false;
        };
        let moved = interact::drag_by(&mut self.data, &index, &drag, dx, dy);
        if moved {
            self.sync_drag_geometry(&drag);
        }
        self.drag = Some(drag);
        moved
    }

    /// Ends the drag. The manual placement stays authoritative until the
    /// next structural edit; no snap-back, no layout re-run.
    pub fn drag_end(&mut self) {
        self.drag = None;
    }

    fn sync_drag_geometry(&mut self, drag: &DragState) {
        let globals = global_positions(&self.data);
        let mut touched_nodes = Vec::new();
        if let Some(node) = self.data.node(&drag.id)
            && let Some(element) = self.scene.node_mut(&drag.id)
        {
            element.x = node.x;
            element.y = node.y;
            touched_nodes.push(drag.id.clone());
        }
        // Global positions shift for the whole subtree even though local
        // offsets of descendants are untouched.
        let mut stale = Vec::new();
        self.scene.visit_nodes(&mut |element| {
            if drag.contains(&element.id) {
                stale.push(element.id.clone());
            }
        });
        for id in stale {
            if let Some(&(gx, gy)) = globals.get(&id)
                && let Some(element) = self.scene.node_mut(&id)
            {
                element.global_x = gx;
                element.global_y = gy;
            }
        }

        let mut touched_edges = Vec::new();
        for edge in &self.data.edges {
            if !drag.contains(&edge.source) && !drag.contains(&edge.target) {
                continue;
            }
            let key = edge.key();
            if let Some(element) = self.scene.edges.get_mut(&key) {
                element.points = edge.points.clone();
                touched_edges.push(key);
            }
        }

        let node_refs: Vec<_> = touched_nodes
            .iter()
            .filter_map(|id| self.scene.node(id))
            .collect();
        if !node_refs.is_empty() {
            self.renderer.node_updated(&node_refs);
        }
        let edge_refs: Vec<_> = touched_edges
            .iter()
            .filter_map(|key| self.scene.edges.get(key))
            .collect();
        if !edge_refs.is_empty() {
            self.renderer.edge_updated(&edge_refs);
        }
    }

    fn apply_highlight_flags(&mut self) {
        let mut node_ids = Vec::new();
        self.scene.visit_nodes(&mut |node| node_ids.push(node.id.clone()));
        for id in node_ids {
            let on = self.highlights.values().any(|set| set.nodes.contains(&id));
            if let Some(element) = self.scene.node_mut(&id) {
                element.highlighted = on;
            }
        }
        for (key, element) in self.scene.edges.iter_mut() {
            element.highlighted = self.highlights.values().any(|set| set.edges.contains(key));
        }
    }

    fn notify_elements(&mut self, nodes: &[String], edges: &[String]) {
        let node_ids: std::collections::BTreeSet<&String> = nodes.iter().collect();
        let node_refs: Vec<_> = node_ids
            .iter()
            .filter_map(|id| self.scene.node(id.as_str()))
            .collect();
        if !node_refs.is_empty() {
            self.renderer.node_updated(&node_refs);
        }
        let edge_keys: std::collections::BTreeSet<&String> = edges.iter().collect();
        let edge_refs: Vec<_> = edge_keys
            .iter()
            .filter_map(|key| self.scene.edges.get(key.as_str()))
            .collect();
        if !edge_refs.is_empty() {
            self.renderer.edge_updated(&edge_refs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LayoutError;
    use crate::layout::{EdgeGeometry, NodeGeometry, PreparedGraph};
    use crate::model::{GraphEdge, GraphNode};
    use crate::render::NullRenderer;

    /// Deterministic test adapter: leaves get 10x10 boxes, siblings are
    /// stacked left to right, containers wrap their children with padding.
    struct StackLayout;

    const GAP: f32 = 10.0;
    const PAD: f32 = 5.0;

    fn place(children: &mut [GraphNode]) -> (f32, f32) {
        let mut cursor = 0.0f32;
        let mut height = 0.0f32;
        for child in children.iter_mut() {
            if child.children.is_empty() {
                if child.width <= 0.0 {
                    child.width = 10.0;
                    child.height = 10.0;
                }
            } else {
                let (w, h) = place(&mut child.children);
                child.width = w + PAD * 2.0;
                child.height = h + PAD * 2.0;
                for inner in child.children.iter_mut() {
                    inner.x += PAD;
                    inner.y += PAD;
                }
            }
            child.x = cursor;
            child.y = 0.0;
            cursor += child.width + GAP;
            height = height.max(child.height);
        }
        ((cursor - GAP).max(0.0), height)
    }

    impl LayoutAdapter for StackLayout {
        fn prepare(&self, graph: &GraphData) -> Result<PreparedGraph, LayoutError> {
            Ok(PreparedGraph {
                graph: graph.clone(),
                attrs: BTreeMap::new(),
            })
        }

        fn run(&self, prepared: &PreparedGraph) -> Result<LayoutResult, LayoutError> {
            let mut graph = prepared.graph.clone();
            let (width, height) = place(&mut graph.nodes);
            let globals = global_positions(&graph);
            let mut result = LayoutResult {
                width,
                height,
                ..Default::default()
            };
            let flat = graph
                .flatten()
                .map_err(|err| LayoutError::Failed(err.to_string()))?;
            for node in &flat.nodes {
                result.nodes.push(NodeGeometry {
                    id: node.id.clone(),
                    x: node.x,
                    y: node.y,
                    width: node.width,
                    height: node.height,
                });
            }
            for edge in &flat.edges {
                let (sx, sy) = globals[&edge.source];
                let (tx, ty) = globals[&edge.target];
                result.edges.push(EdgeGeometry {
                    key: edge.key(),
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    points: vec![(sx, sy), (tx, ty)],
                });
            }
            Ok(result)
        }
    }

    struct FailingLayout;

    impl LayoutAdapter for FailingLayout {
        fn prepare(&self, graph: &GraphData) -> Result<PreparedGraph, LayoutError> {
            Ok(PreparedGraph {
                graph: graph.clone(),
                attrs: BTreeMap::new(),
            })
        }

        fn run(&self, _prepared: &PreparedGraph) -> Result<LayoutResult, LayoutError> {
            Err(LayoutError::Failed("boom".to_string()))
        }
    }

    fn sample() -> GraphData {
        let mut container = GraphNode::new("box");
        container.children.push(GraphNode::new("a"));
        container.children.push(GraphNode::new("b"));
        GraphData {
            nodes: vec![container, GraphNode::new("c")],
            edges: vec![GraphEdge::new("a", "c")],
        }
    }

    fn view() -> GraphView {
        GraphView::new(Box::new(StackLayout), Box::new(NullRenderer))
    }

    #[test]
    fn set_data_lays_out_and_builds_scene() {
        let mut view = view();
        view.set_data(sample()).unwrap();
        assert!(view.scene().node("a").is_some());
        assert!(view.scene().edges.contains_key("a:c"));
        let container = view.data().node("box").unwrap();
        assert!(container.width > 0.0);
    }

    #[test]
    fn adapter_failure_leaves_previous_scene_intact() {
        let mut view = view();
        view.set_data(sample()).unwrap();

        let mut failing = GraphView::new(Box::new(FailingLayout), Box::new(NullRenderer));
        assert!(failing.set_data(sample()).is_err());
        assert!(failing.scene().nodes.is_empty());

        // A view with a committed scene keeps it across a failed pass.
        let scene_before = view.scene().nodes.len();
        view.adapter = Box::new(FailingLayout);
        assert!(view.render().is_err());
        assert_eq!(view.scene().nodes.len(), scene_before);
    }

    #[test]
    fn stale_pass_commit_is_discarded() {
        let mut view = view();
        view.set_data(sample()).unwrap();
        let stale = view.begin_pass();
        let fresh = view.begin_pass();

        let prepared = StackLayout.prepare(view.data()).unwrap();
        let result = StackLayout.run(&prepared).unwrap();
        let b_before = view.scene().node("b").unwrap().x;

        let mut moved = result.clone();
        for geo in &mut moved.nodes {
            geo.x += 999.0;
        }
        view.commit_pass(stale, moved).unwrap();
        assert_eq!(view.scene().node("b").unwrap().x, b_before);

        view.commit_pass(fresh, result).unwrap();
        assert!(view.scene().node("b").unwrap().x < 999.0);
    }

    #[test]
    fn drag_is_rejected_while_pass_is_pending() {
        let mut view = view();
        view.set_data(sample()).unwrap();
        assert!(view.drag_start("c"));
        let _token = view.begin_pass();
        // begin_pass cancelled the active drag and blocks new ones.
        assert!(!view.drag_by(1.0, 1.0));
        assert!(!view.drag_start("c"));
    }

    #[test]
    fn collapse_expand_round_trip_restores_topology() {
        let mut view = view();
        view.set_data(sample()).unwrap();

        view.collapse("box").unwrap();
        assert!(view.is_collapsed("box"));
        assert!(view.scene().node("a").is_none());
        let edge = view.data().edges.first().unwrap();
        assert_eq!((edge.source.as_str(), edge.target.as_str()), ("box", "c"));

        view.expand("box").unwrap();
        assert!(!view.is_collapsed("box"));
        assert!(view.scene().node("a").is_some());
        let edge = view.data().edges.first().unwrap();
        assert_eq!((edge.source.as_str(), edge.target.as_str()), ("a", "c"));
    }

    #[test]
    fn highlight_tokens_compose_and_release() {
        let mut view = view();
        view.set_data(sample()).unwrap();
        let first = view.highlight(
            HighlightSet {
                nodes: vec!["a".to_string()],
                edges: vec![],
            },
            HighlightOptions::default(),
        );
        let second = view.highlight(
            HighlightSet {
                nodes: vec!["c".to_string()],
                edges: vec!["a:c".to_string()],
            },
            HighlightOptions::default(),
        );
        assert!(view.scene().node("a").unwrap().highlighted);
        assert!(view.scene().node("c").unwrap().highlighted);

        view.unhighlight(first);
        assert!(!view.scene().node("a").unwrap().highlighted);
        assert!(view.scene().node("c").unwrap().highlighted);
        view.unhighlight(second);
        assert!(!view.scene().edges["a:c"].highlighted);
    }

    #[test]
    fn move_to_centers_node_and_returns_plan() {
        let mut view = view();
        view.set_data(sample()).unwrap();
        let plan = view.move_to("c", 250.0).unwrap();
        assert_eq!(plan.duration_ms, 250.0);
        assert_eq!(view.viewport().transform, plan.to);
        assert!(view.move_to("ghost", 100.0).is_none());
    }

    #[test]
    fn focus_enlarges_and_unfocus_restores() {
        let mut view = view();
        view.set_data(sample()).unwrap();
        let before = view.data().node("c").unwrap().width;
        view.focus("c").unwrap();
        let during = view.data().node("c").unwrap().width;
        assert!(during > before);
        view.unfocus("c").unwrap();
        assert_eq!(view.data().node("c").unwrap().width, before);
    }
}
