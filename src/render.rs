use serde::Serialize;

use crate::scene::{SceneEdge, SceneNode};

/// Visual-encoding extension points, implemented by the host per graph
/// type and invoked by the reconciliation engine. Each callback receives
/// the whole batch of elements in that category at one hierarchy level,
/// once per pass. Implementations draw shapes, colors and labels; they
/// must not mutate graph topology (the borrow rules already make the
/// batches read-only).
///
/// Delta mode drives the `*_added` / `*_updated` / `*_removed` points;
/// basic mode drives `render_node` / `render_edge` unconditionally. A
/// `removed` element is still attached to the scene while its callback
/// runs and is detached right after it returns; its datum is dead from
/// that point on.
#[allow(unused_variables)]
pub trait ShapeRenderer {
    fn node_added(&mut self, nodes: &[&SceneNode]) {}
    fn node_updated(&mut self, nodes: &[&SceneNode]) {}
    fn node_removed(&mut self, nodes: &[&SceneNode]) {}
    fn edge_added(&mut self, edges: &[&SceneEdge]) {}
    fn edge_updated(&mut self, edges: &[&SceneEdge]) {}
    fn edge_removed(&mut self, edges: &[&SceneEdge]) {}
    fn render_node(&mut self, nodes: &[&SceneNode]) {}
    fn render_edge(&mut self, edges: &[&SceneEdge]) {}
}

/// Renderer that draws nothing. Useful for headless hosts and benches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl ShapeRenderer for NullRenderer {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderOp {
    NodeAdded,
    NodeUpdated,
    NodeRemoved,
    EdgeAdded,
    EdgeUpdated,
    EdgeRemoved,
    RenderNode,
    RenderEdge,
}

/// One recorded extension-point invocation: the operation and the element
/// ids it was batched with.
#[derive(Debug, Clone, Serialize)]
pub struct RenderCall {
    pub op: RenderOp,
    pub ids: Vec<String>,
}

/// Renderer that records every invocation, for asserting on batch
/// composition and ordering.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    pub calls: Vec<RenderCall>,
}

impl RecordingRenderer {
    fn push_nodes(&mut self, op: RenderOp, nodes: &[&SceneNode]) {
        self.calls.push(RenderCall {
            op,
            ids: nodes.iter().map(|n| n.id.clone()).collect(),
        });
    }

    fn push_edges(&mut self, op: RenderOp, edges: &[&SceneEdge]) {
        self.calls.push(RenderCall {
            op,
            ids: edges.iter().map(|e| e.key.clone()).collect(),
        });
    }

    /// All ids recorded for one operation, across batches.
    pub fn ids_for(&self, op: RenderOp) -> Vec<String> {
        let mut out = Vec::new();
        for call in &self.calls {
            if call.op == op {
                out.extend(call.ids.iter().cloned());
            }
        }
        out
    }
}

impl ShapeRenderer for RecordingRenderer {
    fn node_added(&mut self, nodes: &[&SceneNode]) {
        self.push_nodes(RenderOp::NodeAdded, nodes);
    }
    fn node_updated(&mut self, nodes: &[&SceneNode]) {
        self.push_nodes(RenderOp::NodeUpdated, nodes);
    }
    fn node_removed(&mut self, nodes: &[&SceneNode]) {
        self.push_nodes(RenderOp::NodeRemoved, nodes);
    }
    fn edge_added(&mut self, edges: &[&SceneEdge]) {
        self.push_edges(RenderOp::EdgeAdded, edges);
    }
    fn edge_updated(&mut self, edges: &[&SceneEdge]) {
        self.push_edges(RenderOp::EdgeUpdated, edges);
    }
    fn edge_removed(&mut self, edges: &[&SceneEdge]) {
        self.push_edges(RenderOp::EdgeRemoved, edges);
    }
    fn render_node(&mut self, nodes: &[&SceneNode]) {
        self.push_nodes(RenderOp::RenderNode, nodes);
    }
    fn render_edge(&mut self, edges: &[&SceneEdge]) {
        self.push_edges(RenderOp::RenderEdge, edges);
    }
}
