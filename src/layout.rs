use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LayoutError;
use crate::model::GraphData;

#[cfg(feature = "dagre")]
pub mod dagre;

/// Geometry assigned to one node, position relative to its parent container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGeometry {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Geometry assigned to one edge. `points` are in root space; the engine
/// rebases them into the owning container's space after the pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeGeometry {
    pub key: String,
    pub source: String,
    pub target: String,
    pub points: Vec<(f32, f32)>,
}

/// Container record: root-space bounding box of one compound node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupGeometry {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Full output of one adapter run. Treated as a complete replacement for the
/// previous pass; only the coordinate resolver's annotation pass touches it
/// afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutResult {
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<NodeGeometry>,
    pub edges: Vec<EdgeGeometry>,
    pub groups: Vec<GroupGeometry>,
}

/// Output of [`LayoutAdapter::prepare`]: the input graph plus whatever
/// per-node auxiliary state the algorithm wants to carry into `run`.
/// `prepare` must not alter node identity or parent/child relationships.
#[derive(Debug, Clone)]
pub struct PreparedGraph {
    pub graph: GraphData,
    pub attrs: BTreeMap<String, Value>,
}

/// The pluggable layout algorithm. The engine never inspects how positions
/// are computed; it requires only the `LayoutResult` shape. `run` must be
/// idempotent for an unchanged input graph and must terminate for finite
/// graphs; failure is an error value, never a silent empty result.
pub trait LayoutAdapter {
    fn prepare(&self, graph: &GraphData) -> Result<PreparedGraph, LayoutError>;
    fn run(&self, prepared: &PreparedGraph) -> Result<LayoutResult, LayoutError>;
}

/// Copies a layout result back into the model: node geometry
/// (parent-relative) and edge points (root space, rebased later).
pub fn apply_geometry(data: &mut GraphData, result: &LayoutResult) {
    for geo in &result.nodes {
        if let Some(node) = data.node_mut(&geo.id) {
            node.x = geo.x;
            node.y = geo.y;
            node.width = geo.width;
            node.height = geo.height;
        }
    }
    let mut points: BTreeMap<&str, &Vec<(f32, f32)>> = BTreeMap::new();
    for geo in &result.edges {
        points.insert(geo.key.as_str(), &geo.points);
    }
    for edge in &mut data.edges {
        if let Some(new_points) = points.get(edge.key().as_str()) {
            edge.points = (*new_points).clone();
        }
    }
}

/// Inserts two synthetic intermediate points into bend-free edges whose
/// endpoints drop more than `threshold` vertically while running
/// left-to-right, so downstream curve interpolation never degenerates into
/// an ambiguous near-vertical segment.
pub fn straighten_edges(data: &mut GraphData, threshold: f32, offset: f32) {
    for edge in &mut data.edges {
        if edge.points.len() != 2 {
            continue;
        }
        let (x0, y0) = edge.points[0];
        let (x1, y1) = edge.points[1];
        if (y1 - y0).abs() <= threshold || x0 > x1 {
            continue;
        }
        let third = (y1 - y0) / 3.0;
        edge.points = vec![
            (x0, y0),
            (x0 + offset, y0 + third),
            (x1 - offset, y0 + 2.0 * third),
            (x1, y1),
        ];
    }
}
