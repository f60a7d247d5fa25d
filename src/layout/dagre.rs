use std::collections::{BTreeMap, HashSet};

use dagre_rust::{
    GraphConfig as DagreConfig, GraphEdge as DagreEdge, GraphNode as DagreNode,
    layout as dagre_layout,
};
use graphlib_rust::{Graph as DagreGraph, GraphOption};
use serde_json::json;

use super::{EdgeGeometry, GroupGeometry, LayoutAdapter, LayoutResult, NodeGeometry, PreparedGraph};
use crate::error::LayoutError;
use crate::model::{GraphData, GraphNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rankdir {
    TopBottom,
    LeftRight,
}

impl Rankdir {
    fn token(self) -> &'static str {
        match self {
            Self::TopBottom => "TB",
            Self::LeftRight => "LR",
        }
    }
}

/// Layered layout backed by `dagre_rust`, with compound mode enabled so
/// containers become dagre clusters.
#[derive(Debug, Clone)]
pub struct DagreLayout {
    pub rankdir: Rankdir,
    pub node_spacing: f32,
    pub rank_spacing: f32,
    pub default_node_width: f32,
    pub default_node_height: f32,
    /// Padding added around a container's children when deriving its box.
    pub group_padding: f32,
}

impl Default for DagreLayout {
    fn default() -> Self {
        Self {
            rankdir: Rankdir::TopBottom,
            node_spacing: 50.0,
            rank_spacing: 70.0,
            default_node_width: 120.0,
            default_node_height: 40.0,
            group_padding: 16.0,
        }
    }
}

impl LayoutAdapter for DagreLayout {
    fn prepare(&self, graph: &GraphData) -> Result<PreparedGraph, LayoutError> {
        let mut prepared = graph.clone();
        let mut attrs = BTreeMap::new();
        let mut stack: Vec<&mut GraphNode> = prepared.nodes.iter_mut().collect();
        while let Some(node) = stack.pop() {
            let GraphNode {
                id,
                width,
                height,
                children,
                ..
            } = node;
            if children.is_empty() && (*width <= 0.0 || *height <= 0.0) {
                *width = self.default_node_width;
                *height = self.default_node_height;
                attrs.insert(id.clone(), json!({ "defaulted_size": true }));
            }
            stack.extend(children.iter_mut());
        }
        Ok(PreparedGraph {
            graph: prepared,
            attrs,
        })
    }

    fn run(&self, prepared: &PreparedGraph) -> Result<LayoutResult, LayoutError> {
        let graph = &prepared.graph;
        let flat = graph
            .flatten()
            .map_err(|err| LayoutError::Failed(err.to_string()))?;
        if flat.nodes.is_empty() {
            return Ok(LayoutResult::default());
        }

        let compound_enabled = flat.nodes.iter().any(|node| node.is_container());
        let mut dagre_graph: DagreGraph<DagreConfig, DagreNode, DagreEdge> =
            DagreGraph::new(Some(GraphOption {
                directed: Some(true),
                multigraph: Some(false),
                compound: Some(compound_enabled),
            }));

        let mut graph_config = DagreConfig::default();
        graph_config.rankdir = Some(self.rankdir.token().to_string());
        graph_config.nodesep = Some(self.node_spacing);
        graph_config.ranksep = Some(self.rank_spacing);
        graph_config.marginx = Some(8.0);
        graph_config.marginy = Some(8.0);
        dagre_graph.set_graph(graph_config);

        for node in &flat.nodes {
            let mut dagre_node = DagreNode::default();
            dagre_node.width = node.width;
            dagre_node.height = node.height;
            dagre_graph.set_node(node.id.clone(), Some(dagre_node));
        }
        if compound_enabled {
            for node in &flat.nodes {
                for child in &node.children {
                    let _ = dagre_graph.set_parent(&child.id, Some(node.id.clone()));
                }
            }
        }

        let mut edge_set: HashSet<(String, String)> = HashSet::new();
        for edge in &flat.edges {
            if edge.source == edge.target {
                continue;
            }
            let pair = (edge.source.clone(), edge.target.clone());
            if !edge_set.insert(pair) {
                continue;
            }
            let edge_label = DagreEdge::default();
            let _ = dagre_graph.set_edge(&edge.source, &edge.target, Some(edge_label), None);
        }

        dagre_layout::run_layout(&mut dagre_graph);

        // Absolute top-left boxes: leaves straight from dagre, containers
        // bottom-up from their children so the result never depends on how
        // the algorithm reports cluster geometry.
        let mut boxes: BTreeMap<String, (f32, f32, f32, f32)> = BTreeMap::new();
        for node in &flat.nodes {
            if node.is_container() {
                continue;
            }
            let Some(dagre_node) = dagre_graph.node(&node.id) else {
                continue;
            };
            boxes.insert(
                node.id.clone(),
                (
                    dagre_node.x - node.width / 2.0,
                    dagre_node.y - node.height / 2.0,
                    node.width,
                    node.height,
                ),
            );
        }
        for top in &graph.nodes {
            resolve_container_boxes(top, self.group_padding, &mut boxes);
        }

        let mut parents: BTreeMap<String, Option<String>> = BTreeMap::new();
        for top in &graph.nodes {
            record_parents(top, None, &mut parents);
        }

        let mut result = LayoutResult::default();
        for node in &flat.nodes {
            let Some(&(ax, ay, w, h)) = boxes.get(&node.id) else {
                return Err(LayoutError::Failed(format!(
                    "no position for node `{}`",
                    node.id
                )));
            };
            let (px, py) = parents
                .get(&node.id)
                .and_then(|p| p.as_deref())
                .and_then(|p| boxes.get(p))
                .map(|&(x, y, _, _)| (x, y))
                .unwrap_or((0.0, 0.0));
            result.nodes.push(NodeGeometry {
                id: node.id.clone(),
                x: ax - px,
                y: ay - py,
                width: w,
                height: h,
            });
            if node.is_container() {
                result.groups.push(GroupGeometry {
                    id: node.id.clone(),
                    x: ax,
                    y: ay,
                    width: w,
                    height: h,
                });
            }
            result.width = result.width.max(ax + w);
            result.height = result.height.max(ay + h);
        }

        for edge in &flat.edges {
            result.edges.push(EdgeGeometry {
                key: edge.key(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                points: edge_points(&edge.source, &edge.target, &boxes),
            });
        }

        Ok(result)
    }
}

fn resolve_container_boxes(
    node: &GraphNode,
    padding: f32,
    boxes: &mut BTreeMap<String, (f32, f32, f32, f32)>,
) {
    for child in &node.children {
        resolve_container_boxes(child, padding, boxes);
    }
    if !node.is_container() {
        return;
    }
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for child in &node.children {
        let Some(&(x, y, w, h)) = boxes.get(&child.id) else {
            continue;
        };
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x + w);
        max_y = max_y.max(y + h);
    }
    if !min_x.is_finite() {
        return;
    }
    boxes.insert(
        node.id.clone(),
        (
            min_x - padding,
            min_y - padding,
            (max_x - min_x) + padding * 2.0,
            (max_y - min_y) + padding * 2.0,
        ),
    );
}

fn record_parents(
    node: &GraphNode,
    parent: Option<&str>,
    parents: &mut BTreeMap<String, Option<String>>,
) {
    parents.insert(node.id.clone(), parent.map(|p| p.to_string()));
    for child in &node.children {
        record_parents(child, Some(&node.id), parents);
    }
}

fn edge_points(
    source: &str,
    target: &str,
    boxes: &BTreeMap<String, (f32, f32, f32, f32)>,
) -> Vec<(f32, f32)> {
    let Some(&(sx, sy, sw, sh)) = boxes.get(source) else {
        return Vec::new();
    };
    let (scx, scy) = (sx + sw / 2.0, sy + sh / 2.0);
    if source == target {
        // Self-loop: short detour off the top-right corner.
        let loop_pad = 18.0;
        return vec![
            (sx + sw, scy),
            (sx + sw + loop_pad, scy),
            (sx + sw + loop_pad, sy - loop_pad),
            (scx, sy),
        ];
    }
    let Some(&(tx, ty, tw, th)) = boxes.get(target) else {
        return Vec::new();
    };
    vec![(scx, scy), (tx + tw / 2.0, ty + th / 2.0)]
}
