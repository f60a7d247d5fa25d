use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StructureError;

/// A node in a compound graph. A node with a non-empty `children` list is a
/// container; containers own their children exclusively (tree, not DAG) and
/// may start out unsized until a layout pass computes their extent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    /// Position relative to the parent container.
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<GraphNode>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub collapsed: bool,
    /// Opaque host payload, carried through to scene elements untouched.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl GraphNode {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            label: id.to_string(),
            width: 0.0,
            height: 0.0,
            x: 0.0,
            y: 0.0,
            children: Vec::new(),
            collapsed: false,
            data: Value::Null,
        }
    }

    pub fn is_container(&self) -> bool {
        !self.children.is_empty()
    }
}

/// An edge between two node ids. Edges live in the graph's flat edge list;
/// `points` are render-cache state in the owning container's coordinate
/// space, rewritten by every layout pass and by drag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Explicit identity; when absent the key is derived as `source:target`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<(f32, f32)>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl GraphEdge {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            id: None,
            source: source.to_string(),
            target: target.to_string(),
            points: Vec::new(),
            data: Value::Null,
        }
    }

    /// Stable identity key used by reconciliation and collapse bookkeeping.
    pub fn key(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => derive_edge_key(&self.source, &self.target),
        }
    }
}

pub fn derive_edge_key(source: &str, target: &str) -> String {
    format!("{source}:{target}")
}

/// The nested node/edge data for one graph view. The conceptual root is not
/// materialized (and never rendered); `nodes` are its children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphData {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

/// Pre-order walk. `root` itself is visited at depth 0.
pub fn traverse<F: FnMut(&GraphNode, usize)>(root: &GraphNode, visit: &mut F) {
    fn walk<F: FnMut(&GraphNode, usize)>(node: &GraphNode, depth: usize, visit: &mut F) {
        visit(node, depth);
        for child in &node.children {
            walk(child, depth + 1, visit);
        }
    }
    walk(root, 0, visit);
}

/// Depth-independent borrowed view of every node and edge, produced by
/// [`GraphData::flatten`] after structural validation.
#[derive(Debug)]
pub struct FlatGraph<'a> {
    pub nodes: Vec<&'a GraphNode>,
    pub edges: Vec<&'a GraphEdge>,
}

/// Parent relationships and pre-order of the tree, rebuilt from the model
/// whenever an operation needs ancestry queries. Holds ids only, never
/// owning references back into the tree.
#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    parents: BTreeMap<String, Option<String>>,
    order: Vec<String>,
}

impl GraphIndex {
    pub fn contains(&self, id: &str) -> bool {
        self.parents.contains_key(id)
    }

    /// Immediate parent, or `None` for a top-level node (child of the
    /// unmaterialized root). Unknown ids also yield `None` from the outer
    /// `Option`.
    pub fn parent_of(&self, id: &str) -> Option<Option<&str>> {
        self.parents.get(id).map(|p| p.as_deref())
    }

    /// Ancestor chain, nearest first, excluding the root.
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor = id.to_string();
        while let Some(Some(parent)) = self.parents.get(&cursor) {
            out.push(parent.clone());
            cursor = parent.clone();
        }
        out
    }

    /// All ids strictly below `id`.
    pub fn descendants(&self, id: &str) -> HashSet<String> {
        let mut out = HashSet::new();
        for candidate in &self.order {
            if candidate == id {
                continue;
            }
            let mut cursor = candidate.as_str();
            while let Some(Some(parent)) = self.parents.get(cursor).map(|p| p.as_deref()) {
                if parent == id {
                    out.insert(candidate.clone());
                    break;
                }
                cursor = parent;
            }
        }
        out
    }

    /// Nearest common ancestor container of two nodes; `None` means the
    /// common scope is the root.
    pub fn common_ancestor(&self, a: &str, b: &str) -> Option<String> {
        let chain_a: Vec<String> = self.ancestors(a);
        let set_a: HashSet<&str> = chain_a.iter().map(|s| s.as_str()).collect();
        // b itself can be the scope when a sits inside it (and vice versa).
        if set_a.contains(b) {
            return Some(b.to_string());
        }
        let chain_b = self.ancestors(b);
        if chain_b.iter().any(|anc| anc == a) {
            return Some(a.to_string());
        }
        chain_b.into_iter().find(|anc| set_a.contains(anc.as_str()))
    }

    /// Pre-order ids, parents before children.
    pub fn order(&self) -> &[String] {
        &self.order
    }
}

impl GraphData {
    /// Collects every node and edge and validates structure: duplicate node
    /// ids, duplicate edge keys, and edge endpoints that resolve to no node
    /// are rejected before any layout adapter sees the graph.
    pub fn flatten(&self) -> Result<FlatGraph<'_>, StructureError> {
        let mut nodes = Vec::new();
        let mut seen = HashSet::new();
        for top in &self.nodes {
            let mut err = None;
            traverse(top, &mut |node, _| {
                if err.is_none() && !seen.insert(node.id.clone()) {
                    err = Some(StructureError::DuplicateNode(node.id.clone()));
                }
            });
            if let Some(err) = err {
                return Err(err);
            }
            collect(top, &mut nodes);
        }

        let mut edge_keys = HashSet::new();
        for edge in &self.edges {
            let key = edge.key();
            for endpoint in [&edge.source, &edge.target] {
                if !seen.contains(endpoint.as_str()) {
                    return Err(StructureError::DanglingEdge {
                        edge: key,
                        endpoint: endpoint.clone(),
                    });
                }
            }
            if edge.id.is_some() && !edge_keys.insert(key.clone()) {
                return Err(StructureError::DuplicateEdge(key));
            }
        }

        Ok(FlatGraph {
            nodes,
            edges: self.edges.iter().collect(),
        })
    }

    /// Builds the id-based ancestry index. Runs the same validation as
    /// [`flatten`](Self::flatten).
    pub fn index(&self) -> Result<GraphIndex, StructureError> {
        self.flatten()?;
        let mut index = GraphIndex::default();
        for top in &self.nodes {
            build_index(top, None, &mut index);
        }
        Ok(index)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        fn find<'a>(nodes: &'a [GraphNode], id: &str) -> Option<&'a GraphNode> {
            for node in nodes {
                if node.id == id {
                    return Some(node);
                }
                if let Some(found) = find(&node.children, id) {
                    return Some(found);
                }
            }
            None
        }
        find(&self.nodes, id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        fn find<'a>(nodes: &'a mut [GraphNode], id: &str) -> Option<&'a mut GraphNode> {
            for node in nodes {
                if node.id == id {
                    return Some(node);
                }
                if let Some(found) = find(&mut node.children, id) {
                    return Some(found);
                }
            }
            None
        }
        find(&mut self.nodes, id)
    }

    /// Mutable sibling list of the given scope; `None` addresses the
    /// top level.
    pub fn children_of_mut(&mut self, parent: Option<&str>) -> Option<&mut Vec<GraphNode>> {
        match parent {
            None => Some(&mut self.nodes),
            Some(id) => self.node_mut(id).map(|node| &mut node.children),
        }
    }

    pub fn edge_by_key(&self, key: &str) -> Option<&GraphEdge> {
        self.edges.iter().find(|edge| edge.key() == key)
    }
}

fn collect<'a>(node: &'a GraphNode, out: &mut Vec<&'a GraphNode>) {
    out.push(node);
    for child in &node.children {
        collect(child, out);
    }
}

fn build_index(node: &GraphNode, parent: Option<&str>, index: &mut GraphIndex) {
    index
        .parents
        .insert(node.id.clone(), parent.map(|p| p.to_string()));
    index.order.push(node.id.clone());
    for child in &node.children {
        build_index(child, Some(&node.id), index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> GraphData {
        let mut outer = GraphNode::new("outer");
        let mut inner = GraphNode::new("inner");
        inner.children.push(GraphNode::new("leaf"));
        outer.children.push(inner);
        GraphData {
            nodes: vec![outer, GraphNode::new("solo")],
            edges: vec![GraphEdge::new("leaf", "solo")],
        }
    }

    #[test]
    fn traverse_is_preorder_with_depths() {
        let data = nested();
        let mut seen = Vec::new();
        traverse(&data.nodes[0], &mut |node, depth| {
            seen.push((node.id.clone(), depth));
        });
        assert_eq!(
            seen,
            vec![
                ("outer".to_string(), 0),
                ("inner".to_string(), 1),
                ("leaf".to_string(), 2),
            ]
        );
    }

    #[test]
    fn flatten_collects_all_levels() {
        let data = nested();
        let flat = data.flatten().unwrap();
        let ids: Vec<&str> = flat.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["outer", "inner", "leaf", "solo"]);
        assert_eq!(flat.edges.len(), 1);
    }

    #[test]
    fn flatten_rejects_duplicate_ids() {
        let mut data = nested();
        data.nodes.push(GraphNode::new("leaf"));
        assert_eq!(
            data.flatten().unwrap_err(),
            StructureError::DuplicateNode("leaf".to_string())
        );
    }

    #[test]
    fn flatten_rejects_dangling_edges() {
        let mut data = nested();
        data.edges.push(GraphEdge::new("leaf", "ghost"));
        assert!(matches!(
            data.flatten().unwrap_err(),
            StructureError::DanglingEdge { .. }
        ));
    }

    #[test]
    fn index_tracks_parents_and_descendants() {
        let data = nested();
        let index = data.index().unwrap();
        assert_eq!(index.parent_of("leaf"), Some(Some("inner")));
        assert_eq!(index.parent_of("outer"), Some(None));
        let below = index.descendants("outer");
        assert!(below.contains("inner"));
        assert!(below.contains("leaf"));
        assert!(!below.contains("solo"));
    }

    #[test]
    fn common_ancestor_handles_containment_and_siblings() {
        let data = nested();
        let index = data.index().unwrap();
        assert_eq!(
            index.common_ancestor("leaf", "inner"),
            Some("inner".to_string())
        );
        assert_eq!(index.common_ancestor("leaf", "solo"), None);
    }

    #[test]
    fn edge_key_prefers_explicit_id() {
        let mut edge = GraphEdge::new("a", "b");
        assert_eq!(edge.key(), "a:b");
        edge.id = Some("wire-7".to_string());
        assert_eq!(edge.key(), "wire-7");
    }
}
