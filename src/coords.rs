use std::collections::BTreeMap;

use crate::model::{GraphData, GraphIndex, GraphNode};

/// Global position of every node: the sum of local offsets along the
/// ancestor chain, in root space. Must be rebuilt after every layout pass
/// and after every accepted drag delta; a stale map breaks edge rebasing.
pub fn global_positions(data: &GraphData) -> BTreeMap<String, (f32, f32)> {
    let mut out = BTreeMap::new();
    for top in &data.nodes {
        walk(top, 0.0, 0.0, &mut out);
    }
    out
}

fn walk(node: &GraphNode, ox: f32, oy: f32, out: &mut BTreeMap<String, (f32, f32)>) {
    let gx = ox + node.x;
    let gy = oy + node.y;
    out.insert(node.id.clone(), (gx, gy));
    for child in &node.children {
        walk(child, gx, gy, out);
    }
}

/// The container whose local space an edge is expressed in: the nearest
/// common ancestor of its endpoints. `None` means root space. An edge fully
/// internal to one container lands in that container's space; a
/// boundary-crossing edge in the shared ancestor's space.
pub fn edge_scope(index: &GraphIndex, source: &str, target: &str) -> Option<String> {
    index.common_ancestor(source, target)
}

/// Translates adapter-produced edge points (root space) into each edge's
/// owning-container space, in place.
pub fn rebase_edges(
    data: &mut GraphData,
    index: &GraphIndex,
    globals: &BTreeMap<String, (f32, f32)>,
) {
    let scopes: Vec<Option<String>> = data
        .edges
        .iter()
        .map(|edge| edge_scope(index, &edge.source, &edge.target))
        .collect();
    for (edge, scope) in data.edges.iter_mut().zip(scopes) {
        let (ox, oy) = scope
            .as_deref()
            .and_then(|id| globals.get(id).copied())
            .unwrap_or((0.0, 0.0));
        for point in &mut edge.points {
            point.0 -= ox;
            point.1 -= oy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GraphEdge, GraphNode};

    fn three_levels() -> GraphData {
        let mut grand = GraphNode::new("grand");
        grand.x = 10.0;
        grand.y = 20.0;
        let mut parent = GraphNode::new("parent");
        parent.x = 5.0;
        parent.y = 7.0;
        let mut child = GraphNode::new("child");
        child.x = 1.0;
        child.y = 2.0;
        parent.children.push(child);
        grand.children.push(parent);
        GraphData {
            nodes: vec![grand],
            edges: Vec::new(),
        }
    }

    #[test]
    fn globals_sum_ancestor_offsets() {
        let data = three_levels();
        let globals = global_positions(&data);
        assert_eq!(globals["grand"], (10.0, 20.0));
        assert_eq!(globals["parent"], (15.0, 27.0));
        assert_eq!(globals["child"], (16.0, 29.0));
    }

    #[test]
    fn internal_edge_rebases_into_container_space() {
        let mut data = three_levels();
        let mut sibling = GraphNode::new("sibling");
        sibling.x = 3.0;
        sibling.y = 4.0;
        data.node_mut("parent").unwrap().children.push(sibling);
        let mut edge = GraphEdge::new("child", "sibling");
        edge.points = vec![(16.0, 29.0), (18.0, 31.0)];
        data.edges.push(edge);

        let index = data.index().unwrap();
        let globals = global_positions(&data);
        assert_eq!(
            edge_scope(&index, "child", "sibling"),
            Some("parent".to_string())
        );
        rebase_edges(&mut data, &index, &globals);
        assert_eq!(data.edges[0].points, vec![(1.0, 2.0), (3.0, 4.0)]);
    }

    #[test]
    fn crossing_edge_uses_shared_ancestor_space() {
        let mut data = three_levels();
        data.nodes.push(GraphNode::new("outside"));
        let mut edge = GraphEdge::new("child", "outside");
        edge.points = vec![(16.0, 29.0), (0.0, 0.0)];
        data.edges.push(edge);

        let index = data.index().unwrap();
        let globals = global_positions(&data);
        assert_eq!(edge_scope(&index, "child", "outside"), None);
        rebase_edges(&mut data, &index, &globals);
        // Root scope: points unchanged.
        assert_eq!(data.edges[0].points[0], (16.0, 29.0));
    }
}
