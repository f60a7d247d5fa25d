use std::collections::{BTreeMap, HashSet};

use crate::model::{GraphData, GraphNode, derive_edge_key, traverse};

/// Endpoint values as they were before a collapse rewrote them. Only the
/// endpoints that were actually rewritten are present.
#[derive(Debug, Clone, Default)]
pub struct EndpointRewrite {
    pub source: Option<String>,
    pub target: Option<String>,
}

/// Everything needed to invert one collapse: the detached children and the
/// original endpoints of every rewritten edge, keyed by the edge's identity
/// at collapse time. Created on collapse, consumed and deleted on the
/// matching expand.
#[derive(Debug, Clone, Default)]
pub struct CollapseRecord {
    pub saved_children: Vec<GraphNode>,
    pub edge_endpoints: Vec<(String, EndpointRewrite)>,
}

/// Collapses a container: children are detached into a CollapseRecord and
/// every edge endpoint inside the subtree is rewritten to the container
/// itself (an edge with both endpoints inside becomes a self-loop).
/// Returns false for the precondition no-ops: leaf nodes, unknown ids, and
/// nodes already collapsed.
pub fn collapse(
    data: &mut GraphData,
    records: &mut BTreeMap<String, CollapseRecord>,
    id: &str,
    collapsed_size: (f32, f32),
) -> bool {
    if records.contains_key(id) {
        log::warn!("collapse `{id}`: already collapsed, ignoring");
        return false;
    }
    let Some(node) = data.node_mut(id) else {
        log::warn!("collapse `{id}`: unknown node, ignoring");
        return false;
    };
    if node.children.is_empty() {
        log::warn!("collapse `{id}`: node has no children, ignoring");
        return false;
    }

    let saved_children = std::mem::take(&mut node.children);
    node.collapsed = true;
    node.width = collapsed_size.0;
    node.height = collapsed_size.1;

    let mut inside: HashSet<String> = HashSet::new();
    for child in &saved_children {
        traverse(child, &mut |n, _| {
            inside.insert(n.id.clone());
        });
    }

    let mut edge_endpoints = Vec::new();
    for edge in &mut data.edges {
        let source_in = inside.contains(&edge.source);
        let target_in = inside.contains(&edge.target);
        if !source_in && !target_in {
            continue;
        }
        let mut rewrite = EndpointRewrite::default();
        if source_in {
            rewrite.source = Some(std::mem::replace(&mut edge.source, id.to_string()));
        }
        if target_in {
            rewrite.target = Some(std::mem::replace(&mut edge.target, id.to_string()));
        }
        // Key by the pre-rewrite identity so expand can find the original.
        let key = match &edge.id {
            Some(explicit) => explicit.clone(),
            None => derive_edge_key(
                rewrite.source.as_deref().unwrap_or(&edge.source),
                rewrite.target.as_deref().unwrap_or(&edge.target),
            ),
        };
        edge_endpoints.push((key, rewrite));
    }

    records.insert(
        id.to_string(),
        CollapseRecord {
            saved_children,
            edge_endpoints,
        },
    );
    true
}

/// Restores a collapsed container from its CollapseRecord: children come
/// back, and each recorded edge endpoint is restored (endpoints that were
/// never rewritten are left as-is). Returns false when no record exists or
/// the node itself is currently detached inside another collapsed subtree.
pub fn expand(
    data: &mut GraphData,
    records: &mut BTreeMap<String, CollapseRecord>,
    id: &str,
) -> bool {
    if !records.contains_key(id) {
        log::warn!("expand `{id}`: no collapse record, ignoring");
        return false;
    }
    if data.node(id).is_none() {
        log::warn!("expand `{id}`: node not present (expand its ancestors first), ignoring");
        return false;
    }
    let record = records.remove(id).expect("checked above");

    let node = data.node_mut(id).expect("checked above");
    node.children = record.saved_children;
    node.collapsed = false;

    let mut consumed = vec![false; data.edges.len()];
    for (key, rewrite) in &record.edge_endpoints {
        for (i, edge) in data.edges.iter_mut().enumerate() {
            if consumed[i] {
                continue;
            }
            if rewrite.source.is_some() && edge.source != id {
                continue;
            }
            if rewrite.target.is_some() && edge.target != id {
                continue;
            }
            let original_source = rewrite.source.clone().unwrap_or_else(|| edge.source.clone());
            let original_target = rewrite.target.clone().unwrap_or_else(|| edge.target.clone());
            let original_key = match &edge.id {
                Some(explicit) => explicit.clone(),
                None => derive_edge_key(&original_source, &original_target),
            };
            if original_key != *key {
                continue;
            }
            edge.source = original_source;
            edge.target = original_target;
            consumed[i] = true;
            break;
        }
    }
    true
}

/// Wraps sibling nodes into a new container. All ids must share the same
/// immediate parent; any violation aborts without mutating state.
pub fn group(data: &mut GraphData, name: &str, ids: &[&str]) -> bool {
    if ids.is_empty() {
        log::warn!("group `{name}`: empty id list, ignoring");
        return false;
    }
    if data.node(name).is_some() {
        log::warn!("group `{name}`: id already taken, ignoring");
        return false;
    }
    let Ok(index) = data.index() else {
        log::warn!("group `{name}`: graph failed validation, ignoring");
        return false;
    };
    let Some(parent) = index.parent_of(ids[0]) else {
        log::warn!("group `{name}`: unknown node `{}`, ignoring", ids[0]);
        return false;
    };
    let parent = parent.map(|p| p.to_string());
    for id in &ids[1..] {
        if index.parent_of(id).map(|p| p.map(|s| s.to_string())) != Some(parent.clone()) {
            log::warn!("group `{name}`: nodes do not share a parent, ignoring");
            return false;
        }
    }

    let siblings = data
        .children_of_mut(parent.as_deref())
        .expect("parent resolved above");
    let mut detached = Vec::new();
    let mut remaining = Vec::new();
    for node in siblings.drain(..) {
        if ids.contains(&node.id.as_str()) {
            detached.push(node);
        } else {
            remaining.push(node);
        }
    }
    let mut container = GraphNode::new(name);
    container.children = detached;
    remaining.push(container);
    *siblings = remaining;
    true
}

/// Dissolves a container created by [`group`], re-parenting its children
/// into the container's former parent. Rejected while the container is
/// collapsed or still referenced by an edge.
pub fn ungroup(
    data: &mut GraphData,
    records: &BTreeMap<String, CollapseRecord>,
    name: &str,
) -> bool {
    if records.contains_key(name) {
        log::warn!("ungroup `{name}`: container is collapsed, expand first, ignoring");
        return false;
    }
    if data
        .edges
        .iter()
        .any(|edge| edge.source == name || edge.target == name)
    {
        log::warn!("ungroup `{name}`: edges still attached to container, ignoring");
        return false;
    }
    let Ok(index) = data.index() else {
        log::warn!("ungroup `{name}`: graph failed validation, ignoring");
        return false;
    };
    let Some(parent) = index.parent_of(name) else {
        log::warn!("ungroup `{name}`: unknown container, ignoring");
        return false;
    };
    let parent = parent.map(|p| p.to_string());

    let siblings = data
        .children_of_mut(parent.as_deref())
        .expect("parent resolved above");
    let Some(position) = siblings.iter().position(|n| n.id == name) else {
        return false;
    };
    let container = siblings.remove(position);
    for (offset, child) in container.children.into_iter().enumerate() {
        siblings.insert(position + offset, child);
    }
    true
}
