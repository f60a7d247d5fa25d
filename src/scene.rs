use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Tag applied to a scene element during a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    New,
    Updated,
    Removed,
}

/// Rendered counterpart of a [`GraphNode`](crate::model::GraphNode).
/// Carries a clone of the datum payload so hosts can hit-test and start
/// drags without reaching back into the model. Created and destroyed only
/// by the reconciliation engine.
#[derive(Debug, Clone, Serialize)]
pub struct SceneNode {
    pub id: String,
    pub label: String,
    pub depth: usize,
    /// Parent-relative position.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Root-space position, from the coordinate resolver.
    pub global_x: f32,
    pub global_y: f32,
    pub collapsed: bool,
    pub highlighted: bool,
    pub phase: Phase,
    pub data: Value,
    pub children: BTreeMap<String, SceneNode>,
}

/// Rendered counterpart of a [`GraphEdge`](crate::model::GraphEdge).
/// `points` are in the owning scope's local space.
#[derive(Debug, Clone, Serialize)]
pub struct SceneEdge {
    pub key: String,
    pub source: String,
    pub target: String,
    /// Owning container id; `None` for root scope.
    pub scope: Option<String>,
    pub points: Vec<(f32, f32)>,
    pub highlighted: bool,
    pub phase: Phase,
    pub data: Value,
}

/// The committed scene: what is currently "on screen". One per engine
/// instance, mutated only by reconciliation (and highlight flags).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Scene {
    pub nodes: BTreeMap<String, SceneNode>,
    pub edges: BTreeMap<String, SceneEdge>,
}

impl Scene {
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    pub fn node(&self, id: &str) -> Option<&SceneNode> {
        fn find<'a>(nodes: &'a BTreeMap<String, SceneNode>, id: &str) -> Option<&'a SceneNode> {
            if let Some(node) = nodes.get(id) {
                return Some(node);
            }
            for node in nodes.values() {
                if let Some(found) = find(&node.children, id) {
                    return Some(found);
                }
            }
            None
        }
        find(&self.nodes, id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut SceneNode> {
        fn find<'a>(
            nodes: &'a mut BTreeMap<String, SceneNode>,
            id: &str,
        ) -> Option<&'a mut SceneNode> {
            if nodes.contains_key(id) {
                return nodes.get_mut(id);
            }
            for node in nodes.values_mut() {
                if let Some(found) = find(&mut node.children, id) {
                    return Some(found);
                }
            }
            None
        }
        find(&mut self.nodes, id)
    }

    /// Deepest node whose box contains the root-space point.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<&SceneNode> {
        fn probe<'a>(
            nodes: &'a BTreeMap<String, SceneNode>,
            x: f32,
            y: f32,
        ) -> Option<&'a SceneNode> {
            for node in nodes.values() {
                if x < node.global_x
                    || y < node.global_y
                    || x > node.global_x + node.width
                    || y > node.global_y + node.height
                {
                    continue;
                }
                return Some(probe(&node.children, x, y).unwrap_or(node));
            }
            None
        }
        probe(&self.nodes, x, y)
    }

    pub fn visit_nodes<F: FnMut(&SceneNode)>(&self, visit: &mut F) {
        fn walk<F: FnMut(&SceneNode)>(nodes: &BTreeMap<String, SceneNode>, visit: &mut F) {
            for node in nodes.values() {
                visit(node);
                walk(&node.children, visit);
            }
        }
        walk(&self.nodes, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str, gx: f32, gy: f32, w: f32, h: f32) -> SceneNode {
        SceneNode {
            id: id.to_string(),
            label: id.to_string(),
            depth: 0,
            x: gx,
            y: gy,
            width: w,
            height: h,
            global_x: gx,
            global_y: gy,
            collapsed: false,
            highlighted: false,
            phase: Phase::New,
            data: Value::Null,
            children: BTreeMap::new(),
        }
    }

    #[test]
    fn hit_test_returns_deepest_container_child() {
        let mut outer = leaf("outer", 0.0, 0.0, 100.0, 100.0);
        outer
            .children
            .insert("inner".to_string(), leaf("inner", 10.0, 10.0, 20.0, 20.0));
        let mut scene = Scene::default();
        scene.nodes.insert("outer".to_string(), outer);

        assert_eq!(scene.hit_test(15.0, 15.0).unwrap().id, "inner");
        assert_eq!(scene.hit_test(60.0, 60.0).unwrap().id, "outer");
        assert!(scene.hit_test(200.0, 200.0).is_none());
    }

    #[test]
    fn node_lookup_descends_levels() {
        let mut outer = leaf("outer", 0.0, 0.0, 100.0, 100.0);
        outer
            .children
            .insert("inner".to_string(), leaf("inner", 10.0, 10.0, 20.0, 20.0));
        let mut scene = Scene::default();
        scene.nodes.insert("outer".to_string(), outer);
        assert!(scene.node("inner").is_some());
        assert!(scene.node("ghost").is_none());
    }
}
