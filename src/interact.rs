use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::coords::edge_scope;
use crate::model::{GraphData, GraphIndex};

/// Captured at drag-start: the grabbed node and, for containers, every
/// descendant id, so the subtree moves as a rigid body. Membership in this
/// set (never id-prefix matching) decides which edges a delta touches.
#[derive(Debug, Clone)]
pub struct DragState {
    pub id: String,
    set: HashSet<String>,
}

impl DragState {
    pub fn contains(&self, id: &str) -> bool {
        self.set.contains(id)
    }
}

pub fn drag_start(index: &GraphIndex, id: &str) -> Option<DragState> {
    if !index.contains(id) {
        log::warn!("drag `{id}`: unknown node, ignoring");
        return None;
    }
    let mut set = index.descendants(id);
    set.insert(id.to_string());
    Some(DragState {
        id: id.to_string(),
        set,
    })
}

/// Applies one drag delta. A delta that would push the node outside its
/// parent's box is rejected outright (hard constraint, checked on every
/// frame, not clamped). Edge geometry is patched in place: rigid
/// translation when both endpoints ride along, terminal-point translation
/// when only one does. No layout adapter call happens here.
pub fn drag_by(
    data: &mut GraphData,
    index: &GraphIndex,
    drag: &DragState,
    dx: f32,
    dy: f32,
) -> bool {
    let Some(parent) = index.parent_of(&drag.id) else {
        return false;
    };
    if let Some(parent_id) = parent {
        let parent_id = parent_id.to_string();
        let Some(node) = data.node(&drag.id) else {
            return false;
        };
        let (nx, ny, nw, nh) = (node.x + dx, node.y + dy, node.width, node.height);
        let Some(parent_node) = data.node(&parent_id) else {
            return false;
        };
        if nx < 0.0 || ny < 0.0 || nx > parent_node.width - nw || ny > parent_node.height - nh {
            return false;
        }
    }

    let Some(node) = data.node_mut(&drag.id) else {
        return false;
    };
    node.x += dx;
    node.y += dy;

    for edge in &mut data.edges {
        let source_in = drag.set.contains(&edge.source);
        let target_in = drag.set.contains(&edge.target);
        if !source_in && !target_in {
            continue;
        }
        // An edge owned by a container inside the dragged subtree rides
        // along with it; its scope-local points must stay put.
        if let Some(scope) = edge_scope(index, &edge.source, &edge.target)
            && drag.set.contains(&scope)
        {
            continue;
        }
        if source_in && target_in {
            for point in &mut edge.points {
                point.0 += dx;
                point.1 += dy;
            }
        } else if source_in {
            if let Some(point) = edge.points.first_mut() {
                point.0 += dx;
                point.1 += dy;
            }
        } else if let Some(point) = edge.points.last_mut() {
            point.0 += dx;
            point.1 += dy;
        }
    }
    true
}

/// Ancestry trace: every edge reachable by walking backward (target to
/// source) from `id`, each recorded once, plus the nodes those edges touch.
/// Pure with respect to the graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceResult {
    pub nodes: Vec<String>,
    pub edges: Vec<String>,
}

pub fn trace(data: &GraphData, id: &str) -> TraceResult {
    let mut result = TraceResult::default();
    let mut visited: HashSet<String> = HashSet::new();
    let mut seen_edges: HashSet<String> = HashSet::new();
    let mut touched: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    visited.insert(id.to_string());
    touched.insert(id.to_string());
    queue.push_back(id.to_string());

    while let Some(current) = queue.pop_front() {
        for edge in &data.edges {
            if edge.target != current {
                continue;
            }
            if !seen_edges.insert(edge.key()) {
                continue;
            }
            result.edges.push(edge.key());
            touched.insert(edge.source.clone());
            touched.insert(edge.target.clone());
            if visited.insert(edge.source.clone()) {
                queue.push_back(edge.source.clone());
            }
        }
    }

    result.nodes = touched.into_iter().collect();
    result.nodes.sort();
    result
}

/// 2D affine view transform: `screen = world * scale + (x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transform {
    pub scale: f32,
    pub x: f32,
    pub y: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            x: 0.0,
            y: 0.0,
        }
    }
}

/// Zoom/pan state for one graph view, scale clamped to a configured range.
#[derive(Debug, Clone, Serialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub transform: Transform,
    pub min_scale: f32,
    pub max_scale: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32, min_scale: f32, max_scale: f32) -> Self {
        Self {
            width,
            height,
            transform: Transform::default(),
            min_scale,
            max_scale,
        }
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.transform.x += dx;
        self.transform.y += dy;
    }

    /// Zoom by `factor` keeping the screen-space focal point fixed.
    pub fn zoom_by(&mut self, factor: f32, focal: (f32, f32)) {
        let old = self.transform.scale;
        let new = (old * factor).clamp(self.min_scale, self.max_scale);
        let applied = new / old;
        self.transform.x = focal.0 - (focal.0 - self.transform.x) * applied;
        self.transform.y = focal.1 - (focal.1 - self.transform.y) * applied;
        self.transform.scale = new;
    }

    pub fn world_to_screen(&self, point: (f32, f32)) -> (f32, f32) {
        (
            point.0 * self.transform.scale + self.transform.x,
            point.1 * self.transform.scale + self.transform.y,
        )
    }

    pub fn screen_to_world(&self, point: (f32, f32)) -> (f32, f32) {
        (
            (point.0 - self.transform.x) / self.transform.scale,
            (point.1 - self.transform.y) / self.transform.scale,
        )
    }

    /// Transform that centers a node box (root space) at the current scale.
    pub fn centering_transform(&self, global: (f32, f32), size: (f32, f32)) -> Transform {
        let scale = self.transform.scale;
        Transform {
            scale,
            x: self.width / 2.0 - (global.0 + size.0 / 2.0) * scale,
            y: self.height / 2.0 - (global.1 + size.1 / 2.0) * scale,
        }
    }

    /// Transform that fits a content box into the viewport with padding,
    /// within the scale clamp.
    pub fn fit_transform(&self, content: (f32, f32), padding: f32) -> Transform {
        let (cw, ch) = (content.0.max(1.0), content.1.max(1.0));
        let scale_x = (self.width - padding * 2.0) / cw;
        let scale_y = (self.height - padding * 2.0) / ch;
        let scale = scale_x.min(scale_y).clamp(self.min_scale, self.max_scale);
        Transform {
            scale,
            x: (self.width - cw * scale) / 2.0,
            y: (self.height - ch * scale) / 2.0,
        }
    }
}

/// An animated transform change the host plays back over `duration_ms`.
/// The engine owns no frame clock; it hands out the plan.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CameraMove {
    pub from: Transform,
    pub to: Transform,
    pub duration_ms: f32,
}

impl CameraMove {
    /// Linear sample at `elapsed_ms`, saturating at the endpoints.
    pub fn sample(&self, elapsed_ms: f32) -> Transform {
        if self.duration_ms <= 0.0 {
            return self.to;
        }
        let t = (elapsed_ms / self.duration_ms).clamp(0.0, 1.0);
        Transform {
            scale: self.from.scale + (self.to.scale - self.from.scale) * t,
            x: self.from.x + (self.to.x - self.from.x) * t,
            y: self.from.y + (self.to.y - self.from.y) * t,
        }
    }
}
