use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fallback size for leaf nodes the caller left unsized.
    pub default_node_width: f32,
    pub default_node_height: f32,
    /// Rendered size of a collapsed container.
    pub collapsed_width: f32,
    pub collapsed_height: f32,
    /// Minimum vertical drop before a bend-free edge gets synthetic
    /// intermediate points.
    pub straighten_threshold: f32,
    /// Horizontal offset of the synthetic points.
    pub straighten_offset: f32,
    /// Initial viewport size, adjustable at runtime.
    pub viewport_width: f32,
    pub viewport_height: f32,
    /// Zoom clamp range for the viewport transform.
    pub min_scale: f32,
    pub max_scale: f32,
    /// Padding kept around content when fitting the viewport.
    pub fit_padding: f32,
    /// Size multiplier applied by focus().
    pub focus_scale: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_node_width: 120.0,
            default_node_height: 40.0,
            collapsed_width: 120.0,
            collapsed_height: 40.0,
            straighten_threshold: 10.0,
            straighten_offset: 6.0,
            viewport_width: 800.0,
            viewport_height: 600.0,
            min_scale: 0.1,
            max_scale: 5.0,
            fit_padding: 20.0,
            focus_scale: 1.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scale_range_is_sane() {
        let config = EngineConfig::default();
        assert!(config.min_scale > 0.0);
        assert!(config.min_scale < config.max_scale);
    }
}
