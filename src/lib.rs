#[cfg(all(feature = "cli", feature = "dagre"))]
pub mod cli;
pub mod config;
pub mod coords;
pub mod engine;
pub mod error;
pub mod interact;
pub mod layout;
pub mod model;
pub mod reconcile;
pub mod render;
pub mod scene;
pub mod topology;

#[cfg(all(feature = "cli", feature = "dagre"))]
pub use cli::run;
pub use config::EngineConfig;
pub use engine::{GraphView, HighlightOptions, HighlightSet, PassToken};
pub use error::{EngineError, LayoutError, StructureError};
pub use interact::{CameraMove, TraceResult, Transform, Viewport};
pub use layout::{LayoutAdapter, LayoutResult, PreparedGraph};
pub use model::{GraphData, GraphEdge, GraphNode};
pub use reconcile::RenderMode;
pub use render::{NullRenderer, ShapeRenderer};
pub use scene::{Phase, Scene, SceneEdge, SceneNode};
