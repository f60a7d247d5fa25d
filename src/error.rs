use thiserror::Error;

/// Structural problems detected while flattening a graph, before any layout
/// adapter runs. A malformed graph is never partially laid out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error("duplicate node id `{0}`")]
    DuplicateNode(String),
    #[error("edge `{edge}` references missing node `{endpoint}`")]
    DanglingEdge { edge: String, endpoint: String },
    #[error("duplicate edge id `{0}`")]
    DuplicateEdge(String),
}

/// Failure reported by a layout adapter. Fatal for the pass that triggered
/// it; the previously committed scene stays intact.
#[derive(Debug, Clone, Error)]
pub enum LayoutError {
    #[error("layout failed: {0}")]
    Failed(String),
    #[error("layout did not terminate in time")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Structure(#[from] StructureError),
    #[error(transparent)]
    Adapter(#[from] LayoutError),
}
