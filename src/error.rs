use std::path::PathBuf;

use crate::config::ConfigError;
use crate::graph::{DocumentError, GraphError};
use crate::mesh::MeshError;

/// Anything that can abort a generation run or a single graph.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("mesh error: {0}")]
    Mesh(#[from] MeshError),

    #[error("no graph found at {0}")]
    GraphNotFound(PathBuf),

    #[error("{failed} of {total} graphs failed")]
    Batch { failed: usize, total: usize },
}
