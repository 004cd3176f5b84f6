//! Crate-wide error type.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("unknown entity type key: {0}")]
    UnknownEntityType(String),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed world file: {0}")]
    Format(#[from] serde_json::Error),

    #[error("unsupported world file version {0}")]
    UnsupportedVersion(u32),

    #[error("cell ({x}, {y}) lies outside a {columns}x{rows} grid")]
    CellOutOfRange {
        x: i32,
        y: i32,
        columns: usize,
        rows: usize,
    },

    #[error("player index {index} out of range for {count} entities")]
    PlayerOutOfRange { index: usize, count: usize },
}

impl WorldError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorldError::Io { path: path.into(), source }
    }
}
